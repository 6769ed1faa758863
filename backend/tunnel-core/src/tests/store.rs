use crate::error::store::StoreError;
use crate::store::{JsonProfileStore, ProfileStore};

use models::{ProfileBuilder, ProfileType};

use tempfile::TempDir;

fn local(name: &str) -> ProfileBuilder {
    ProfileBuilder::default()
        .with_name(name)
        .with_type(ProfileType::Local)
}

fn remote(name: &str) -> ProfileBuilder {
    ProfileBuilder::default()
        .with_name(name)
        .with_type(ProfileType::Remote)
        .with_remote_location(format!("https://example.com/{name}.json"))
}

#[test]
fn given_new_store_when_listing_then_empty() {
    let dir = TempDir::new().expect("tempdir");
    let store = JsonProfileStore::open(dir.path()).expect("open");

    assert!(store.list().expect("list").is_empty());
}

/// **VALUE**: The catalogue order peers see is insertion order.
///
/// **BUG THIS CATCHES**: Would catch ids being reassigned or the index being
/// re-sorted on persist.
#[test]
fn given_created_profiles_when_listing_then_ids_ascend_in_insertion_order() {
    // GIVEN: Two profiles created in order
    let dir = TempDir::new().expect("tempdir");
    let store = JsonProfileStore::open(dir.path()).expect("open");
    store.create(local("A"), "{}").expect("create A");
    store.create(remote("B"), "{}").expect("create B");

    // WHEN: Listing
    let profiles = store.list().expect("list");

    // THEN: Ids 1 and 2, in that order
    let summary: Vec<(i64, &str)> = profiles.iter().map(|p| (p.id, p.name.as_str())).collect();
    assert_eq!(summary, vec![(1, "A"), (2, "B")]);
}

#[test]
fn given_created_profile_when_reading_content_then_returns_stored_text() {
    let dir = TempDir::new().expect("tempdir");
    let store = JsonProfileStore::open(dir.path()).expect("open");
    let profile = store.create(local("A"), r#"{"log":{}}"#).expect("create");

    let content = store.read_content(&profile).expect("read");

    assert_eq!(content, r#"{"log":{}}"#);
}

#[test]
fn given_reopened_store_when_getting_then_profiles_persisted() {
    // GIVEN: A store that was written to and dropped
    let dir = TempDir::new().expect("tempdir");
    {
        let store = JsonProfileStore::open(dir.path()).expect("open");
        store.create(remote("B"), "{}").expect("create");
    }

    // WHEN: Reopening
    let store = JsonProfileStore::open(dir.path()).expect("reopen");

    // THEN: The profile is still there with its remote defaults
    let profile = store.get(1).expect("get").expect("present");
    assert_eq!(profile.profile_type, ProfileType::Remote);
    assert!(profile.remote.is_some());
}

#[test]
fn given_unknown_id_when_getting_then_none() {
    let dir = TempDir::new().expect("tempdir");
    let store = JsonProfileStore::open(dir.path()).expect("open");

    assert!(store.get(99).expect("get").is_none());
}

#[test]
fn given_deleted_profile_when_creating_again_then_id_is_not_reused() {
    let dir = TempDir::new().expect("tempdir");
    let store = JsonProfileStore::open(dir.path()).expect("open");
    let first = store.create(local("A"), "{}").expect("create");
    store.delete(first.id).expect("delete");

    let second = store.create(local("B"), "{}").expect("create");

    assert_eq!(second.id, first.id + 1);
    assert!(store.get(first.id).expect("get").is_none());
}

#[test]
fn given_type_change_when_updating_then_validation_error() {
    let dir = TempDir::new().expect("tempdir");
    let store = JsonProfileStore::open(dir.path()).expect("open");
    let mut profile = store.create(local("A"), "{}").expect("create");
    profile.profile_type = ProfileType::Remote;
    profile.remote_location = Some("https://example.com/a.json".to_string());

    let result = store.update(&profile);

    assert!(matches!(result, Err(StoreError::Validation { .. })));
}

#[test]
fn given_rename_when_updating_then_new_name_is_listed() {
    let dir = TempDir::new().expect("tempdir");
    let store = JsonProfileStore::open(dir.path()).expect("open");
    let mut profile = store.create(local("A"), "{}").expect("create");
    profile.name = "Renamed".to_string();

    store.update(&profile).expect("update");

    assert_eq!(store.list().expect("list")[0].name, "Renamed");
}

#[test]
fn given_missing_id_when_updating_content_then_not_found() {
    let dir = TempDir::new().expect("tempdir");
    let store = JsonProfileStore::open(dir.path()).expect("open");

    let result = store.update_content(5, "{}");

    assert!(matches!(result, Err(StoreError::NotFound { id: 5, .. })));
}

#[test]
fn given_corrupted_index_when_opening_then_parse_error() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::write(dir.path().join("profiles.json"), "[[[").expect("write");

    let result = JsonProfileStore::open(dir.path());

    assert!(matches!(result, Err(StoreError::Parse { .. })));
}
