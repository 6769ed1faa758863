use crate::{ModelError, ProfileBuilder, ProfileType, RemoteSettings};

fn local_builder() -> ProfileBuilder {
    ProfileBuilder::default()
        .with_id(1)
        .with_name("Home")
        .with_type(ProfileType::Local)
}

fn validation_message(builder: ProfileBuilder) -> String {
    match builder.build() {
        Err(ModelError::Validation { message, .. }) => message,
        Ok(profile) => panic!("Expected validation error, built {profile:?}"),
    }
}

/// **VALUE**: Verifies the happy path for a local profile.
///
/// **BUG THIS CATCHES**: Would catch if local profiles started picking up
/// remote-only fields and leaking them into content messages.
#[test]
fn given_local_fields_when_building_then_has_no_remote_data() {
    // GIVEN: A fully specified local builder
    let builder = local_builder();

    // WHEN: Building
    let profile = builder.build().expect("local profile should build");

    // THEN: Remote fields stay empty
    assert_eq!(profile.id, 1);
    assert_eq!(profile.name, "Home");
    assert_eq!(profile.profile_type, ProfileType::Local);
    assert!(profile.remote_location.is_none());
    assert!(profile.remote.is_none());
}

#[test]
fn given_missing_id_when_building_then_returns_validation_error() {
    let builder = ProfileBuilder::default()
        .with_name("Home")
        .with_type(ProfileType::Local);

    assert_eq!(validation_message(builder), "Profile id is required");
}

#[test]
fn given_zero_id_when_building_then_returns_validation_error() {
    let builder = local_builder().with_id(0);

    assert_eq!(
        validation_message(builder),
        "Profile id must be positive, got 0"
    );
}

#[test]
fn given_blank_name_when_building_then_returns_validation_error() {
    let builder = local_builder().with_name("   ");

    assert_eq!(validation_message(builder), "Profile name cannot be empty");
}

/// **VALUE**: Verifies that local profiles reject a remote location.
///
/// **WHY THIS MATTERS**: Peers use the presence of a remote location to decide
/// whether a profile can be refreshed. A local profile with a location would be
/// offered an update action that cannot work.
#[test]
fn given_local_with_location_when_building_then_returns_validation_error() {
    // GIVEN: A local profile with a remote location
    let builder = local_builder().with_remote_location("https://example.com/a.json");

    // WHEN/THEN: Building fails
    assert_eq!(
        validation_message(builder),
        "Local profiles cannot have a remote location"
    );
}

#[test]
fn given_cloud_synced_without_location_when_building_then_returns_validation_error() {
    let builder = local_builder().with_type(ProfileType::CloudSynced);

    assert_eq!(
        validation_message(builder),
        "Remote location is required for cloudSynced profiles"
    );
}

#[test]
fn given_cloud_synced_with_settings_when_building_then_returns_validation_error() {
    let builder = local_builder()
        .with_type(ProfileType::CloudSynced)
        .with_remote_location("profiles/work.json")
        .with_remote_settings(RemoteSettings::default());

    let message = validation_message(builder);

    assert!(message.contains("only valid for remote profiles"));
}

/// **VALUE**: Verifies that a remote profile without explicit settings gets defaults.
///
/// **BUG THIS CATCHES**: Would catch if remote profiles could be built without
/// auto-update fields, making the content encoder drop them for remote records.
#[test]
fn given_remote_without_settings_when_building_then_uses_defaults() {
    // GIVEN: A remote builder without settings
    let builder = local_builder()
        .with_type(ProfileType::Remote)
        .with_remote_location("https://example.com/sub");

    // WHEN: Building
    let profile = builder.build().expect("remote profile should build");

    // THEN: Default settings are attached
    assert_eq!(profile.remote, Some(RemoteSettings::default()));
    assert_eq!(
        profile.remote_location.as_deref(),
        Some("https://example.com/sub")
    );
}

#[test]
fn given_remote_with_non_positive_interval_when_building_then_returns_validation_error() {
    let builder = local_builder()
        .with_type(ProfileType::Remote)
        .with_remote_location("https://example.com/sub")
        .with_remote_settings(RemoteSettings {
            auto_update: true,
            auto_update_interval: 0,
            last_updated_at: None,
        });

    assert_eq!(
        validation_message(builder),
        "Auto-update interval must be positive, got 0"
    );
}

#[test]
fn given_existing_profile_when_converted_to_builder_then_rebuilds_identically() {
    let original = local_builder()
        .with_type(ProfileType::Remote)
        .with_remote_location("https://example.com/sub")
        .with_remote_settings(RemoteSettings {
            auto_update: true,
            auto_update_interval: 30,
            last_updated_at: Some(1_700_000_000),
        })
        .build()
        .unwrap();

    let rebuilt = ProfileBuilder::from(&original).build().unwrap();

    assert_eq!(rebuilt, original);
}
