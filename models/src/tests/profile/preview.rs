use crate::{ProfileBuilder, ProfilePreview, ProfileType};

#[test]
fn given_selected_id_when_building_preview_then_marks_only_matching_profile() {
    let first = ProfileBuilder::default()
        .with_id(1)
        .with_name("A")
        .with_type(ProfileType::Local)
        .build()
        .unwrap();
    let second = ProfileBuilder::default()
        .with_id(2)
        .with_name("B")
        .with_type(ProfileType::CloudSynced)
        .with_remote_location("sync/b.json")
        .build()
        .unwrap();

    let previews: Vec<_> = [&first, &second]
        .into_iter()
        .map(|p| ProfilePreview::from_profile(p, 2))
        .collect();

    assert!(!previews[0].is_selected);
    assert!(previews[1].is_selected);
    assert_eq!(previews[1].profile_type, ProfileType::CloudSynced);
}

#[test]
fn given_profile_type_when_round_tripping_code_then_matches() {
    for profile_type in [ProfileType::Local, ProfileType::CloudSynced, ProfileType::Remote] {
        assert_eq!(ProfileType::from_code(profile_type.code()), Some(profile_type));
    }
    assert_eq!(ProfileType::from_code(7), None);
}

#[test]
fn given_profile_type_when_serialized_then_uses_camel_case() {
    let json = serde_json::to_string(&ProfileType::CloudSynced).unwrap();

    assert_eq!(json, "\"cloudSynced\"");
}
