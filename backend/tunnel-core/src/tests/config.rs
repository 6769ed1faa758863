use crate::config::{ConfigCommand, ConfigState, ExtensionConfig, NO_SELECTION};
use crate::error::config::ConfigError;

use std::path::PathBuf;

use tempfile::TempDir;

fn config_in(dir: &TempDir) -> ExtensionConfig {
    ExtensionConfig {
        base_dir: dir.path().join("base"),
        ..ExtensionConfig::default()
    }
}

#[test]
fn given_defaults_when_validating_then_passes() {
    let config = ExtensionConfig::default();

    assert!(config.validate().is_ok());
    assert_eq!(config.selected_profile(), None);
    assert_eq!(config.selected_profile_id, NO_SELECTION);
}

#[test]
fn given_empty_base_dir_when_validating_then_rejected() {
    let config = ExtensionConfig {
        base_dir: PathBuf::new(),
        ..ExtensionConfig::default()
    };

    assert!(matches!(
        config.validate(),
        Err(ConfigError::ValidationError { .. })
    ));
}

#[test]
fn given_zero_stop_timeout_when_validating_then_rejected() {
    let config = ExtensionConfig {
        engine_stop_timeout_secs: 0,
        ..ExtensionConfig::default()
    };

    assert!(config.validate().is_err());
}

#[test]
fn given_invalid_ready_pattern_when_validating_then_rejected() {
    let mut config = ExtensionConfig::default();
    config.engine.ready_pattern = "(unclosed".to_string();

    let err = config.validate().expect_err("pattern must be rejected");

    assert!(err.to_string().contains("ready_pattern"));
}

#[test]
fn given_base_dir_when_deriving_paths_then_layout_hangs_off_base() {
    // GIVEN: A config rooted at /data/ext
    let config = ExtensionConfig {
        base_dir: PathBuf::from("/data/ext"),
        ..ExtensionConfig::default()
    };

    // WHEN: Deriving the layout
    let paths = config.paths();

    // THEN: Cache holds the stderr log, sockets sit at the base
    assert_eq!(paths.cache, PathBuf::from("/data/ext/cache"));
    assert_eq!(paths.stderr_log, PathBuf::from("/data/ext/cache/stderr.log"));
    assert_eq!(paths.working, PathBuf::from("/data/ext/working"));
    assert_eq!(paths.profile_socket, PathBuf::from("/data/ext/profile_service.sock"));
    assert_eq!(paths.command_socket, PathBuf::from("/data/ext/command.sock"));
}

#[test]
fn given_missing_file_when_loading_then_returns_defaults() {
    let dir = TempDir::new().expect("tempdir");

    let config = ExtensionConfig::load(dir.path()).expect("load");

    assert_eq!(config, ExtensionConfig::default());
}

#[test]
fn given_saved_config_when_loading_then_matches() {
    // GIVEN: A non-default config on disk
    let dir = TempDir::new().expect("tempdir");
    let mut config = config_in(&dir);
    config.selected_profile_id = 4;
    config.settle_delay_ms = 0;
    config.save(dir.path()).expect("save");

    // WHEN: Loading it back
    let loaded = ExtensionConfig::load(dir.path()).expect("load");

    // THEN: Same values
    assert_eq!(loaded, config);
}

#[test]
fn given_corrupted_file_when_loading_then_returns_parse_error() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::write(dir.path().join("config.json"), "{not json").expect("write");

    let result = ExtensionConfig::load(dir.path());

    assert!(matches!(result, Err(ConfigError::ParseError { .. })));
}

/// **VALUE**: Selection changes made through the state must be visible to
/// every clone and persisted.
///
/// **BUG THIS CATCHES**: Would catch the actor applying changes to a private
/// copy, leaving the exchange server marking the wrong profile as selected.
#[tokio::test]
async fn given_config_state_when_selecting_profile_then_clones_and_disk_see_it() {
    // GIVEN: A persisted state and a clone of it
    let dir = TempDir::new().expect("tempdir");
    let state = ConfigState::new(dir.path().to_path_buf(), config_in(&dir));
    let clone = state.clone();

    // WHEN: Selecting profile 2
    state
        .update(ConfigCommand::SelectProfile(2))
        .await
        .expect("update");

    // THEN: Clone and disk agree
    assert_eq!(clone.selected_profile().await, Some(2));
    let on_disk = ExtensionConfig::load(dir.path()).expect("load");
    assert_eq!(on_disk.selected_profile(), Some(2));
}

#[tokio::test]
async fn given_invalid_replacement_when_updating_then_state_is_unchanged() {
    let dir = TempDir::new().expect("tempdir");
    let original = config_in(&dir);
    let state = ConfigState::in_memory(original.clone());

    let mut invalid = original.clone();
    invalid.settle_delay_ms = 60_000;
    let result = state.update(ConfigCommand::Replace(invalid)).await;

    assert!(result.is_err());
    assert_eq!(state.get_config().await, original);
}

#[tokio::test]
async fn given_in_memory_state_when_reloading_from_disk_then_state_unavailable() {
    let state = ConfigState::in_memory(ExtensionConfig::default());

    let result = state.update(ConfigCommand::ReloadFromDisk).await;

    assert!(matches!(result, Err(ConfigError::StateUnavailable { .. })));
}

#[tokio::test]
async fn given_edited_file_when_reloading_from_disk_then_state_picks_it_up() {
    // GIVEN: State backed by a directory, then the file is edited externally
    let dir = TempDir::new().expect("tempdir");
    let state = ConfigState::new(dir.path().to_path_buf(), config_in(&dir));
    let mut edited = config_in(&dir);
    edited.selected_profile_id = 9;
    edited.save(dir.path()).expect("save");

    // WHEN: Reloading
    state
        .update(ConfigCommand::ReloadFromDisk)
        .await
        .expect("reload");

    // THEN: The edit is visible
    assert_eq!(state.selected_profile().await, Some(9));
}
