// Unit tests for error module

use crate::error::ExtensionError;

use common::ErrorLocation;

use tunnel_core::error::lifecycle::LifecycleError;

use std::panic::Location;

/// **VALUE**: Tests that errors serialize with their variant tag.
///
/// **BUG THIS CATCHES**: Would catch someone removing `#[derive(Serialize)]`
/// or adding a non-serializable field to a variant.
#[test]
fn given_extension_error_when_serialized_then_contains_variant_and_message() {
    // GIVEN: An ExtensionError
    let err = ExtensionError::Config {
        message: String::from("bad settle delay"),
        location: ErrorLocation::from(Location::caller()),
    };

    // WHEN: Serializing to JSON
    let json = serde_json::to_string(&err).expect("Error should be serializable");

    // THEN: Tag and message are present
    assert!(json.contains("\"type\":\"Config\""), "JSON: {json}");
    assert!(json.contains("bad settle delay"), "JSON: {json}");
}

#[test]
fn given_lifecycle_error_when_converted_then_core_variant_keeps_message() {
    // GIVEN: A core lifecycle error
    let core = LifecycleError::Config {
        message: String::from("Selected profile 9 not found"),
        location: ErrorLocation::from(Location::caller()),
    };

    // WHEN: Converting at the app boundary
    let err: ExtensionError = core.into();

    // THEN: Core variant with the original text
    match err {
        ExtensionError::Core { message, .. } => {
            assert!(message.contains("Selected profile 9 not found"))
        }
        other => panic!("Expected Core variant, got {other:?}"),
    }
}

#[test]
fn given_extension_error_when_displayed_then_includes_location() {
    let err = ExtensionError::Extension {
        message: String::from("Failed to create log directory"),
        location: ErrorLocation::from(Location::caller()),
    };

    let text = err.to_string();

    assert!(text.starts_with("Extension Error: Failed to create log directory ["));
    assert!(text.contains("error.rs:"));
}
