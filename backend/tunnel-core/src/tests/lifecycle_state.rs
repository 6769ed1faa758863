use crate::lifecycle::LifecycleState;

#[test]
fn given_default_state_then_stopped_without_error() {
    let state = LifecycleState::default();

    assert!(state.is_stopped());
    assert!(!state.is_running());
    assert_eq!(state.error(), None);
    assert_eq!(state.to_string(), "stopped");
}

#[test]
fn given_failed_stop_then_error_is_exposed() {
    let state = LifecycleState::Stopped {
        error: Some("profile 3 not found".to_string()),
    };

    assert!(state.is_stopped());
    assert_eq!(state.error(), Some("profile 3 not found"));
    assert_eq!(state.to_string(), "stopped (failed)");
}

#[test]
fn given_transient_states_then_neither_stopped_nor_running() {
    for state in [
        LifecycleState::Starting,
        LifecycleState::Reloading,
        LifecycleState::Stopping,
    ] {
        assert!(!state.is_stopped(), "{state} is not stopped");
        assert!(!state.is_running(), "{state} is not running");
        assert_eq!(state.error(), None);
    }
}
