use crate::host::ConsoleHost;

use tunnel_core::lifecycle::HostPlatform;

#[test]
fn given_console_host_when_reasserting_toggled_then_flag_follows() {
    let host = ConsoleHost::new();

    host.set_reasserting(true);
    assert!(host.is_reasserting());
    host.set_reasserting(false);

    assert!(!host.is_reasserting());
}

/// **VALUE**: A fatal lifecycle failure must wake `main` so the process exits
/// instead of idling with no tunnel.
#[tokio::test]
async fn given_console_host_when_tunnel_cancelled_then_subscribers_see_reason() {
    // GIVEN: A subscriber waiting on cancellation
    let host = ConsoleHost::new();
    let mut cancellation = host.cancellation();

    // WHEN: The controller cancels the tunnel
    host.notify_user("Selected profile 9 not found");
    host.cancel_tunnel_with_error("Selected profile 9 not found");

    // THEN: The subscriber wakes with the reason
    cancellation.changed().await.expect("host alive");
    assert_eq!(
        cancellation.borrow().as_deref(),
        Some("Selected profile 9 not found")
    );
}
