use crate::helpers::{EngineTracker, FakeEngineFactory, RecordingHost, seeded_store, test_config};

use tunnel_core::config::ConfigState;
use tunnel_core::control::send_control_request;
use tunnel_core::error::control::ControlError;
use tunnel_core::exchange::{ProfileExchangeClient, ServerMessage};
use tunnel_core::lifecycle::{ControllerHandle, LifecycleController, LifecycleState};
use tunnel_core::protocol::{ControlRequest, encode_content_request};
use tunnel_core::store::ProfileStore;

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

struct ControlHarness {
    _dir: TempDir,
    socket: PathBuf,
    handle: ControllerHandle,
    tracker: EngineTracker,
}

fn control_harness() -> ControlHarness {
    let dir = TempDir::new().expect("tempdir");
    let store: Arc<dyn ProfileStore> = seeded_store(&dir.path().join("profiles"));
    let mut config = test_config(dir.path(), 1);
    config.control_enabled = true;
    let socket = config.paths().command_socket;
    let (factory, tracker) = FakeEngineFactory::new();
    let handle = LifecycleController::spawn(
        ConfigState::in_memory(config),
        store,
        factory,
        Arc::new(RecordingHost::default()),
    );
    ControlHarness {
        _dir: dir,
        socket,
        handle,
        tracker,
    }
}

#[tokio::test]
async fn given_running_controller_when_peer_sends_reload_then_engine_replaced() {
    // GIVEN: A running controller with the control socket enabled
    let h = control_harness();
    h.handle.start().await.expect("start");
    assert!(h.socket.exists(), "control socket should be listening");

    // WHEN: A peer asks for a reload
    let outcome = send_control_request(&h.socket, ControlRequest::Reload)
        .await
        .expect("transport");

    // THEN: Success, and a second engine is running
    assert_eq!(outcome, Ok(()));
    assert_eq!(h.tracker.created(), 2);
    assert_eq!(h.handle.state(), LifecycleState::Running);
    assert!(h.socket.exists(), "control socket survives a reload");
}

/// **VALUE**: A peer can stop the tunnel and gets its answer even though the
/// socket it used is closed as part of stopping.
#[tokio::test]
async fn given_running_controller_when_peer_sends_stop_then_stopped_and_socket_closed() {
    let h = control_harness();
    h.handle.start().await.expect("start");

    let outcome = send_control_request(&h.socket, ControlRequest::Stop)
        .await
        .expect("transport");

    assert_eq!(outcome, Ok(()));
    assert!(h.handle.state().is_stopped());
    assert_eq!(h.tracker.closed(), 1);
    assert!(!h.socket.exists());
}

#[tokio::test]
async fn given_stopped_controller_when_channel_used_then_no_active_session() {
    let h = control_harness();

    let result = h.handle.command_channel().request(ControlRequest::Reload).await;

    assert!(matches!(result, Err(ControlError::NoActiveSession { .. })));
    assert!(!h.socket.exists(), "no control socket before the first start");
}

#[tokio::test]
async fn given_control_socket_when_peer_sends_non_control_message_then_error_frame() {
    // GIVEN: A running controller
    let h = control_harness();
    h.handle.start().await.expect("start");

    // WHEN: A peer sends an exchange request to the control socket
    let mut client = ProfileExchangeClient::connect(&h.socket)
        .await
        .expect("connect");
    client
        .send_frame(&encode_content_request(1).expect("encode"))
        .await
        .expect("send");

    // THEN: Error frame, then the connection closes; engine untouched
    assert!(matches!(
        client.next_message().await.expect("transport"),
        Some(ServerMessage::Error(_))
    ));
    assert_eq!(client.next_message().await.expect("transport"), None);
    assert_eq!(h.handle.state(), LifecycleState::Running);
}
