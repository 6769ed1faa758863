use crate::helpers::{
    EngineTracker, FakeEngineFactory, LOCAL_CONTENT, REMOTE_CONTENT, RecordingHost,
    diagnostic_lines, seeded_store, test_config, wait_for_state,
};

use tunnel_core::config::{ConfigCommand, ConfigState, ExtensionConfig};
use tunnel_core::error::control::ControlError;
use tunnel_core::error::lifecycle::LifecycleError;
use tunnel_core::lifecycle::{ControllerHandle, LifecycleController, LifecycleState};
use tunnel_core::store::ProfileStore;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use tempfile::TempDir;

struct Harness {
    dir: TempDir,
    config: ConfigState,
    handle: ControllerHandle,
    tracker: EngineTracker,
    host: Arc<RecordingHost>,
}

impl Harness {
    fn base(&self) -> &Path {
        self.dir.path()
    }
}

fn harness_with(configure: impl FnOnce(&Path) -> ExtensionConfig) -> Harness {
    let dir = TempDir::new().expect("tempdir");
    let store: Arc<dyn ProfileStore> = seeded_store(&dir.path().join("profiles"));
    let config = ConfigState::in_memory(configure(dir.path()));
    let (factory, tracker) = FakeEngineFactory::new();
    let host = Arc::new(RecordingHost::default());
    let handle = LifecycleController::spawn(config.clone(), store, factory, host.clone());
    Harness {
        dir,
        config,
        handle,
        tracker,
        host,
    }
}

fn harness(selected: i64) -> Harness {
    harness_with(|base| test_config(base, selected))
}

/// **VALUE**: Start, stop, start works and each start gets a fresh engine.
///
/// **BUG THIS CATCHES**: Would catch a closed engine being reused, or stop
/// leaving the controller in a state that refuses the next start.
#[tokio::test]
async fn given_stopped_controller_when_start_stop_start_then_ends_running_with_fresh_engine() {
    // GIVEN: A controller with profile 1 selected
    let h = harness(1);

    // WHEN: Start, stop, start
    h.handle.start().await.expect("first start");
    assert_eq!(h.handle.state(), LifecycleState::Running);
    h.handle.stop().await.expect("stop");
    assert_eq!(h.handle.state(), LifecycleState::Stopped { error: None });
    h.handle.start().await.expect("second start");

    // THEN: Running on the second engine, the first one closed once
    assert_eq!(h.handle.state(), LifecycleState::Running);
    assert_eq!(h.tracker.created(), 2);
    assert_eq!(h.tracker.started(), 2);
    assert_eq!(h.tracker.closed(), 1);
    assert_eq!(h.tracker.config(0), LOCAL_CONTENT);
}

#[tokio::test]
async fn given_started_controller_then_directories_and_diagnostics_exist() {
    let h = harness(1);

    h.handle.start().await.expect("start");

    assert!(h.base().join("cache").is_dir());
    assert!(h.base().join("working").is_dir());
    assert!(h.base().join("cache").join("stderr.log").is_file());
    assert!(h.handle.diagnostics().is_open().await);
    assert_eq!(h.tracker.callbacks(0).working_dir(), h.base().join("working"));
}

#[tokio::test]
async fn given_stopped_controller_when_stop_requested_then_no_op() {
    let h = harness(1);

    h.handle.stop().await.expect("stop while stopped");

    assert!(h.handle.state().is_stopped());
    assert_eq!(h.tracker.closed(), 0);
}

#[tokio::test]
async fn given_running_controller_when_start_requested_then_invalid_transition() {
    let h = harness(1);
    h.handle.start().await.expect("start");

    let result = h.handle.start().await;

    assert!(matches!(result, Err(LifecycleError::InvalidTransition { .. })));
    assert_eq!(h.handle.state(), LifecycleState::Running);
    assert_eq!(h.tracker.created(), 1);
}

/// **VALUE**: A dangling selection fails the start loudly and exactly once.
///
/// **WHY THIS MATTERS**: The host must tear the tunnel session down with a
/// message the user can act on, and must not see duplicate reports.
///
/// **BUG THIS CATCHES**: Would catch an engine being built with empty config,
/// or the fatal path reporting twice.
#[tokio::test]
async fn given_selected_profile_missing_when_starting_then_one_fatal_report_and_no_engine() {
    // GIVEN: Profile 99 selected, which the store does not have
    let h = harness(99);

    // WHEN: Starting
    let result = h.handle.start().await;

    // THEN: Config error, stopped with reason, one report, no engine
    assert!(matches!(result, Err(LifecycleError::Config { .. })));
    let state = h.handle.state();
    assert!(state.is_stopped());
    assert!(state.error().expect("error recorded").contains("99"));
    assert_eq!(h.tracker.created(), 0);
    assert_eq!(h.host.cancellations().len(), 1);
    assert_eq!(h.host.notification_count(), 1);
    assert_eq!(diagnostic_lines(h.base()).len(), 1);
}

#[tokio::test]
async fn given_no_selection_when_starting_then_fatal_config_error() {
    let h = harness(-1);

    let result = h.handle.start().await;

    assert!(matches!(result, Err(LifecycleError::Config { .. })));
    assert_eq!(h.host.cancellations().len(), 1);
}

/// **VALUE**: An engine that cannot be built from the profile is treated like
/// one that fails to start: reported, not escalated.
///
/// **BUG THIS CATCHES**: Would catch construction failures being routed
/// through the fatal path and tearing down the host session.
#[tokio::test]
async fn given_engine_rejects_config_when_starting_then_stopped_with_error_and_no_cancel() {
    // GIVEN: A factory that refuses the selected profile
    let h = harness(1);
    h.tracker.reject_config.store(true, Ordering::SeqCst);

    // WHEN: Starting
    let result = h.handle.start().await;

    // THEN: Engine error, one diagnostic, host session left alone
    assert!(matches!(result, Err(LifecycleError::EngineRuntime { .. })));
    let state = h.handle.state();
    assert!(state.is_stopped());
    assert!(state.error().expect("error recorded").contains("rejected"));
    assert!(h.host.cancellations().is_empty());
    assert_eq!(h.host.notification_count(), 0);
    assert_eq!(diagnostic_lines(h.base()).len(), 1);
    assert!(!h.handle.diagnostics().is_open().await);

    // AND: A later start succeeds once the factory accepts the profile
    h.tracker.reject_config.store(false, Ordering::SeqCst);
    h.handle.start().await.expect("retry");
    assert_eq!(h.handle.state(), LifecycleState::Running);
}

#[tokio::test]
async fn given_running_controller_when_reload_rejected_by_factory_then_fatal() {
    let h = harness(1);
    h.handle.start().await.expect("start");
    h.tracker.reject_config.store(true, Ordering::SeqCst);

    let result = h.handle.reload().await;

    assert!(matches!(result, Err(LifecycleError::EngineRuntime { .. })));
    assert!(h.handle.state().is_stopped());
    assert_eq!(h.host.cancellations().len(), 1);
    assert_eq!(h.host.notification_count(), 1);
}

/// **VALUE**: An engine that fails to start is reported but not escalated;
/// the host decides whether to retry.
#[tokio::test]
async fn given_engine_fails_to_start_when_starting_then_stopped_with_error_and_no_cancel() {
    // GIVEN: An engine that refuses to start
    let h = harness(1);
    h.tracker.fail_start.store(true, Ordering::SeqCst);

    // WHEN: Starting
    let result = h.handle.start().await;

    // THEN: Engine error, diagnostic written, host session left alone
    assert!(matches!(result, Err(LifecycleError::EngineRuntime { .. })));
    assert!(h.handle.state().error().is_some());
    assert!(h.host.cancellations().is_empty());
    assert_eq!(diagnostic_lines(h.base()).len(), 1);

    // AND: A later start succeeds once the engine cooperates
    h.tracker.fail_start.store(false, Ordering::SeqCst);
    h.handle.start().await.expect("retry");
    assert_eq!(h.handle.state(), LifecycleState::Running);
}

#[tokio::test]
async fn given_base_dir_blocked_by_file_when_starting_then_fatal_setup_error() {
    // GIVEN: The base directory path is occupied by a regular file
    let h = harness_with(|base| {
        let blocked = base.join("blocked");
        std::fs::write(&blocked, "not a directory").expect("write");
        test_config(&blocked, 1)
    });

    // WHEN: Starting
    let result = h.handle.start().await;

    // THEN: Setup error reported once, nothing built
    assert!(matches!(result, Err(LifecycleError::Setup { .. })));
    assert_eq!(h.host.cancellations().len(), 1);
    assert_eq!(h.tracker.created(), 0);
}

/// **VALUE**: Reload replaces the engine and raises then clears the
/// reasserting marker exactly once.
///
/// **BUG THIS CATCHES**: Would catch the marker being left set (host stuck
/// showing "reconnecting") or toggled more than once.
#[tokio::test]
async fn given_running_controller_when_reload_succeeds_then_marker_cleared_once_and_engine_replaced() {
    // GIVEN: A running controller
    let h = harness(1);
    h.handle.start().await.expect("start");

    // WHEN: Reloading
    h.handle.reload().await.expect("reload");

    // THEN: New engine running, old one closed, marker raised and cleared once
    assert_eq!(h.handle.state(), LifecycleState::Running);
    assert_eq!(h.tracker.created(), 2);
    assert_eq!(h.tracker.closed(), 1);
    assert_eq!(h.host.reasserting_calls(), vec![true, false]);
    assert!(!h.handle.is_reasserting());
}

#[tokio::test]
async fn given_running_controller_when_reload_fails_then_marker_cleared_once_and_fatal() {
    // GIVEN: A running controller whose next engine will not start
    let h = harness(1);
    h.handle.start().await.expect("start");
    h.tracker.fail_start.store(true, Ordering::SeqCst);

    // WHEN: Reloading
    let result = h.handle.reload().await;

    // THEN: Failure is fatal, marker still cleared exactly once
    assert!(result.is_err());
    assert!(h.handle.state().is_stopped());
    assert_eq!(h.host.reasserting_calls(), vec![true, false]);
    assert!(!h.handle.is_reasserting());
    assert_eq!(h.host.cancellations().len(), 1);

    // AND: The marker was cleared before the host was told
    assert_eq!(
        h.host.events(),
        vec!["reasserting=true", "reasserting=false", "notify", "cancel"]
    );
}

#[tokio::test]
async fn given_stopped_controller_when_reload_requested_then_invalid_transition_without_marker() {
    let h = harness(1);

    let result = h.handle.reload().await;

    assert!(matches!(result, Err(LifecycleError::InvalidTransition { .. })));
    assert!(h.host.reasserting_calls().is_empty());
}

#[tokio::test]
async fn given_selection_changed_when_reloading_then_new_engine_gets_new_profile() {
    let h = harness(1);
    h.handle.start().await.expect("start");

    h.config
        .update(ConfigCommand::SelectProfile(2))
        .await
        .expect("select");
    h.handle.reload().await.expect("reload");

    assert_eq!(h.tracker.config(0), LOCAL_CONTENT);
    assert_eq!(h.tracker.config(1), REMOTE_CONTENT);
}

/// **VALUE**: After a reload, only the new engine can drive the controller.
///
/// **WHY THIS MATTERS**: A dying engine may still fire callbacks; letting
/// them through would stop the engine that just replaced it.
///
/// **BUG THIS CATCHES**: Would catch the command channel keeping the old
/// session bound across the reload gap.
#[tokio::test]
async fn given_reloaded_controller_when_old_engine_requests_stop_then_rejected_as_stale() {
    // GIVEN: A controller reloaded once
    let h = harness(1);
    h.handle.start().await.expect("start");
    let old = h.tracker.callbacks(0);
    h.handle.reload().await.expect("reload");
    let new = h.tracker.callbacks(1);

    // WHEN: The old engine asks to stop
    let stale = old.request_stop();

    // THEN: Rejected, controller untouched
    assert!(matches!(stale, Err(ControlError::StaleSession { .. })));
    assert_ne!(old.session(), new.session());
    assert_eq!(h.handle.command_channel().active_session(), Some(new.session()));
    assert_eq!(h.handle.state(), LifecycleState::Running);

    // AND: The new engine's request goes through
    let mut state_rx = h.handle.watch_state();
    new.request_stop().expect("current session may stop");
    wait_for_state(&mut state_rx, |s| s.is_stopped()).await;
    assert_eq!(h.tracker.closed(), 2);
}

#[tokio::test]
async fn given_running_engine_when_it_requests_reload_then_controller_reloads() {
    let h = harness(1);
    h.handle.start().await.expect("start");
    let mut state_rx = h.handle.watch_state();

    h.tracker
        .callbacks(0)
        .request_reload()
        .expect("queue reload");
    wait_for_state(&mut state_rx, |_| h.tracker.created() == 2).await;
    wait_for_state(&mut state_rx, |s| s.is_running()).await;
    // Queued behind the reload, so the reload has fully finished once it returns.
    h.handle.stop().await.expect("stop");

    assert_eq!(h.host.reasserting_calls(), vec![true, false]);
}

/// **VALUE**: A hung engine cannot wedge the controller on stop.
#[tokio::test]
async fn given_engine_hangs_on_close_when_stopping_then_abandoned_after_timeout() {
    // GIVEN: A running engine that never finishes closing, 1s stop timeout
    let h = harness(1);
    h.handle.start().await.expect("start");
    h.tracker.hang_on_close.store(true, Ordering::SeqCst);

    // WHEN: Stopping
    let began = Instant::now();
    h.handle.stop().await.expect("stop");

    // THEN: Stopped after roughly the timeout, with a diagnostic left behind
    assert!(began.elapsed() < Duration::from_secs(5));
    assert!(h.handle.state().is_stopped());
    assert_eq!(h.tracker.closed(), 0);
    assert_eq!(diagnostic_lines(h.base()).len(), 1);
}

/// **VALUE**: A close error is written down, not propagated; stop still
/// finishes and releases everything the start opened.
///
/// **BUG THIS CATCHES**: Would catch a close error aborting the stop and
/// leaving the control socket or diagnostic file open.
#[tokio::test]
async fn given_engine_fails_to_close_when_stopping_then_diagnostic_written_and_resources_released() {
    // GIVEN: A running controller with the control socket on, and an engine
    // whose close fails
    let h = harness_with(|base| {
        let mut config = test_config(base, 1);
        config.control_enabled = true;
        config
    });
    h.handle.start().await.expect("start");
    let control_socket = h.base().join("command.sock");
    assert!(control_socket.exists());
    h.tracker.fail_close.store(true, Ordering::SeqCst);

    // WHEN: Stopping
    let result = h.handle.stop().await;

    // THEN: Clean stop, one diagnostic line, everything released
    assert!(result.is_ok());
    assert_eq!(h.handle.state(), LifecycleState::Stopped { error: None });
    assert_eq!(h.tracker.closed(), 1);
    let lines = diagnostic_lines(h.base());
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("Engine close failed"));
    assert!(!h.handle.diagnostics().is_open().await);
    assert!(!control_socket.exists());
    assert_eq!(h.handle.command_channel().active_session(), None);
    assert!(h.host.cancellations().is_empty());
}

#[tokio::test]
async fn given_engine_fails_to_close_when_reloading_then_diagnostic_written_and_new_engine_runs() {
    // GIVEN: A running engine whose close fails
    let h = harness(1);
    h.handle.start().await.expect("start");
    h.tracker.fail_close.store(true, Ordering::SeqCst);

    // WHEN: Reloading
    h.handle.reload().await.expect("reload");

    // THEN: Replacement running, one diagnostic line, channel still open
    assert_eq!(h.handle.state(), LifecycleState::Running);
    assert_eq!(h.tracker.created(), 2);
    assert_eq!(h.tracker.closed(), 1);
    assert_eq!(diagnostic_lines(h.base()).len(), 1);
    assert!(h.handle.diagnostics().is_open().await);
    assert!(h.host.cancellations().is_empty());
    assert_eq!(h.host.reasserting_calls(), vec![true, false]);
}

#[tokio::test]
async fn given_running_controller_when_torn_down_then_engine_closed_and_stopped() {
    let h = harness(1);
    h.handle.start().await.expect("start");

    h.handle.teardown().await.expect("teardown");

    assert_eq!(h.handle.state(), LifecycleState::Stopped { error: None });
    assert_eq!(h.tracker.closed(), 1);
    assert!(!h.handle.diagnostics().is_open().await);
    assert_eq!(h.handle.command_channel().active_session(), None);
}

#[tokio::test]
async fn given_stopped_controller_when_torn_down_then_no_op() {
    let h = harness(1);

    h.handle.teardown().await.expect("teardown");

    assert!(h.handle.state().is_stopped());
    assert_eq!(h.tracker.closed(), 0);
}
