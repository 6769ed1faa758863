use crate::config::EngineConfig;
use crate::control::CommandChannel;
use crate::diagnostics::{DiagnosticChannel, DiagnosticSink};
use crate::engine::{Engine, EngineFactory, PlatformCallbacks, ProcessEngineFactory};
use crate::error::engine::EngineError;
use crate::lifecycle::controller::LifecycleCommand;

use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;

const READY_CONFIG: &str = r#"{"log":{"level":"info"}}"#;

fn shell_engine(script: &str, extra_args: &[&str], start_timeout_secs: u64) -> EngineConfig {
    let mut args = vec!["-c".to_string(), script.to_string()];
    args.extend(extra_args.iter().map(|a| a.to_string()));
    EngineConfig {
        binary: "sh".to_string(),
        args,
        ready_pattern: r"\bstarted\b".to_string(),
        start_timeout_secs,
    }
}

fn callbacks(working_dir: &Path, diagnostics: DiagnosticSink) -> PlatformCallbacks {
    let (tx, _rx) = mpsc::channel::<LifecycleCommand>(1);
    PlatformCallbacks::new(
        1,
        CommandChannel::new(tx.downgrade()),
        diagnostics,
        working_dir.to_path_buf(),
    )
}

#[test]
fn given_invalid_ready_pattern_when_building_factory_then_config_error() {
    let mut config = shell_engine("true", &[], 1);
    config.ready_pattern = "(".to_string();

    let result = ProcessEngineFactory::new(config);

    assert!(matches!(result, Err(EngineError::Config { .. })));
}

#[test]
fn given_non_json_profile_when_creating_engine_then_config_error() {
    let dir = TempDir::new().expect("tempdir");
    let factory = ProcessEngineFactory::new(shell_engine("true", &[], 1)).expect("factory");

    let empty = factory.create("  ".to_string(), callbacks(dir.path(), DiagnosticSink::new()));
    let garbage = factory.create("not json".to_string(), callbacks(dir.path(), DiagnosticSink::new()));

    assert!(matches!(empty, Err(EngineError::Config { .. })));
    assert!(matches!(garbage, Err(EngineError::Config { .. })));
}

/// **VALUE**: The engine only counts as started once it prints its readiness
/// line, and closing it really ends the process.
///
/// **BUG THIS CATCHES**: Would catch the config file not being written before
/// spawn, or close returning before the child is reaped.
#[tokio::test]
async fn given_engine_that_reports_ready_when_started_then_runs_until_closed() {
    // GIVEN: A shell engine that prints the ready line and keeps running
    let dir = TempDir::new().expect("tempdir");
    let factory = ProcessEngineFactory::new(shell_engine(
        "echo 'engine started'; exec sleep 30",
        &[],
        5,
    ))
    .expect("factory");
    let mut engine = factory
        .create(READY_CONFIG.to_string(), callbacks(dir.path(), DiagnosticSink::new()))
        .expect("create");

    // WHEN: Starting then closing
    engine.start().await.expect("start");
    let written = std::fs::read_to_string(dir.path().join("config.json")).expect("config file");
    let closed = engine.close().await;

    // THEN: Config was materialized and close succeeded
    assert_eq!(written, READY_CONFIG);
    assert!(closed.is_ok(), "close failed: {closed:?}");
}

#[tokio::test]
async fn given_engine_that_exits_early_when_started_then_start_error() {
    let dir = TempDir::new().expect("tempdir");
    let factory = ProcessEngineFactory::new(shell_engine("exit 3", &[], 5)).expect("factory");
    let mut engine = factory
        .create(READY_CONFIG.to_string(), callbacks(dir.path(), DiagnosticSink::new()))
        .expect("create");

    let result = engine.start().await;

    assert!(matches!(result, Err(EngineError::Start { .. })));
}

#[tokio::test]
async fn given_engine_that_never_reports_ready_when_started_then_timeout() {
    let dir = TempDir::new().expect("tempdir");
    let factory = ProcessEngineFactory::new(shell_engine("exec sleep 30", &[], 1)).expect("factory");
    let mut engine = factory
        .create(READY_CONFIG.to_string(), callbacks(dir.path(), DiagnosticSink::new()))
        .expect("create");

    let result = engine.start().await;

    assert!(matches!(result, Err(EngineError::Timeout { .. })));
}

#[tokio::test]
async fn given_missing_binary_when_started_then_start_error() {
    let dir = TempDir::new().expect("tempdir");
    let mut config = shell_engine("", &[], 1);
    config.binary = "definitely-not-an-engine-binary".to_string();
    let factory = ProcessEngineFactory::new(config).expect("factory");
    let mut engine = factory
        .create(READY_CONFIG.to_string(), callbacks(dir.path(), DiagnosticSink::new()))
        .expect("create");

    let result = engine.start().await;

    assert!(matches!(result, Err(EngineError::Start { .. })));
}

/// **VALUE**: Engine stderr ends up in the diagnostic channel, and the
/// `{config}` placeholder points at the written config file.
#[tokio::test]
async fn given_engine_writing_to_stderr_when_started_then_lines_reach_diagnostics() {
    // GIVEN: An engine that echoes its config file to stderr
    let dir = TempDir::new().expect("tempdir");
    let log_path = dir.path().join("stderr.log");
    let sink = DiagnosticSink::new();
    sink.attach(DiagnosticChannel::open(&log_path).await.expect("open"))
        .await;
    let factory = ProcessEngineFactory::new(shell_engine(
        r#"cat "$0" >&2; echo >&2; echo started; exec sleep 30"#,
        &["{config}"],
        5,
    ))
    .expect("factory");
    let mut engine = factory
        .create(READY_CONFIG.to_string(), callbacks(dir.path(), sink.clone()))
        .expect("create");

    // WHEN: Starting and giving the forwarder a moment
    engine.start().await.expect("start");
    let mut contents = String::new();
    for _ in 0..40 {
        contents = std::fs::read_to_string(&log_path).unwrap_or_default();
        if contents.contains(READY_CONFIG) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    engine.close().await.expect("close");

    // THEN: The config text arrived through stderr
    assert!(contents.contains(READY_CONFIG), "diagnostics: {contents}");
}

#[tokio::test]
async fn given_engine_never_started_when_closed_then_ok() {
    let dir = TempDir::new().expect("tempdir");
    let factory = ProcessEngineFactory::new(shell_engine("true", &[], 1)).expect("factory");
    let mut engine = factory
        .create(READY_CONFIG.to_string(), callbacks(dir.path(), DiagnosticSink::new()))
        .expect("create");

    assert!(engine.close().await.is_ok());
}
