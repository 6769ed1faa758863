use crate::ENGINE_CONFIG_FILE_NAME;
use crate::config::EngineConfig;
use crate::engine::{Engine, EngineFactory, PlatformCallbacks};
use crate::error::engine::EngineError;

use common::ErrorLocation;

use std::panic::Location;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use backoff::{ExponentialBackoff, backoff::Backoff};
use log::{debug, info, trace, warn};
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child as TokioChild, ChildStdout, Command as TokioCommand};
use tokio::spawn as TokioSpawn;
use tokio::time::{sleep as TokioSleep, timeout};

const CONFIG_PLACEHOLDER: &str = "{config}";
const WORKING_DIR_PLACEHOLDER: &str = "{working_dir}";
const KILL_VERIFY_MAX_ELAPSED: Duration = Duration::from_secs(5);

/// Launches the engine binary named in [`EngineConfig`].
///
/// The engine settings are captured when the factory is built.
pub struct ProcessEngineFactory {
    config: EngineConfig,
    ready: Regex,
}

impl ProcessEngineFactory {
    #[track_caller]
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let ready = Regex::new(&config.ready_pattern).map_err(|e| EngineError::Config {
            message: format!("Invalid ready pattern '{}': {e}", config.ready_pattern),
            location: ErrorLocation::from(Location::caller()),
        })?;
        Ok(Self { config, ready })
    }
}

impl EngineFactory for ProcessEngineFactory {
    type Engine = ProcessEngine;

    fn create(
        &self,
        config: String,
        callbacks: PlatformCallbacks,
    ) -> Result<ProcessEngine, EngineError> {
        if config.trim().is_empty() {
            return Err(EngineError::Config {
                message: "Engine configuration is empty".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        serde_json::from_str::<serde_json::Value>(&config).map_err(|e| EngineError::Config {
            message: format!("Engine configuration is not valid JSON: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

        Ok(ProcessEngine {
            settings: self.config.clone(),
            ready: self.ready.clone(),
            config,
            callbacks,
            child: None,
        })
    }
}

/// Engine running as a child process.
pub struct ProcessEngine {
    settings: EngineConfig,
    ready: Regex,
    config: String,
    callbacks: PlatformCallbacks,
    child: Option<TokioChild>,
}

impl ProcessEngine {
    fn build_command(&self, config_path: &Path) -> TokioCommand {
        let working_dir = self.callbacks.working_dir();
        let config_arg = config_path.to_string_lossy();
        let working_arg = working_dir.to_string_lossy();

        let mut cmd = TokioCommand::new(&self.settings.binary);
        for arg in &self.settings.args {
            cmd.arg(
                arg.replace(CONFIG_PLACEHOLDER, &config_arg)
                    .replace(WORKING_DIR_PLACEHOLDER, &working_arg),
            );
        }
        cmd.current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn wait_until_ready(&self, stdout: ChildStdout) -> Result<(), EngineError> {
        let mut lines = BufReader::new(stdout).lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    trace!("Engine output: {line}");
                    if self.ready.is_match(&line) {
                        break;
                    }
                }
                Ok(None) => {
                    return Err(EngineError::Start {
                        message: format!("{} exited before becoming ready", self.settings.binary),
                        location: ErrorLocation::from(Location::caller()),
                        source: None,
                    });
                }
                Err(e) => {
                    return Err(EngineError::Start {
                        message: format!("Failed to read engine output: {e}"),
                        location: ErrorLocation::from(Location::caller()),
                        source: Some(Box::new(e)),
                    });
                }
            }
        }

        TokioSpawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                trace!("Engine output: {line}");
            }
        });
        Ok(())
    }
}

impl Engine for ProcessEngine {
    async fn start(&mut self) -> Result<(), EngineError> {
        if self.child.is_some() {
            return Err(EngineError::Start {
                message: "Engine already started".to_string(),
                location: ErrorLocation::from(Location::caller()),
                source: None,
            });
        }

        let config_path = self.callbacks.working_dir().join(ENGINE_CONFIG_FILE_NAME);
        tokio::fs::write(&config_path, &self.config)
            .await
            .map_err(|e| EngineError::Start {
                message: format!("Failed to write {}: {e}", config_path.display()),
                location: ErrorLocation::from(Location::caller()),
                source: Some(Box::new(e)),
            })?;

        let mut child = self
            .build_command(&config_path)
            .spawn()
            .map_err(|e| EngineError::Start {
                message: format!("Failed to spawn {}: {e}", self.settings.binary),
                location: ErrorLocation::from(Location::caller()),
                source: Some(Box::new(e)),
            })?;
        info!(
            "Spawned {} for session {} (PID: {:?})",
            self.settings.binary,
            self.callbacks.session(),
            child.id()
        );

        if let Some(stderr) = child.stderr.take() {
            let callbacks = self.callbacks.clone();
            TokioSpawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    callbacks.write_diagnostic(&line).await;
                }
            });
        }

        let stdout = child.stdout.take().ok_or_else(|| EngineError::Start {
            message: "Engine process has no stdout".to_string(),
            location: ErrorLocation::from(Location::caller()),
            source: None,
        })?;

        let limit = Duration::from_secs(self.settings.start_timeout_secs);
        let outcome = match timeout(limit, self.wait_until_ready(stdout)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(EngineError::Timeout {
                message: format!("{} not ready within {limit:?}", self.settings.binary),
                location: ErrorLocation::from(Location::caller()),
            }),
        };

        if let Err(e) = outcome {
            warn!("Engine failed to start, killing it: {e}");
            let _ = child.kill().await;
            return Err(e);
        }

        info!("Engine ready for session {}", self.callbacks.session());
        self.child = Some(child);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        let Some(mut child) = self.child.take() else {
            debug!("Engine not running, nothing to close");
            return Ok(());
        };

        let pid = child.id();
        child.start_kill().map_err(|e| EngineError::Stop {
            message: format!("Failed to signal engine (PID: {pid:?}): {e}"),
            location: ErrorLocation::from(Location::caller()),
            source: Some(Box::new(e)),
        })?;

        let mut backoff = ExponentialBackoff {
            max_elapsed_time: Some(KILL_VERIFY_MAX_ELAPSED),
            ..Default::default()
        };

        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    info!("Engine (PID: {pid:?}) exited with {status}");
                    return Ok(());
                }
                Ok(None) => {}
                Err(e) => {
                    return Err(EngineError::Stop {
                        message: format!("Failed to query engine (PID: {pid:?}): {e}"),
                        location: ErrorLocation::from(Location::caller()),
                        source: Some(Box::new(e)),
                    });
                }
            }

            match backoff.next_backoff() {
                Some(duration) => {
                    trace!("Engine (PID: {pid:?}) still alive, retrying after {duration:?}");
                    TokioSleep(duration).await;
                }
                None => {
                    return Err(EngineError::Stop {
                        message: format!("Engine (PID: {pid:?}) still running after kill"),
                        location: ErrorLocation::from(Location::caller()),
                        source: None,
                    });
                }
            }
        }
    }
}
