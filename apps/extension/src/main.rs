use tunnel_extension::error::ExtensionError;
use tunnel_extension::host::ConsoleHost;
use tunnel_extension::logger::{LogLevels, initialize as LoggerInitialize};

use tunnel_core::APP_DIR_NAME;
use tunnel_core::config::{ConfigCommand, ConfigState, ExtensionConfig};
use tunnel_core::engine::ProcessEngineFactory;
use tunnel_core::exchange::ProfileExchangeServer;
use tunnel_core::lifecycle::{ControllerHandle, LifecycleController};
use tunnel_core::store::{JsonProfileStore, ProfileStore};

use common::ErrorLocation;

use std::env::temp_dir;
use std::fs::create_dir_all;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::signal::ctrl_c;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;

const LOG_DIR_NAME: &str = "logs";
const PROFILES_DIR_NAME: &str = "profiles";

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // The logger may not be up yet.
            eprintln!("{e}");
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(temp_dir)
        .join(APP_DIR_NAME)
}

#[track_caller]
fn create_dir(path: &Path, what: &str) -> Result<(), ExtensionError> {
    create_dir_all(path).map_err(|e| ExtensionError::Extension {
        message: format!("Failed to create {what} directory {}: {e}", path.display()),
        location: ErrorLocation::from(Location::caller()),
    })
}

async fn run() -> Result<(), ExtensionError> {
    let config_dir = config_dir();
    let log_dir = config_dir.join(LOG_DIR_NAME);
    create_dir(&log_dir, "log")?;

    // Initialize logger FIRST
    LoggerInitialize(&log_dir, LogLevels::from_env()?)?;

    info!("Tunnel extension starting");
    info!("Config directory: {}", config_dir.display());

    let config = ExtensionConfig::load(&config_dir)?;
    let paths = config.paths();
    create_dir(&paths.base, "base")?;

    let factory = ProcessEngineFactory::new(config.engine.clone())?;
    let store: Arc<dyn ProfileStore> =
        Arc::new(JsonProfileStore::open(paths.base.join(PROFILES_DIR_NAME))?);
    let config_state = ConfigState::new(config_dir, config);

    let host = Arc::new(ConsoleHost::new());
    let mut cancellation = host.cancellation();
    let handle = LifecycleController::spawn(
        config_state.clone(),
        Arc::clone(&store),
        factory,
        host.clone(),
    );

    let exchange = ProfileExchangeServer::new(&paths.profile_socket, store, config_state.clone());
    exchange.start().await?;

    let outcome = match handle.start().await {
        Ok(()) => serve(&handle, &config_state, &mut cancellation).await,
        Err(e) => Err(e.into()),
    };

    exchange.cancel().await;
    if let Err(e) = handle.teardown().await {
        warn!("Teardown failed: {e}");
    }
    info!("Tunnel extension stopped");
    outcome
}

/// Run until interrupted, cancelled by the controller, or stopped through
/// the control socket. SIGHUP re-reads config.json and reloads the engine.
async fn serve(
    handle: &ControllerHandle,
    config_state: &ConfigState,
    cancellation: &mut watch::Receiver<Option<String>>,
) -> Result<(), ExtensionError> {
    let mut hangup = signal(SignalKind::hangup()).map_err(|e| ExtensionError::Extension {
        message: format!("Failed to install SIGHUP handler: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;
    let mut state_rx = handle.watch_state();

    loop {
        tokio::select! {
            _ = ctrl_c() => {
                info!("Interrupted, shutting down");
                return Ok(());
            }
            _ = hangup.recv() => {
                info!("SIGHUP received, reloading");
                if let Err(e) = config_state.update(ConfigCommand::ReloadFromDisk).await {
                    warn!("Keeping previous config: {e}");
                }
                if let Err(e) = handle.reload().await {
                    error!("Reload failed: {e}");
                }
            }
            _ = cancellation.changed() => {
                let reason = cancellation.borrow().clone().unwrap_or_default();
                return Err(ExtensionError::Core {
                    message: format!("Tunnel cancelled: {reason}"),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let state = state_rx.borrow().clone();
                if state.is_stopped() {
                    info!("Tunnel {state}");
                    return Ok(());
                }
            }
        }
    }
}
