//! Config state management using actor pattern.
//!
//! Replaces ambient shared preferences with one explicit object that is
//! cloned into every component needing settings.
//!
//! # Architecture
//!
//! - Commands sent via mpsc channel, each with a reply slot
//! - Dedicated task processes commands sequentially
//! - Reads use Arc<RwLock<T>> snapshots

use crate::config::ExtensionConfig;
use crate::error::config::ConfigError;

use common::ErrorLocation;

use std::panic::Location;
use std::path::PathBuf;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};

/// Commands that mutate config state.
#[derive(Debug, Clone)]
pub enum ConfigCommand {
    /// Point the selection at another profile id.
    SelectProfile(i64),

    /// Swap in a whole new config (validated first).
    Replace(ExtensionConfig),

    /// Re-read config.json from the config directory.
    ReloadFromDisk,
}

type Envelope = (ConfigCommand, oneshot::Sender<Result<(), ConfigError>>);

/// Shared, clonable holder of the current [`ExtensionConfig`].
///
/// All clones share the same underlying state.
#[derive(Clone)]
pub struct ConfigState {
    command_tx: Arc<Mutex<Option<mpsc::Sender<Envelope>>>>,

    config: Arc<RwLock<ExtensionConfig>>,

    /// Where config.json lives. `None` keeps the state in memory only.
    config_dir: Option<Arc<PathBuf>>,

    actor_init: Arc<Mutex<bool>>,
}

impl ConfigState {
    /// Config state persisted to `{config_dir}/config.json` on every change.
    pub fn new(config_dir: PathBuf, config: ExtensionConfig) -> Self {
        Self::build(Some(Arc::new(config_dir)), config)
    }

    /// Config state that never touches disk.
    pub fn in_memory(config: ExtensionConfig) -> Self {
        Self::build(None, config)
    }

    fn build(config_dir: Option<Arc<PathBuf>>, config: ExtensionConfig) -> Self {
        Self {
            command_tx: Arc::new(Mutex::new(None)),
            config: Arc::new(RwLock::new(config)),
            config_dir,
            actor_init: Arc::new(Mutex::new(false)),
        }
    }

    /// Apply a config command and wait until it has been applied.
    ///
    /// Spawns the actor on first call.
    pub async fn update(&self, cmd: ConfigCommand) -> Result<(), ConfigError> {
        self.ensure_actor().await;

        let tx = {
            let tx_guard = self.command_tx.lock().await;
            tx_guard.clone().ok_or_else(|| ConfigError::StateUnavailable {
                location: ErrorLocation::from(Location::caller()),
                reason: "Config actor not initialized".to_string(),
            })?
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send((cmd, reply_tx))
            .await
            .map_err(|e| ConfigError::StateUnavailable {
                location: ErrorLocation::from(Location::caller()),
                reason: format!("Config actor died: {}", e),
            })?;

        reply_rx.await.map_err(|e| ConfigError::StateUnavailable {
            location: ErrorLocation::from(Location::caller()),
            reason: format!("Config actor dropped reply: {}", e),
        })?
    }

    /// Current config snapshot.
    pub async fn get_config(&self) -> ExtensionConfig {
        self.config.read().await.clone()
    }

    pub async fn selected_profile(&self) -> Option<i64> {
        self.config.read().await.selected_profile()
    }

    async fn ensure_actor(&self) {
        let mut init_guard = self.actor_init.lock().await;
        if !*init_guard {
            let (tx, rx) = mpsc::channel(32);

            let mut tx_guard = self.command_tx.lock().await;
            *tx_guard = Some(tx);
            drop(tx_guard);

            tokio::spawn(config_actor(
                rx,
                Arc::clone(&self.config),
                self.config_dir.clone(),
            ));

            *init_guard = true;
            info!("Config state actor spawned");
        }
    }
}

/// Config actor task.
///
/// Processes config commands sequentially. Memory is updated before disk so a
/// failed write never leaves readers with a stale selection.
async fn config_actor(
    mut command_rx: mpsc::Receiver<Envelope>,
    config: Arc<RwLock<ExtensionConfig>>,
    config_dir: Option<Arc<PathBuf>>,
) {
    info!("Config state actor started");

    while let Some((cmd, reply)) = command_rx.recv().await {
        let result = apply(cmd, &config, config_dir.as_deref()).await;
        if reply.send(result).is_err() {
            warn!("Config update caller went away before the reply");
        }
    }

    info!("Config state actor stopped");
}

async fn apply(
    cmd: ConfigCommand,
    config: &RwLock<ExtensionConfig>,
    config_dir: Option<&PathBuf>,
) -> Result<(), ConfigError> {
    let new_config = match cmd {
        ConfigCommand::SelectProfile(id) => {
            let mut next = config.read().await.clone();
            next.selected_profile_id = id;
            next
        }
        ConfigCommand::Replace(next) => next,
        ConfigCommand::ReloadFromDisk => {
            let dir = config_dir.ok_or_else(|| ConfigError::StateUnavailable {
                location: ErrorLocation::from(Location::caller()),
                reason: "Config state has no backing directory to reload from".to_string(),
            })?;
            let loaded = ExtensionConfig::load(dir)?;
            *config.write().await = loaded;
            info!("Config reloaded from {}", dir.display());
            return Ok(());
        }
    };

    if let Err(e) = new_config.validate() {
        error!("Config validation failed: {}", e);
        return Err(e);
    }

    *config.write().await = new_config.clone();
    info!("Config updated in memory");

    if let Some(dir) = config_dir {
        match new_config.save(dir) {
            Ok(_) => info!("Config saved to disk"),
            Err(e) => error!("Config saved to memory but disk write failed: {}", e),
        }
    }

    Ok(())
}
