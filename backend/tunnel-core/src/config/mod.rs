pub mod state;

pub use state::{ConfigCommand, ConfigState};

use crate::error::config::ConfigError;
use crate::{
    APP_DIR_NAME, CACHE_DIR_NAME, COMMAND_SOCKET_NAME, PROFILE_SOCKET_NAME, STDERR_LOG_RELATIVE,
    WORKING_DIR_NAME,
};

use common::ErrorLocation;

use std::panic::Location;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "config.json";
const CONFIG_VERSION: u32 = 1;
const MAX_SETTLE_DELAY_MS: u64 = 5_000;
const MAX_TIMEOUT_SECS: u64 = 300;

/// Value of `selected_profile_id` when nothing has been selected yet.
pub const NO_SELECTION: i64 = -1;

// ============================================
// CONFIG STRUCTS
// ============================================

/// How to launch the packet-forwarding engine process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_engine_binary")]
    pub binary: String,
    /// Arguments; `{config}` and `{working_dir}` are substituted at launch.
    #[serde(default = "default_engine_args")]
    pub args: Vec<String>,
    /// Stdout line pattern that signals readiness.
    #[serde(default = "default_ready_pattern")]
    pub ready_pattern: String,
    #[serde(default = "default_start_timeout_secs")]
    pub start_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: default_engine_binary(),
            args: default_engine_args(),
            ready_pattern: default_ready_pattern(),
            start_timeout_secs: default_start_timeout_secs(),
        }
    }
}

/// Process-wide settings handed to the controller and exchange server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    #[serde(default = "default_selected_profile_id")]
    pub selected_profile_id: i64,

    /// Grace period between accepting a peer and sending the catalogue.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    #[serde(default = "default_engine_stop_timeout_secs")]
    pub engine_stop_timeout_secs: u64,

    #[serde(default = "default_control_enabled")]
    pub control_enabled: bool,

    #[serde(default)]
    pub engine: EngineConfig,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            base_dir: default_base_dir(),
            selected_profile_id: default_selected_profile_id(),
            settle_delay_ms: default_settle_delay_ms(),
            engine_stop_timeout_secs: default_engine_stop_timeout_secs(),
            control_enabled: default_control_enabled(),
            engine: EngineConfig::default(),
        }
    }
}

/// Filesystem layout derived from [`ExtensionConfig::base_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionPaths {
    pub base: PathBuf,
    pub cache: PathBuf,
    pub stderr_log: PathBuf,
    pub working: PathBuf,
    pub profile_socket: PathBuf,
    pub command_socket: PathBuf,
}

// ============================================
// DEFAULT FUNCTIONS
// ============================================

fn default_version() -> u32 {
    CONFIG_VERSION
}
fn default_base_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
}
fn default_selected_profile_id() -> i64 {
    NO_SELECTION
}
fn default_settle_delay_ms() -> u64 {
    100
}
fn default_engine_stop_timeout_secs() -> u64 {
    10
}
fn default_control_enabled() -> bool {
    true
}
fn default_engine_binary() -> String {
    "sing-box".to_string()
}
fn default_engine_args() -> Vec<String> {
    ["run", "-c", "{config}", "-D", "{working_dir}"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_ready_pattern() -> String {
    r"(?i)\bstarted\b".to_string()
}
fn default_start_timeout_secs() -> u64 {
    15
}

// ============================================
// IMPLEMENTATION
// ============================================

impl ExtensionConfig {
    /// Load config from {config_dir}/config.json.
    ///
    /// A missing file yields defaults; a present but corrupted or invalid file
    /// is an error.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            info!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path).map_err(|e| {
            warn!("Failed to read config file: {}", e);
            ConfigError::ReadError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                source: e,
            }
        })?;

        let config: ExtensionConfig = serde_json::from_str(&contents).map_err(|e| {
            warn!("Failed to parse config JSON: {}", e);
            ConfigError::ParseError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                reason: e.to_string(),
            }
        })?;

        config.validate()?;

        info!("Config loaded from {}", config_path.display());
        Ok(config)
    }

    /// Save config to {config_dir}/config.json using temp file + rename.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        self.validate()?;

        std::fs::create_dir_all(config_dir).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: config_dir.to_path_buf(),
            source: e,
        })?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let temp_path = config_dir.join(format!("{}.tmp", CONFIG_FILE_NAME));

        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializeError {
            location: ErrorLocation::from(Location::caller()),
            reason: e.to_string(),
        })?;

        std::fs::write(&temp_path, json).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: temp_path.clone(),
            source: e,
        })?;

        std::fs::rename(&temp_path, &config_path).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: config_path.clone(),
            source: e,
        })?;

        info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Validate config values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version == 0 || self.version > CONFIG_VERSION {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!(
                    "Invalid version: {} (expected 1-{})",
                    self.version, CONFIG_VERSION
                ),
            });
        }

        if self.base_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "base_dir cannot be empty".to_string(),
            });
        }

        if self.settle_delay_ms > MAX_SETTLE_DELAY_MS {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!(
                    "Invalid settle delay: {}ms (must be at most {MAX_SETTLE_DELAY_MS}ms)",
                    self.settle_delay_ms
                ),
            });
        }

        for (name, value) in [
            ("engine_stop_timeout_secs", self.engine_stop_timeout_secs),
            ("engine.start_timeout_secs", self.engine.start_timeout_secs),
        ] {
            if value == 0 || value > MAX_TIMEOUT_SECS {
                return Err(ConfigError::ValidationError {
                    location: ErrorLocation::from(Location::caller()),
                    reason: format!("Invalid {name}: {value} (must be 1-{MAX_TIMEOUT_SECS})"),
                });
            }
        }

        if self.engine.binary.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "engine.binary cannot be empty".to_string(),
            });
        }

        if let Err(e) = Regex::new(&self.engine.ready_pattern) {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!("Invalid engine.ready_pattern: {e}"),
            });
        }

        Ok(())
    }

    pub fn paths(&self) -> ExtensionPaths {
        let base = self.base_dir.clone();
        ExtensionPaths {
            cache: base.join(CACHE_DIR_NAME),
            stderr_log: base.join(STDERR_LOG_RELATIVE),
            working: base.join(WORKING_DIR_NAME),
            profile_socket: base.join(PROFILE_SOCKET_NAME),
            command_socket: base.join(COMMAND_SOCKET_NAME),
            base,
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn engine_stop_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_stop_timeout_secs)
    }

    /// Selected profile id, or `None` when nothing was ever selected.
    pub fn selected_profile(&self) -> Option<i64> {
        (self.selected_profile_id != NO_SELECTION).then_some(self.selected_profile_id)
    }
}
