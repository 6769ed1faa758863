use common::ErrorLocation;

use tunnel_core::error::config::ConfigError;
use tunnel_core::error::engine::EngineError;
use tunnel_core::error::exchange::ExchangeError;
use tunnel_core::error::lifecycle::LifecycleError;
use tunnel_core::error::store::StoreError;

use std::panic::Location;

use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the extension host process.
///
/// Core errors are flattened to their message so the whole enum stays
/// serializable for status output.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ExtensionError {
    /// Error from this app
    #[error("Extension Error: {message} {location}")]
    Extension {
        message: String,
        location: ErrorLocation,
    },

    /// Error from tunnel-core (store, engine, exchange, lifecycle)
    #[error("Core Error: {message} {location}")]
    Core {
        message: String,
        location: ErrorLocation,
    },

    #[error("Config Error: {message} {location}")]
    Config {
        message: String,
        location: ErrorLocation,
    },
}

impl From<ConfigError> for ExtensionError {
    #[track_caller]
    fn from(error: ConfigError) -> Self {
        ExtensionError::Config {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

macro_rules! core_error_from {
    ($($source:ty),+ $(,)?) => {
        $(
            impl From<$source> for ExtensionError {
                #[track_caller]
                fn from(error: $source) -> Self {
                    ExtensionError::Core {
                        message: error.to_string(),
                        location: ErrorLocation::from(Location::caller()),
                    }
                }
            }
        )+
    };
}

core_error_from!(EngineError, ExchangeError, LifecycleError, StoreError);
