use crate::error::engine::EngineError;

use common::ErrorLocation;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum LifecycleError {
    /// Directory creation or channel open failed.
    #[error("Setup Error: {message} {location}")]
    Setup {
        message: String,
        location: ErrorLocation,
    },

    /// The selected profile is missing, unreadable, or rejected by the engine.
    #[error("Config Error: {message} {location}")]
    Config {
        message: String,
        location: ErrorLocation,
    },

    #[error("Engine Runtime Error: {message} {location}")]
    EngineRuntime {
        message: String,
        location: ErrorLocation,
        #[source]
        source: EngineError,
    },

    #[error("Invalid Transition Error: {message} {location}")]
    InvalidTransition {
        message: String,
        location: ErrorLocation,
    },

    #[error("Controller Unavailable Error: {message} {location}")]
    Unavailable {
        message: String,
        location: ErrorLocation,
    },
}
