use common::ErrorLocation;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ControlError {
    #[error("No Active Session Error: {message} {location}")]
    NoActiveSession {
        message: String,
        location: ErrorLocation,
    },

    #[error("Stale Session Error: session {session} is no longer active {location}")]
    StaleSession { session: u64, location: ErrorLocation },

    #[error("Controller Unavailable Error: {message} {location}")]
    ControllerUnavailable {
        message: String,
        location: ErrorLocation,
    },

    #[error("Request Failed Error: {message} {location}")]
    RequestFailed {
        message: String,
        location: ErrorLocation,
    },
}
