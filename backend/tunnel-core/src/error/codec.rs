use common::ErrorLocation;

use std::panic::Location;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum CodecError {
    #[error("Empty Message Error: {message} {location}")]
    EmptyMessage {
        message: String,
        location: ErrorLocation,
    },

    #[error("Malformed Message Error: {message} {location}")]
    MalformedMessage {
        message: String,
        location: ErrorLocation,
    },

    #[error("Unknown Message Type Error: type 0x{message_type:02x} {location}")]
    UnknownType {
        message_type: u8,
        location: ErrorLocation,
    },

    #[error("Unsupported Version Error: version {version} {location}")]
    UnsupportedVersion { version: u8, location: ErrorLocation },

    #[error("Frame Too Large Error: {length} bytes exceeds {limit} {location}")]
    FrameTooLarge {
        length: usize,
        limit: usize,
        location: ErrorLocation,
    },

    #[error("Encode Error: {message} {location}")]
    Encode {
        message: String,
        location: ErrorLocation,
    },
}

impl From<prost::DecodeError> for CodecError {
    #[track_caller]
    fn from(error: prost::DecodeError) -> Self {
        CodecError::MalformedMessage {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<prost::EncodeError> for CodecError {
    #[track_caller]
    fn from(error: prost::EncodeError) -> Self {
        CodecError::Encode {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
