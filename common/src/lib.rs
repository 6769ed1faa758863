//! Shared primitives for the tunnel extension workspace.
//!
//! Every error enum in the workspace carries an [`ErrorLocation`] so a log line
//! points straight at the call site that produced the failure.

pub mod error;

pub use error::error_location::ErrorLocation;
