//! Domain models for the tunnel extension.
//!
//! This crate contains pure data structures representing stored profiles and
//! the preview records handed to peer processes. Models have no business
//! logic beyond construction-time validation.
//!
//! ## Architecture
//!
//! - **models** (this crate): Pure data structures
//! - **tunnel-core**: Lifecycle, wire protocol and storage operating on models
//! - **tunnel-extension**: Host adapter wiring everything together

pub mod error;
pub mod profile;

pub use common::ErrorLocation;
pub use error::model_error::ModelError;
pub use profile::builder::ProfileBuilder;
pub use profile::preview::ProfilePreview;
pub use profile::{Profile, ProfileType, RemoteSettings};

#[cfg(test)]
mod tests;
