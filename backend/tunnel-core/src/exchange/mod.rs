//! Local Profile Exchange: lets companion processes list configured profiles
//! and fetch their content without going through the engine.
//!
//! # Architecture
//!
//! - [`ProfileExchangeServer`] accepts peers on a Unix socket
//! - one [`ProfileConnection`] per peer: catalogue first, then requests
//! - [`ProfileExchangeClient`] is the peer side of the same protocol

mod client;
mod connection;
mod server;

pub use client::{ProfileExchangeClient, ServerMessage};
pub use connection::ProfileConnection;
pub use server::ProfileExchangeServer;
