//! Control channel: lets peers and the running engine ask the lifecycle
//! controller to reload or stop.
//!
//! Requests never touch the engine directly. They are queued onto the
//! controller, which applies them in order against its own state.

mod channel;
mod server;

pub use channel::CommandChannel;
pub use server::{ControlServer, send_control_request};
