//! Engine lifecycle: one actor owns the engine and walks it through
//! start, stop, reload and teardown.
//!
//! Every trigger (host, control socket, engine callback) is queued on the
//! same channel, so transitions never overlap.

pub(crate) mod controller;
mod host;
mod state;
mod workdir;

pub use controller::{ControllerHandle, LifecycleController, LifecycleRequest};
pub use host::HostPlatform;
pub use state::LifecycleState;
