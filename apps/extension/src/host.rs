//! Host adapter for running the extension as a plain console process.

use tunnel_core::lifecycle::HostPlatform;

use std::sync::atomic::{AtomicBool, Ordering};

use log::{error, info, warn};
use tokio::sync::watch;

/// Logs lifecycle notices and turns a tunnel cancellation into a shutdown
/// signal for `main`.
pub struct ConsoleHost {
    reasserting: AtomicBool,
    cancelled_tx: watch::Sender<Option<String>>,
}

impl Default for ConsoleHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleHost {
    pub fn new() -> Self {
        let (cancelled_tx, _) = watch::channel(None);
        Self {
            reasserting: AtomicBool::new(false),
            cancelled_tx,
        }
    }

    pub fn is_reasserting(&self) -> bool {
        self.reasserting.load(Ordering::SeqCst)
    }

    /// Resolves to `Some(reason)` once the tunnel has been cancelled.
    pub fn cancellation(&self) -> watch::Receiver<Option<String>> {
        self.cancelled_tx.subscribe()
    }
}

impl HostPlatform for ConsoleHost {
    fn set_reasserting(&self, reasserting: bool) {
        self.reasserting.store(reasserting, Ordering::SeqCst);
        if reasserting {
            info!("Tunnel reasserting");
        } else {
            info!("Tunnel reassertion finished");
        }
    }

    fn notify_user(&self, message: &str) {
        warn!("Notice: {message}");
    }

    fn cancel_tunnel_with_error(&self, message: &str) {
        error!("Tunnel cancelled: {message}");
        self.cancelled_tx.send_replace(Some(message.to_string()));
    }
}
