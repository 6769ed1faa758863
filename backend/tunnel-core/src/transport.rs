//! Local socket plumbing shared by the exchange and control servers.
//!
//! Sockets are bound with mode `0600` and every accepted peer must run as the
//! same user that owns the socket file.

use crate::error::exchange::ExchangeError;

use common::ErrorLocation;

use std::fs::{Permissions, metadata, remove_file, set_permissions};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep as TokioSleep;

const SOCKET_MODE: u32 = 0o600;
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Bind a Unix listener at `path`, replacing a stale socket file.
pub(crate) fn bind_local(path: &Path) -> Result<(UnixListener, u32), ExchangeError> {
    if path.exists() {
        debug!("Removing stale socket file {}", path.display());
        remove_file(path).map_err(|e| ExchangeError::Bind {
            message: format!("Failed to remove stale socket {}: {e}", path.display()),
            location: ErrorLocation::from(Location::caller()),
        })?;
    }

    let listener = UnixListener::bind(path).map_err(|e| ExchangeError::Bind {
        message: format!("Failed to bind {}: {e}", path.display()),
        location: ErrorLocation::from(Location::caller()),
    })?;

    set_permissions(path, Permissions::from_mode(SOCKET_MODE)).map_err(|e| {
        ExchangeError::Bind {
            message: format!("Failed to restrict {}: {e}", path.display()),
            location: ErrorLocation::from(Location::caller()),
        }
    })?;

    let owner = metadata(path)
        .map_err(|e| ExchangeError::Bind {
            message: format!("Failed to stat {}: {e}", path.display()),
            location: ErrorLocation::from(Location::caller()),
        })?
        .uid();

    Ok((listener, owner))
}

fn peer_is_trusted(stream: &UnixStream, owner: u32) -> bool {
    match stream.peer_cred() {
        Ok(cred) => cred.uid() == owner,
        Err(e) => {
            warn!("Could not read peer credentials: {e}");
            false
        }
    }
}

/// Accept loop running in the background until shut down.
pub(crate) struct AcceptLoop {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
    path: PathBuf,
}

impl AcceptLoop {
    /// Spawn the accept loop. `on_accept` receives every trusted peer stream.
    pub(crate) fn spawn<F>(
        name: &'static str,
        listener: UnixListener,
        owner: u32,
        path: PathBuf,
        on_accept: F,
    ) -> Self
    where
        F: Fn(UnixStream) + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        info!("{name} listening on {}", path.display());

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => {
                            if peer_is_trusted(&stream, owner) {
                                on_accept(stream);
                            } else {
                                warn!("{name} rejected a peer owned by another user");
                            }
                        }
                        Err(e) => {
                            error!("{name} accept failed: {e}");
                            TokioSleep(ACCEPT_RETRY_DELAY).await;
                        }
                    },
                }
            }
            debug!("{name} accept loop finished");
        });

        Self {
            shutdown_tx,
            task,
            path,
        }
    }

    /// Stop accepting, wait for the loop to exit and remove the socket file.
    ///
    /// Connections already handed to `on_accept` are left running.
    pub(crate) async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!("Accept loop ended abnormally: {e}");
        }
        if let Err(e) = remove_file(&self.path) {
            debug!("Socket file {} not removed: {e}", self.path.display());
        }
    }
}
