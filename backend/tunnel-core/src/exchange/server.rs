use crate::config::ConfigState;
use crate::error::exchange::ExchangeError;
use crate::exchange::connection::ProfileConnection;
use crate::store::ProfileStore;
use crate::transport::{AcceptLoop, bind_local};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio::time::sleep as TokioSleep;

/// Profile exchange listener.
///
/// `start` and `cancel` are both idempotent. Cancelling stops new peers from
/// connecting; peers already being served run to completion.
pub struct ProfileExchangeServer {
    socket_path: PathBuf,
    store: Arc<dyn ProfileStore>,
    config: ConfigState,
    running: Mutex<Option<AcceptLoop>>,
}

impl ProfileExchangeServer {
    pub fn new(
        socket_path: impl Into<PathBuf>,
        store: Arc<dyn ProfileStore>,
        config: ConfigState,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            store,
            config,
            running: Mutex::new(None),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub async fn start(&self) -> Result<(), ExchangeError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("Profile exchange already listening");
            return Ok(());
        }

        let (listener, owner) = bind_local(&self.socket_path)?;
        let store = Arc::clone(&self.store);
        let config = self.config.clone();

        *running = Some(AcceptLoop::spawn(
            "Profile exchange",
            listener,
            owner,
            self.socket_path.clone(),
            move |stream| {
                let connection = ProfileConnection::new(stream, Arc::clone(&store), config.clone());
                let config = config.clone();
                tokio::spawn(async move {
                    // Peers may connect before they are ready to read.
                    let settle = config.get_config().await.settle_delay();
                    TokioSleep(settle).await;

                    let id = connection.id();
                    if let Err(e) = connection.run().await {
                        warn!("Connection {id} ended with error: {e}");
                    }
                });
            },
        ));

        Ok(())
    }

    pub async fn cancel(&self) {
        let Some(accept_loop) = self.running.lock().await.take() else {
            debug!("Profile exchange not running");
            return;
        };
        accept_loop.shutdown().await;
        info!("Profile exchange stopped accepting connections");
    }
}
