//! Diagnostic channel for engine and lifecycle failures.
//!
//! The channel is a plain append-only text file under the cache directory.
//! When it is not open, messages fall back to the process logger.

use crate::error::lifecycle::LifecycleError;

use common::ErrorLocation;

use std::io::Error as IoError;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use humantime::format_rfc3339;
use log::{debug, error, warn};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

/// Open diagnostic file. Writes from any number of tasks are serialized.
#[derive(Clone)]
pub struct DiagnosticChannel {
    path: Arc<PathBuf>,
    file: Arc<Mutex<Option<File>>>,
}

impl DiagnosticChannel {
    /// Create or truncate the diagnostic file at `path`.
    pub async fn open(path: &Path) -> Result<Self, LifecycleError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .await
            .map_err(|e| LifecycleError::Setup {
                message: format!("Failed to open diagnostic channel {}: {e}", path.display()),
                location: ErrorLocation::from(Location::caller()),
            })?;

        debug!("Diagnostic channel opened at {}", path.display());

        Ok(Self {
            path: Arc::new(path.to_path_buf()),
            file: Arc::new(Mutex::new(Some(file))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one timestamped line.
    pub async fn write(&self, message: &str) -> Result<(), IoError> {
        let line = format!("[{}] {message}\n", format_rfc3339(SystemTime::now()));
        let mut guard = self.file.lock().await;
        let file = guard
            .as_mut()
            .ok_or_else(|| IoError::other("diagnostic channel is closed"))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }

    /// Flush and release the file. Later writes fail.
    pub async fn close(&self) {
        let mut guard = self.file.lock().await;
        if let Some(mut file) = guard.take()
            && let Err(e) = file.flush().await
        {
            warn!("Failed to flush diagnostic channel on close: {e}");
        }
    }
}

/// Where diagnostic text goes: the open channel, or the process logger.
#[derive(Clone, Default)]
pub struct DiagnosticSink {
    channel: Arc<RwLock<Option<DiagnosticChannel>>>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn attach(&self, channel: DiagnosticChannel) {
        *self.channel.write().await = Some(channel);
    }

    /// Detach and close the current channel, if any.
    pub async fn close(&self) {
        let channel = self.channel.write().await.take();
        if let Some(channel) = channel {
            channel.close().await;
        }
    }

    pub async fn is_open(&self) -> bool {
        self.channel.read().await.is_some()
    }

    /// Write to the channel, falling back to the logger.
    pub async fn write(&self, message: &str) {
        let channel = self.channel.read().await.clone();
        match channel {
            Some(channel) => {
                if let Err(e) = channel.write(message).await {
                    error!("Diagnostic write to {} failed ({e}): {message}", channel.path().display());
                }
            }
            None => error!("{message}"),
        }
    }
}
