use crate::config::{ConfigState, NO_SELECTION};
use crate::error::exchange::ExchangeError;
use crate::error::store::StoreError;
use crate::protocol::{
    MessageType, decode_content_request, decode_message_type, encode_content, encode_error,
    encode_preview_list, read_frame, write_frame,
};
use crate::store::{self, ProfileStore};

use common::ErrorLocation;
use models::ProfilePreview;

use std::panic::Location;
use std::sync::Arc;

use log::{debug, error, trace, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use uuid::Uuid;

const WRITE_QUEUE_DEPTH: usize = 32;

/// Where a connection is in its short life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionPhase {
    /// Catalogue not sent yet.
    Greeting,
    /// Catalogue sent; answering content requests.
    Serving,
    Closed,
}

/// Handler for one exchange peer.
///
/// Frames are written by a dedicated task that owns the write half, so
/// responses from concurrently served requests never interleave.
pub struct ProfileConnection {
    id: Uuid,
    stream: UnixStream,
    store: Arc<dyn ProfileStore>,
    config: ConfigState,
}

impl ProfileConnection {
    pub fn new(stream: UnixStream, store: Arc<dyn ProfileStore>, config: ConfigState) -> Self {
        Self {
            id: Uuid::new_v4(),
            stream,
            store,
            config,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Serve the peer until it disconnects or breaks the protocol.
    ///
    /// Returns the writer's outcome; reader-side failures only close the
    /// connection.
    pub async fn run(self) -> Result<(), ExchangeError> {
        let Self {
            id,
            stream,
            store,
            config,
        } = self;
        let mut phase = ConnectionPhase::Greeting;
        debug!("Connection {id} opened");

        let (mut read_half, write_half) = stream.into_split();
        let (frame_tx, frame_rx) = mpsc::channel::<Vec<u8>>(WRITE_QUEUE_DEPTH);
        let writer = tokio::spawn(frame_writer(id, write_half, frame_rx));

        if greet(id, &store, &config, &frame_tx).await {
            enter(id, &mut phase, ConnectionPhase::Serving);
            serve(id, &mut read_half, &store, &frame_tx).await;
        }

        enter(id, &mut phase, ConnectionPhase::Closed);
        drop(frame_tx);
        join_writer(id, writer).await
    }
}

/// Send the preview list. `false` means the connection must close.
async fn greet(
    id: Uuid,
    store: &Arc<dyn ProfileStore>,
    config: &ConfigState,
    frame_tx: &mpsc::Sender<Vec<u8>>,
) -> bool {
    let profiles = match store::blocking(store, |s| s.list()).await {
        Ok(profiles) => profiles,
        Err(e) => {
            error!("Connection {id}: failed to list profiles: {e}");
            queue_error(frame_tx, "failed to load profiles").await;
            return false;
        }
    };

    let selected = config.selected_profile().await.unwrap_or(NO_SELECTION);
    let previews: Vec<ProfilePreview> = profiles
        .iter()
        .map(|p| ProfilePreview::from_profile(p, selected))
        .collect();

    match encode_preview_list(&previews) {
        Ok(frame) => frame_tx.send(frame).await.is_ok(),
        Err(e) => {
            error!("Connection {id}: failed to encode profile list: {e}");
            queue_error(frame_tx, "failed to encode profile list").await;
            false
        }
    }
}

async fn serve(
    id: Uuid,
    read_half: &mut OwnedReadHalf,
    store: &Arc<dyn ProfileStore>,
    frame_tx: &mpsc::Sender<Vec<u8>>,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = frame_tx.closed() => {
                debug!("Connection {id}: writer gone");
                break;
            }
            next = read_frame(read_half) => next,
        };

        let body = match next {
            Ok(Some(body)) => body,
            Ok(None) => {
                debug!("Connection {id}: peer disconnected");
                break;
            }
            Err(ExchangeError::Codec(e)) => {
                warn!("Connection {id}: {e}");
                queue_error(frame_tx, &e.to_string()).await;
                break;
            }
            Err(e) => {
                warn!("Connection {id}: read failed: {e}");
                break;
            }
        };

        if body.is_empty() {
            trace!("Connection {id}: ignoring empty frame");
            continue;
        }

        match decode_message_type(&body) {
            Ok(MessageType::ProfileContentRequest) => match decode_content_request(&body) {
                Ok(profile_id) => {
                    tokio::spawn(serve_content(
                        id,
                        profile_id,
                        Arc::clone(store),
                        frame_tx.clone(),
                    ));
                }
                Err(e) => {
                    warn!("Connection {id}: bad content request: {e}");
                    queue_error(frame_tx, "malformed content request").await;
                    break;
                }
            },
            Ok(other) => {
                warn!("Connection {id}: unexpected {other:?} from peer");
                queue_error(frame_tx, &format!("unexpected message type {other:?}")).await;
                break;
            }
            Err(e) => {
                warn!("Connection {id}: {e}");
                queue_error(frame_tx, &e.to_string()).await;
                break;
            }
        }
    }
}

fn enter(connection: Uuid, phase: &mut ConnectionPhase, next: ConnectionPhase) {
    trace!("Connection {connection}: {phase:?} -> {next:?}");
    *phase = next;
}

async fn serve_content(
    connection: Uuid,
    profile_id: i64,
    store: Arc<dyn ProfileStore>,
    frame_tx: mpsc::Sender<Vec<u8>>,
) {
    let lookup = store::blocking(&store, move |s| {
        let profile = s.get(profile_id)?.ok_or(StoreError::NotFound {
            id: profile_id,
            location: ErrorLocation::from(Location::caller()),
        })?;
        let content = s.read_content(&profile)?;
        Ok((profile, content))
    })
    .await;

    let frame = match lookup {
        Ok((profile, content)) => encode_content(&profile, &content).or_else(|e| {
            error!("Connection {connection}: cannot encode profile {profile_id}: {e}");
            encode_error(&format!("failed to encode profile {profile_id}"))
        }),
        Err(StoreError::NotFound { .. }) => {
            debug!("Connection {connection}: profile {profile_id} not found");
            encode_error(&format!("profile {profile_id} not found"))
        }
        Err(e) => {
            error!("Connection {connection}: failed to load profile {profile_id}: {e}");
            encode_error(&format!("failed to load profile {profile_id}"))
        }
    };

    match frame {
        Ok(frame) => {
            if frame_tx.send(frame).await.is_err() {
                debug!("Connection {connection}: closed before profile {profile_id} was sent");
            }
        }
        Err(e) => error!("Connection {connection}: {e}"),
    }
}

async fn queue_error(frame_tx: &mpsc::Sender<Vec<u8>>, message: &str) {
    match encode_error(message) {
        Ok(frame) => {
            let _ = frame_tx.send(frame).await;
        }
        Err(e) => error!("Failed to encode error frame: {e}"),
    }
}

async fn frame_writer(
    connection: Uuid,
    mut write_half: OwnedWriteHalf,
    mut frame_rx: mpsc::Receiver<Vec<u8>>,
) -> Result<(), ExchangeError> {
    while let Some(frame) = frame_rx.recv().await {
        write_frame(&mut write_half, &frame).await?;
        trace!("Connection {connection}: wrote {} bytes", frame.len());
    }
    if let Err(e) = write_half.shutdown().await {
        trace!("Connection {connection}: shutdown: {e}");
    }
    Ok(())
}

async fn join_writer(
    connection: Uuid,
    writer: tokio::task::JoinHandle<Result<(), ExchangeError>>,
) -> Result<(), ExchangeError> {
    let result = match writer.await {
        Ok(result) => result,
        Err(e) => Err(ExchangeError::Io {
            message: format!("Writer task failed: {e}"),
            location: ErrorLocation::from(Location::caller()),
        }),
    };
    debug!("Connection {connection} closed");
    result
}
