use crate::control::channel::CommandChannel;
use crate::error::exchange::ExchangeError;
use crate::protocol::{
    ControlRequest, MessageType, decode_control_request, decode_control_result, decode_error,
    decode_message_type, encode_control_request, encode_control_result, encode_error, read_frame,
    write_frame,
};
use crate::transport::{AcceptLoop, bind_local};

use common::ErrorLocation;

use std::panic::Location;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use tokio::net::UnixStream;
use uuid::Uuid;

/// Local command socket through which a peer asks for reload or stop.
///
/// Each request is answered with a control result once the controller has
/// finished acting on it.
pub struct ControlServer {
    accept_loop: AcceptLoop,
    path: PathBuf,
}

impl ControlServer {
    pub fn start(path: impl Into<PathBuf>, channel: CommandChannel) -> Result<Self, ExchangeError> {
        let path = path.into();
        let (listener, owner) = bind_local(&path)?;

        let accept_loop = AcceptLoop::spawn(
            "Control server",
            listener,
            owner,
            path.clone(),
            move |stream| {
                let channel = channel.clone();
                tokio::spawn(async move {
                    let id = Uuid::new_v4();
                    if let Err(e) = serve_control_peer(id, stream, channel).await {
                        warn!("Control peer {id} ended with error: {e}");
                    }
                });
            },
        );

        Ok(Self { accept_loop, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn close(self) {
        self.accept_loop.shutdown().await;
        info!("Control server closed");
    }
}

async fn serve_control_peer(
    id: Uuid,
    mut stream: UnixStream,
    channel: CommandChannel,
) -> Result<(), ExchangeError> {
    debug!("Control peer {id} connected");

    while let Some(body) = read_frame(&mut stream).await? {
        if body.is_empty() {
            continue;
        }

        let request = match decode_control_request(&body) {
            Ok(request) => request,
            Err(e) => {
                warn!("Control peer {id}: {e}");
                write_frame(&mut stream, &encode_error(&e.to_string())?).await?;
                break;
            }
        };

        info!("Control peer {id} requested {request:?}");
        let outcome = channel.request(request).await.map_err(|e| e.to_string());
        write_frame(&mut stream, &encode_control_result(&outcome)?).await?;
    }

    debug!("Control peer {id} disconnected");
    Ok(())
}

/// Send one control request to the socket at `path` and wait for the result.
///
/// The outer error covers transport and framing; the inner one is the
/// controller's refusal or failure.
pub async fn send_control_request(
    path: &Path,
    request: ControlRequest,
) -> Result<Result<(), String>, ExchangeError> {
    let mut stream = UnixStream::connect(path).await?;
    write_frame(&mut stream, &encode_control_request(request)?).await?;

    let body = read_frame(&mut stream)
        .await?
        .ok_or_else(|| ExchangeError::Read {
            message: "Control server closed the connection".to_string(),
            location: ErrorLocation::from(Location::caller()),
        })?;

    match decode_message_type(&body)? {
        MessageType::ControlResult => Ok(decode_control_result(&body)?),
        MessageType::ErrorMessage => Ok(Err(decode_error(&body)?)),
        other => Err(ExchangeError::Protocol {
            message: format!("Control server sent unexpected {other:?}"),
            location: ErrorLocation::from(Location::caller()),
        }),
    }
}
