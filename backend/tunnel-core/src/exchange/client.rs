use crate::error::exchange::ExchangeError;
use crate::protocol::{
    MessageType, ProfileContent, decode_content, decode_error, decode_message_type,
    decode_preview_list, encode_content_request, read_frame, write_frame,
};

use common::ErrorLocation;
use models::ProfilePreview;

use std::panic::Location;
use std::path::Path;

use tokio::net::UnixStream;

/// A decoded server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    PreviewList(Vec<ProfilePreview>),
    Content(ProfileContent),
    Error(String),
}

/// Peer side of the profile exchange.
///
/// Responses to concurrent requests may arrive in any order, so the
/// request helpers assume one outstanding request at a time.
pub struct ProfileExchangeClient {
    stream: UnixStream,
}

impl ProfileExchangeClient {
    pub async fn connect(path: &Path) -> Result<Self, ExchangeError> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self { stream })
    }

    /// Next server frame, or `None` once the server closed the connection.
    pub async fn next_message(&mut self) -> Result<Option<ServerMessage>, ExchangeError> {
        let Some(body) = read_frame(&mut self.stream).await? else {
            return Ok(None);
        };

        let message = match decode_message_type(&body)? {
            MessageType::ProfilePreviewList => ServerMessage::PreviewList(decode_preview_list(&body)?),
            MessageType::ProfileContent => ServerMessage::Content(decode_content(&body)?),
            MessageType::ErrorMessage => ServerMessage::Error(decode_error(&body)?),
            other => {
                return Err(ExchangeError::Protocol {
                    message: format!("Server sent unexpected {other:?}"),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        };
        Ok(Some(message))
    }

    /// Read the catalogue the server sends on connect.
    pub async fn read_preview_list(
        &mut self,
    ) -> Result<Result<Vec<ProfilePreview>, String>, ExchangeError> {
        match self.expect_message().await? {
            ServerMessage::PreviewList(previews) => Ok(Ok(previews)),
            ServerMessage::Error(message) => Ok(Err(message)),
            ServerMessage::Content(_) => Err(ExchangeError::Protocol {
                message: "Expected profile list, got profile content".to_string(),
                location: ErrorLocation::from(Location::caller()),
            }),
        }
    }

    pub async fn request_content(
        &mut self,
        profile_id: i64,
    ) -> Result<Result<ProfileContent, String>, ExchangeError> {
        self.send_frame(&encode_content_request(profile_id)?).await?;
        match self.expect_message().await? {
            ServerMessage::Content(content) => Ok(Ok(content)),
            ServerMessage::Error(message) => Ok(Err(message)),
            ServerMessage::PreviewList(_) => Err(ExchangeError::Protocol {
                message: "Expected profile content, got profile list".to_string(),
                location: ErrorLocation::from(Location::caller()),
            }),
        }
    }

    /// Write an already encoded frame.
    pub async fn send_frame(&mut self, frame: &[u8]) -> Result<(), ExchangeError> {
        write_frame(&mut self.stream, frame).await
    }

    async fn expect_message(&mut self) -> Result<ServerMessage, ExchangeError> {
        self.next_message().await?.ok_or_else(|| ExchangeError::Read {
            message: "Server closed the connection".to_string(),
            location: ErrorLocation::from(Location::caller()),
        })
    }
}
