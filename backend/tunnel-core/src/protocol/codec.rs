//! Frame encoding and decoding.
//!
//! Encoders return a complete frame (length prefix included). Decoders take a
//! frame *body*, i.e. what [`read_frame`] yields or [`unframe`] extracts, and
//! never touch caller state on failure.

use crate::error::codec::CodecError;
use crate::error::exchange::ExchangeError;
use crate::protocol::message::{
    ControlRequest, MAX_FRAME_LEN, MessageType, PROTOCOL_VERSION, ProfileContent,
    WireContentRequest, WireControlResult, WireError, WirePreviewList, WireProfileContent,
    WireProfilePreview,
};

use common::ErrorLocation;
use models::{Profile, ProfilePreview, ProfileType, RemoteSettings};

use std::io::ErrorKind;
use std::panic::Location;

use prost::Message as ProstMessage;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const LENGTH_PREFIX_LEN: usize = 4;
const HEADER_LEN: usize = 2;

#[track_caller]
fn frame(message_type: MessageType, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    let body_len = HEADER_LEN + payload.len();
    if body_len > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge {
            length: body_len,
            limit: MAX_FRAME_LEN,
            location: ErrorLocation::from(Location::caller()),
        });
    }

    let mut buf = Vec::with_capacity(LENGTH_PREFIX_LEN + body_len);
    buf.extend_from_slice(&(body_len as u32).to_be_bytes());
    buf.push(PROTOCOL_VERSION);
    buf.push(message_type.as_byte());
    buf.extend_from_slice(payload);
    Ok(buf)
}

#[track_caller]
fn frame_message<M: ProstMessage>(
    message_type: MessageType,
    message: &M,
) -> Result<Vec<u8>, CodecError> {
    let mut payload = Vec::with_capacity(message.encoded_len());
    message.encode(&mut payload)?;
    frame(message_type, &payload)
}

/// Strip the length prefix from a complete frame and return its body.
#[track_caller]
pub fn unframe(frame: &[u8]) -> Result<&[u8], CodecError> {
    if frame.len() < LENGTH_PREFIX_LEN {
        return Err(CodecError::MalformedMessage {
            message: format!("Frame of {} bytes has no length prefix", frame.len()),
            location: ErrorLocation::from(Location::caller()),
        });
    }

    let (prefix, body) = frame.split_at(LENGTH_PREFIX_LEN);
    let declared = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    if declared != body.len() {
        return Err(CodecError::MalformedMessage {
            message: format!(
                "Frame declares {declared} body bytes but carries {}",
                body.len()
            ),
            location: ErrorLocation::from(Location::caller()),
        });
    }

    Ok(body)
}

/// Read the type tag of a frame body.
///
/// # Errors
///
/// - [`CodecError::EmptyMessage`] for a zero-length body
/// - [`CodecError::MalformedMessage`] when the body has no type byte
/// - [`CodecError::UnsupportedVersion`] for any version other than [`PROTOCOL_VERSION`]
/// - [`CodecError::UnknownType`] for an unrecognized type byte
#[track_caller]
pub fn decode_message_type(body: &[u8]) -> Result<MessageType, CodecError> {
    match body {
        [] => Err(CodecError::EmptyMessage {
            message: String::from("Message body is empty"),
            location: ErrorLocation::from(Location::caller()),
        }),
        [_] => Err(CodecError::MalformedMessage {
            message: String::from("Message body has no type byte"),
            location: ErrorLocation::from(Location::caller()),
        }),
        [version, ..] if *version != PROTOCOL_VERSION => Err(CodecError::UnsupportedVersion {
            version: *version,
            location: ErrorLocation::from(Location::caller()),
        }),
        [_, type_byte, ..] => {
            MessageType::from_byte(*type_byte).ok_or_else(|| CodecError::UnknownType {
                message_type: *type_byte,
                location: ErrorLocation::from(Location::caller()),
            })
        }
    }
}

#[track_caller]
fn payload_of(body: &[u8], expected: MessageType) -> Result<&[u8], CodecError> {
    let actual = decode_message_type(body)?;
    if actual != expected {
        return Err(CodecError::MalformedMessage {
            message: format!("Expected {expected:?} message, got {actual:?}"),
            location: ErrorLocation::from(Location::caller()),
        });
    }
    Ok(&body[HEADER_LEN..])
}

#[track_caller]
fn profile_type_of(code: i32) -> Result<ProfileType, CodecError> {
    ProfileType::from_code(code).ok_or_else(|| CodecError::MalformedMessage {
        message: format!("Unknown profile type code {code}"),
        location: ErrorLocation::from(Location::caller()),
    })
}

/// Encode the profile catalogue. Order is preserved as given.
pub fn encode_preview_list(profiles: &[ProfilePreview]) -> Result<Vec<u8>, CodecError> {
    let message = WirePreviewList {
        profiles: profiles
            .iter()
            .map(|p| WireProfilePreview {
                id: p.id,
                name: p.name.clone(),
                profile_type: p.profile_type.code(),
                is_selected: p.is_selected,
            })
            .collect(),
    };
    frame_message(MessageType::ProfilePreviewList, &message)
}

pub fn decode_preview_list(body: &[u8]) -> Result<Vec<ProfilePreview>, CodecError> {
    let message = WirePreviewList::decode(payload_of(body, MessageType::ProfilePreviewList)?)?;
    message
        .profiles
        .into_iter()
        .map(|p| {
            Ok(ProfilePreview {
                id: p.id,
                name: p.name,
                profile_type: profile_type_of(p.profile_type)?,
                is_selected: p.is_selected,
            })
        })
        .collect()
}

/// Encode a profile with its configuration text.
///
/// The remote location is written only for non-local profiles; auto-update
/// fields and the last-updated timestamp only for remote ones.
pub fn encode_content(profile: &Profile, content: &str) -> Result<Vec<u8>, CodecError> {
    let content = ProfileContent::new(profile, content);
    let remote = content.remote.as_ref();
    let message = WireProfileContent {
        name: content.name.clone(),
        profile_type: content.profile_type.code(),
        content: content.content.clone(),
        remote_location: content.remote_location.clone(),
        auto_update: remote.map(|r| r.auto_update),
        auto_update_interval: remote.map(|r| r.auto_update_interval),
        last_updated_at: remote.and_then(|r| r.last_updated_at),
    };
    frame_message(MessageType::ProfileContent, &message)
}

pub fn decode_content(body: &[u8]) -> Result<ProfileContent, CodecError> {
    let message = WireProfileContent::decode(payload_of(body, MessageType::ProfileContent)?)?;
    let profile_type = profile_type_of(message.profile_type)?;

    let remote = match (profile_type, message.auto_update, message.auto_update_interval) {
        (ProfileType::Remote, Some(auto_update), Some(auto_update_interval)) => {
            Some(RemoteSettings {
                auto_update,
                auto_update_interval,
                last_updated_at: message.last_updated_at,
            })
        }
        _ => None,
    };

    Ok(ProfileContent {
        name: message.name,
        profile_type,
        content: message.content,
        remote_location: message
            .remote_location
            .filter(|_| profile_type.has_remote_location()),
        remote,
    })
}

pub fn encode_error(message: &str) -> Result<Vec<u8>, CodecError> {
    frame_message(
        MessageType::ErrorMessage,
        &WireError {
            message: message.to_string(),
        },
    )
}

pub fn decode_error(body: &[u8]) -> Result<String, CodecError> {
    Ok(WireError::decode(payload_of(body, MessageType::ErrorMessage)?)?.message)
}

pub fn encode_content_request(profile_id: i64) -> Result<Vec<u8>, CodecError> {
    frame_message(
        MessageType::ProfileContentRequest,
        &WireContentRequest { profile_id },
    )
}

/// Extract the requested profile id.
///
/// # Errors
///
/// Returns [`CodecError::MalformedMessage`] for a body that is not a
/// well-formed content request.
pub fn decode_content_request(body: &[u8]) -> Result<i64, CodecError> {
    Ok(WireContentRequest::decode(payload_of(body, MessageType::ProfileContentRequest)?)?.profile_id)
}

pub fn encode_control_request(request: ControlRequest) -> Result<Vec<u8>, CodecError> {
    frame(request.message_type(), &[])
}

pub fn decode_control_request(body: &[u8]) -> Result<ControlRequest, CodecError> {
    match decode_message_type(body)? {
        MessageType::ControlReload => Ok(ControlRequest::Reload),
        MessageType::ControlStop => Ok(ControlRequest::Stop),
        other => Err(CodecError::MalformedMessage {
            message: format!("Expected control request, got {other:?}"),
            location: ErrorLocation::from(Location::caller()),
        }),
    }
}

pub fn encode_control_result(result: &Result<(), String>) -> Result<Vec<u8>, CodecError> {
    let message = match result {
        Ok(()) => WireControlResult {
            success: true,
            error: None,
        },
        Err(e) => WireControlResult {
            success: false,
            error: Some(e.clone()),
        },
    };
    frame_message(MessageType::ControlResult, &message)
}

pub fn decode_control_result(body: &[u8]) -> Result<Result<(), String>, CodecError> {
    let message = WireControlResult::decode(payload_of(body, MessageType::ControlResult)?)?;
    if message.success {
        Ok(Ok(()))
    } else {
        Ok(Err(message.error.unwrap_or_default()))
    }
}

/// Read one frame body from `reader`.
///
/// Returns `Ok(None)` when the peer closed the stream cleanly between frames.
/// A zero-length body is returned as an empty vector.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, ExchangeError>
where
    R: AsyncRead + Unpin,
{
    let length = match reader.read_u32().await {
        Ok(length) => length as usize,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => {
            return Err(ExchangeError::Read {
                message: format!("Failed to read frame length: {e}"),
                location: ErrorLocation::from(Location::caller()),
            });
        }
    };

    if length > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge {
            length,
            limit: MAX_FRAME_LEN,
            location: ErrorLocation::from(Location::caller()),
        }
        .into());
    }

    let mut body = vec![0u8; length];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| ExchangeError::Read {
            message: format!("Failed to read {length}-byte frame body: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

    Ok(Some(body))
}

/// Write one complete frame (as produced by the `encode_*` functions).
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<(), ExchangeError>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(frame)
        .await
        .map_err(|e| ExchangeError::Send {
            message: format!("Failed to write frame: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

    writer.flush().await.map_err(|e| ExchangeError::Send {
        message: format!("Failed to flush frame: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })
}
