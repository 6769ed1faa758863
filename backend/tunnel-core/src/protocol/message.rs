use models::{Profile, ProfileType, RemoteSettings};

/// Version byte written into every frame body.
pub const PROTOCOL_VERSION: u8 = 1;

/// Largest accepted frame body.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Type tag carried in the second byte of every frame body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Server to client, sent once right after the connection settles.
    ProfilePreviewList = 0x01,
    /// Client to server, payload is a profile id.
    ProfileContentRequest = 0x02,
    /// Server to client, answer to a content request.
    ProfileContent = 0x03,
    /// Server to client, may appear at any point.
    ErrorMessage = 0x04,
    ControlReload = 0x10,
    ControlStop = 0x11,
    ControlResult = 0x12,
}

impl MessageType {
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(MessageType::ProfilePreviewList),
            0x02 => Some(MessageType::ProfileContentRequest),
            0x03 => Some(MessageType::ProfileContent),
            0x04 => Some(MessageType::ErrorMessage),
            0x10 => Some(MessageType::ControlReload),
            0x11 => Some(MessageType::ControlStop),
            0x12 => Some(MessageType::ControlResult),
            _ => None,
        }
    }
}

/// Peer request on the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    Reload,
    Stop,
}

impl ControlRequest {
    pub(crate) const fn message_type(self) -> MessageType {
        match self {
            ControlRequest::Reload => MessageType::ControlReload,
            ControlRequest::Stop => MessageType::ControlStop,
        }
    }
}

/// Decoded `ProfileContent` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileContent {
    pub name: String,
    pub profile_type: ProfileType,
    pub content: String,
    pub remote_location: Option<String>,
    pub remote: Option<RemoteSettings>,
}

impl ProfileContent {
    pub fn new(profile: &Profile, content: impl Into<String>) -> Self {
        Self {
            name: profile.name.clone(),
            profile_type: profile.profile_type,
            content: content.into(),
            remote_location: profile
                .remote_location
                .clone()
                .filter(|_| profile.profile_type.has_remote_location()),
            remote: profile
                .remote
                .clone()
                .filter(|_| profile.profile_type == ProfileType::Remote),
        }
    }
}

// Protobuf payloads. Field tags are part of the wire format; never renumber.

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct WireProfilePreview {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(int32, tag = "3")]
    pub profile_type: i32,
    #[prost(bool, tag = "4")]
    pub is_selected: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct WirePreviewList {
    #[prost(message, repeated, tag = "1")]
    pub profiles: Vec<WireProfilePreview>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct WireContentRequest {
    #[prost(int64, tag = "1")]
    pub profile_id: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct WireProfileContent {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(int32, tag = "2")]
    pub profile_type: i32,
    #[prost(string, tag = "3")]
    pub content: String,
    #[prost(string, optional, tag = "4")]
    pub remote_location: Option<String>,
    #[prost(bool, optional, tag = "5")]
    pub auto_update: Option<bool>,
    #[prost(int32, optional, tag = "6")]
    pub auto_update_interval: Option<i32>,
    #[prost(int64, optional, tag = "7")]
    pub last_updated_at: Option<i64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct WireError {
    #[prost(string, tag = "1")]
    pub message: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct WireControlResult {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(string, optional, tag = "2")]
    pub error: Option<String>,
}
