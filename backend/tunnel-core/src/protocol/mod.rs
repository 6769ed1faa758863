//! Local Profile Exchange wire protocol.
//!
//! Every message travels as one self-delimited frame:
//!
//! ```text
//! [4 bytes: body length (big-endian u32)]
//! [1 byte:  protocol version]
//! [1 byte:  message type]
//! [N bytes: protobuf payload]
//! ```
//!
//! The length prefix covers the version byte, the type byte and the payload,
//! so a reader can always pull exactly one message off the stream no matter
//! how the transport buffers it.

pub mod codec;
pub mod message;

pub use codec::{
    decode_content, decode_content_request, decode_control_request, decode_control_result,
    decode_error, decode_message_type, decode_preview_list, encode_content,
    encode_content_request, encode_control_request, encode_control_result, encode_error,
    encode_preview_list, read_frame, unframe, write_frame,
};
pub use message::{
    ControlRequest, MAX_FRAME_LEN, MessageType, PROTOCOL_VERSION, ProfileContent,
};
