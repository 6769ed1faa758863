use crate::error::codec::CodecError;
use crate::error::exchange::ExchangeError;
use crate::protocol::{
    ControlRequest, MAX_FRAME_LEN, MessageType, decode_content, decode_content_request,
    decode_control_request, decode_control_result, decode_error, decode_message_type,
    decode_preview_list, encode_content, encode_content_request, encode_control_request,
    encode_control_result, encode_error, encode_preview_list, read_frame, unframe,
};

use models::{ProfileBuilder, ProfilePreview, ProfileType, RemoteSettings};

fn body(frame: &[u8]) -> &[u8] {
    unframe(frame).expect("encoder output should carry a valid length prefix")
}

#[test]
fn given_two_previews_when_round_tripped_then_order_and_fields_are_kept() {
    // GIVEN: A local and a remote preview, the second one selected
    let previews = vec![
        ProfilePreview {
            id: 1,
            name: "A".to_string(),
            profile_type: ProfileType::Local,
            is_selected: false,
        },
        ProfilePreview {
            id: 2,
            name: "B".to_string(),
            profile_type: ProfileType::Remote,
            is_selected: true,
        },
    ];

    // WHEN: Encoding then decoding
    let frame = encode_preview_list(&previews).expect("encode");
    let decoded = decode_preview_list(body(&frame)).expect("decode");

    // THEN: Same records in the same order
    assert_eq!(decoded, previews);
}

#[test]
fn given_empty_catalogue_when_round_tripped_then_decodes_to_empty_list() {
    let frame = encode_preview_list(&[]).expect("encode");

    let decoded = decode_preview_list(body(&frame)).expect("decode");

    assert!(decoded.is_empty());
}

/// **VALUE**: Remote profiles must carry location and auto-update settings
/// to the peer.
///
/// **BUG THIS CATCHES**: Would catch optional wire fields being dropped, which
/// would make every remote profile look like it never auto-updates.
#[test]
fn given_remote_profile_when_content_round_tripped_then_remote_fields_survive() {
    // GIVEN: A remote profile with explicit settings
    let profile = ProfileBuilder::default()
        .with_id(2)
        .with_name("B")
        .with_type(ProfileType::Remote)
        .with_remote_location("https://example.com/b.json")
        .with_remote_settings(RemoteSettings {
            auto_update: true,
            auto_update_interval: 30,
            last_updated_at: Some(1_700_000_000),
        })
        .build()
        .expect("profile");

    // WHEN: Encoding its content and decoding it back
    let frame = encode_content(&profile, r#"{"outbounds":[]}"#).expect("encode");
    let decoded = decode_content(body(&frame)).expect("decode");

    // THEN: Everything made it across
    assert_eq!(decoded.name, "B");
    assert_eq!(decoded.profile_type, ProfileType::Remote);
    assert_eq!(decoded.content, r#"{"outbounds":[]}"#);
    assert_eq!(
        decoded.remote_location.as_deref(),
        Some("https://example.com/b.json")
    );
    let remote = decoded.remote.expect("remote settings");
    assert!(remote.auto_update);
    assert_eq!(remote.auto_update_interval, 30);
    assert_eq!(remote.last_updated_at, Some(1_700_000_000));
}

#[test]
fn given_local_profile_when_content_round_tripped_then_no_remote_fields() {
    let profile = ProfileBuilder::default()
        .with_id(1)
        .with_name("A")
        .with_type(ProfileType::Local)
        .build()
        .expect("profile");

    let frame = encode_content(&profile, "{}").expect("encode");
    let decoded = decode_content(body(&frame)).expect("decode");

    assert_eq!(decoded.profile_type, ProfileType::Local);
    assert!(decoded.remote_location.is_none());
    assert!(decoded.remote.is_none());
}

#[test]
fn given_cloud_synced_profile_when_content_round_tripped_then_location_without_auto_update() {
    let profile = ProfileBuilder::default()
        .with_id(3)
        .with_name("C")
        .with_type(ProfileType::CloudSynced)
        .with_remote_location("icloud://profiles/c.json")
        .build()
        .expect("profile");

    let frame = encode_content(&profile, "{}").expect("encode");
    let decoded = decode_content(body(&frame)).expect("decode");

    assert_eq!(decoded.remote_location.as_deref(), Some("icloud://profiles/c.json"));
    assert!(decoded.remote.is_none());
}

#[test]
fn given_error_text_when_round_tripped_then_text_is_unchanged() {
    let frame = encode_error("profile 99 not found").expect("encode");

    assert_eq!(
        decode_error(body(&frame)).expect("decode"),
        "profile 99 not found"
    );
}

#[test]
fn given_content_request_when_round_tripped_then_id_is_unchanged() {
    let frame = encode_content_request(42).expect("encode");

    assert_eq!(decode_content_request(body(&frame)).expect("decode"), 42);
}

#[test]
fn given_control_messages_when_round_tripped_then_request_and_result_survive() {
    // GIVEN: Both control requests and both result shapes
    let reload = encode_control_request(ControlRequest::Reload).expect("encode");
    let stop = encode_control_request(ControlRequest::Stop).expect("encode");
    let ok = encode_control_result(&Ok(())).expect("encode");
    let failed = encode_control_result(&Err("no engine".to_string())).expect("encode");

    // WHEN / THEN: Each decodes to what was encoded
    assert_eq!(
        decode_control_request(body(&reload)).expect("decode"),
        ControlRequest::Reload
    );
    assert_eq!(
        decode_control_request(body(&stop)).expect("decode"),
        ControlRequest::Stop
    );
    assert_eq!(decode_control_result(body(&ok)).expect("decode"), Ok(()));
    assert_eq!(
        decode_control_result(body(&failed)).expect("decode"),
        Err("no engine".to_string())
    );
}

#[test]
fn given_encoded_frame_when_inspecting_header_then_version_and_type_lead_the_body() {
    let frame = encode_content_request(7).expect("encode");

    let body = body(&frame);

    assert_eq!(body[0], 1, "first body byte is the protocol version");
    assert_eq!(body[1], MessageType::ProfileContentRequest.as_byte());
}

#[test]
fn given_empty_body_when_decoding_type_then_returns_empty_message() {
    let result = decode_message_type(&[]);

    assert!(matches!(result, Err(CodecError::EmptyMessage { .. })));
}

#[test]
fn given_version_byte_only_when_decoding_type_then_returns_malformed() {
    let result = decode_message_type(&[1]);

    assert!(matches!(result, Err(CodecError::MalformedMessage { .. })));
}

#[test]
fn given_future_version_when_decoding_type_then_returns_unsupported_version() {
    let result = decode_message_type(&[2, 0x01]);

    assert!(matches!(
        result,
        Err(CodecError::UnsupportedVersion { version: 2, .. })
    ));
}

/// **VALUE**: Unknown type bytes must surface as a typed error so the
/// connection can answer with an error frame before closing.
#[test]
fn given_unknown_type_byte_when_decoding_type_then_returns_unknown_type() {
    let result = decode_message_type(&[1, 0x7f]);

    assert!(matches!(
        result,
        Err(CodecError::UnknownType {
            message_type: 0x7f,
            ..
        })
    ));
}

#[test]
fn given_truncated_payload_when_decoding_request_then_returns_malformed() {
    // GIVEN: A content request whose varint never terminates
    let body = [1, MessageType::ProfileContentRequest.as_byte(), 0x08, 0xff];

    // WHEN: Decoding
    let result = decode_content_request(&body);

    // THEN: Malformed, not a panic or a bogus id
    assert!(matches!(result, Err(CodecError::MalformedMessage { .. })));
}

#[test]
fn given_body_of_other_type_when_decoding_content_then_returns_malformed() {
    let frame = encode_error("nope").expect("encode");

    let result = decode_content(body(&frame));

    assert!(matches!(result, Err(CodecError::MalformedMessage { .. })));
}

#[test]
fn given_frame_with_wrong_length_when_unframing_then_returns_malformed() {
    let mut frame = encode_error("x").expect("encode");
    frame.push(0);

    assert!(matches!(
        unframe(&frame),
        Err(CodecError::MalformedMessage { .. })
    ));
}

#[tokio::test]
async fn given_stream_of_frames_when_reading_then_yields_each_body_then_none() {
    // GIVEN: Two frames back to back, the second with an empty body
    let mut bytes = encode_content_request(5).expect("encode");
    bytes.extend_from_slice(&0u32.to_be_bytes());
    let mut reader = bytes.as_slice();

    // WHEN: Reading until the stream ends
    let first = read_frame(&mut reader).await.expect("first");
    let second = read_frame(&mut reader).await.expect("second");
    let end = read_frame(&mut reader).await.expect("end");

    // THEN: Full body, empty body, clean end
    assert_eq!(
        decode_content_request(&first.expect("frame")).expect("decode"),
        5
    );
    assert_eq!(second, Some(Vec::new()));
    assert_eq!(end, None);
}

#[tokio::test]
async fn given_oversized_length_prefix_when_reading_then_rejects_without_allocating() {
    let bytes = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes();
    let mut reader = bytes.as_slice();

    let result = read_frame(&mut reader).await;

    assert!(matches!(
        result,
        Err(ExchangeError::Codec(CodecError::FrameTooLarge { .. }))
    ));
}

#[tokio::test]
async fn given_truncated_body_when_reading_then_returns_read_error() {
    let mut bytes = 10u32.to_be_bytes().to_vec();
    bytes.extend_from_slice(&[1, 2, 3]);
    let mut reader = bytes.as_slice();

    let result = read_frame(&mut reader).await;

    assert!(matches!(result, Err(ExchangeError::Read { .. })));
}
