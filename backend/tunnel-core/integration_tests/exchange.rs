use crate::helpers::{BrokenStore, LOCAL_CONTENT, REMOTE_CONTENT, REMOTE_LOCATION, seeded_store, test_config};

use tunnel_core::config::ConfigState;
use tunnel_core::exchange::{
    ProfileConnection, ProfileExchangeClient, ProfileExchangeServer, ServerMessage,
};
use tunnel_core::protocol::{encode_content_request, encode_error, read_frame};
use tunnel_core::store::ProfileStore;

use models::ProfileType;

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::net::UnixStream;

struct Fixture {
    dir: TempDir,
    server: ProfileExchangeServer,
}

impl Fixture {
    fn socket(&self) -> PathBuf {
        self.server.socket_path().to_path_buf()
    }

    async fn connect(&self) -> ProfileExchangeClient {
        ProfileExchangeClient::connect(&self.socket())
            .await
            .expect("Failed to connect to exchange server")
    }
}

async fn running_server(selected: i64) -> Fixture {
    let dir = TempDir::new().expect("tempdir");
    let store: Arc<dyn ProfileStore> = seeded_store(&dir.path().join("profiles"));
    let config = ConfigState::in_memory(test_config(dir.path(), selected));
    let server = ProfileExchangeServer::new(dir.path().join("profile_service.sock"), store, config);
    server.start().await.expect("Failed to start exchange server");
    Fixture { dir, server }
}

/// **VALUE**: A peer learns the whole catalogue the moment it connects.
///
/// **WHY THIS MATTERS**: Companion apps render their profile picker from this
/// first frame; they never ask for it.
///
/// **BUG THIS CATCHES**: Would catch records arriving reordered, missing, or
/// with the selection flag on the wrong profile.
#[tokio::test]
async fn given_two_profiles_when_peer_connects_then_receives_both_previews_in_order() {
    // GIVEN: A server over profiles A (local) and B (remote), B selected
    let fixture = running_server(2).await;

    // WHEN: A peer connects
    let mut client = fixture.connect().await;
    let previews = client
        .read_preview_list()
        .await
        .expect("transport")
        .expect("server error");

    // THEN: Exactly A then B
    assert_eq!(previews.len(), 2);
    assert_eq!((previews[0].id, previews[0].name.as_str()), (1, "A"));
    assert_eq!(previews[0].profile_type, ProfileType::Local);
    assert!(!previews[0].is_selected);
    assert_eq!((previews[1].id, previews[1].name.as_str()), (2, "B"));
    assert_eq!(previews[1].profile_type, ProfileType::Remote);
    assert!(previews[1].is_selected);
}

#[tokio::test]
async fn given_empty_store_when_peer_connects_then_receives_empty_list() {
    let dir = TempDir::new().expect("tempdir");
    let store: Arc<dyn ProfileStore> = Arc::new(
        tunnel_core::store::JsonProfileStore::open(dir.path().join("profiles")).expect("open"),
    );
    let config = ConfigState::in_memory(test_config(dir.path(), -1));
    let server = ProfileExchangeServer::new(dir.path().join("p.sock"), store, config);
    server.start().await.expect("start");

    let mut client = ProfileExchangeClient::connect(server.socket_path())
        .await
        .expect("connect");
    let previews = client.read_preview_list().await.expect("transport");

    assert_eq!(previews, Ok(Vec::new()));
}

/// **VALUE**: A store failure is distinguishable from an empty catalogue.
#[tokio::test]
async fn given_failing_store_when_peer_connects_then_error_then_close() {
    // GIVEN: A server whose store cannot list
    let dir = TempDir::new().expect("tempdir");
    let config = ConfigState::in_memory(test_config(dir.path(), -1));
    let server = ProfileExchangeServer::new(dir.path().join("p.sock"), Arc::new(BrokenStore), config);
    server.start().await.expect("start");

    // WHEN: A peer connects
    let mut client = ProfileExchangeClient::connect(server.socket_path())
        .await
        .expect("connect");
    let first = client.next_message().await.expect("transport");
    let second = client.next_message().await.expect("transport");

    // THEN: One error frame, then end of stream
    assert!(matches!(first, Some(ServerMessage::Error(_))));
    assert_eq!(second, None);
}

/// **VALUE**: A handler whose greeting fails still drains its writer and
/// returns, instead of leaking a task per failed peer.
///
/// **BUG THIS CATCHES**: Would catch the greeting error path returning before
/// the close tail, leaving the writer task detached.
#[tokio::test]
async fn given_failing_store_when_connection_handler_runs_then_it_finishes_after_the_error() {
    // GIVEN: A connection handler over one end of a socket pair
    let dir = TempDir::new().expect("tempdir");
    let config = ConfigState::in_memory(test_config(dir.path(), -1));
    let (server_end, mut peer_end) = UnixStream::pair().expect("socket pair");
    let connection = ProfileConnection::new(server_end, Arc::new(BrokenStore), config);

    // WHEN: The handler runs
    let handler = tokio::spawn(connection.run());

    // THEN: One error frame, end of stream, and the handler has returned
    let first = read_frame(&mut peer_end).await.expect("transport");
    assert!(first.is_some_and(|body| !body.is_empty()));
    let second = read_frame(&mut peer_end).await.expect("transport");
    assert_eq!(second, None);
    let outcome = tokio::time::timeout(Duration::from_secs(5), handler)
        .await
        .expect("handler finished")
        .expect("handler task");
    assert!(outcome.is_ok());
}

/// **VALUE**: Remote profiles arrive with their location and auto-update
/// settings, and a miss does not cost the peer its connection.
///
/// **BUG THIS CATCHES**: Would catch "not found" being treated as a protocol
/// error that closes the connection.
#[tokio::test]
async fn given_connected_peer_when_requesting_existing_then_missing_then_existing_then_all_answered() {
    // GIVEN: A connected peer past the greeting
    let fixture = running_server(1).await;
    let mut client = fixture.connect().await;
    client.read_preview_list().await.expect("greeting").expect("list");

    // WHEN: Asking for 2, then 99, then 1
    let remote = client.request_content(2).await.expect("transport");
    let missing = client.request_content(99).await.expect("transport");
    let local = client.request_content(1).await.expect("transport");

    // THEN: Content, error, content
    let remote = remote.expect("profile 2");
    assert_eq!(remote.name, "B");
    assert_eq!(remote.content, REMOTE_CONTENT);
    assert_eq!(remote.remote_location.as_deref(), Some(REMOTE_LOCATION));
    let settings = remote.remote.expect("auto-update settings");
    assert!(settings.auto_update);
    assert_eq!(settings.auto_update_interval, 30);
    assert_eq!(settings.last_updated_at, Some(1_700_000_000));

    let message = missing.expect_err("profile 99 must be missing");
    assert!(message.contains("not found"), "unexpected error: {message}");

    let local = local.expect("profile 1");
    assert_eq!(local.content, LOCAL_CONTENT);
    assert!(local.remote_location.is_none());
}

#[tokio::test]
async fn given_zero_length_frame_when_sent_then_ignored_and_connection_stays_open() {
    // GIVEN: A connected peer past the greeting
    let fixture = running_server(1).await;
    let mut client = fixture.connect().await;
    client.read_preview_list().await.expect("greeting").expect("list");

    // WHEN: Sending an empty frame followed by a real request
    client.send_frame(&0u32.to_be_bytes()).await.expect("send");
    let answer = client.request_content(1).await.expect("transport");

    // THEN: The request is answered normally, no error came first
    assert_eq!(answer.expect("profile 1").name, "A");
}

#[tokio::test]
async fn given_unknown_type_byte_when_sent_then_error_then_close() {
    let fixture = running_server(1).await;
    let mut client = fixture.connect().await;
    client.read_preview_list().await.expect("greeting").expect("list");

    // Version 1, type 0x7f
    let mut frame = 2u32.to_be_bytes().to_vec();
    frame.extend_from_slice(&[1, 0x7f]);
    client.send_frame(&frame).await.expect("send");

    let reply = client.next_message().await.expect("transport");
    assert!(matches!(reply, Some(ServerMessage::Error(_))));
    assert_eq!(client.next_message().await.expect("transport"), None);
}

#[tokio::test]
async fn given_server_only_message_when_sent_by_peer_then_error_then_close() {
    let fixture = running_server(1).await;
    let mut client = fixture.connect().await;
    client.read_preview_list().await.expect("greeting").expect("list");

    client
        .send_frame(&encode_error("peers do not send errors").expect("encode"))
        .await
        .expect("send");

    let reply = client.next_message().await.expect("transport");
    assert!(matches!(reply, Some(ServerMessage::Error(_))));
    assert_eq!(client.next_message().await.expect("transport"), None);
}

/// **VALUE**: Pipelined requests each get exactly one well-formed answer.
///
/// **BUG THIS CATCHES**: Would catch concurrent responders writing to the
/// socket directly and interleaving bytes.
#[tokio::test]
async fn given_two_peers_pipelining_requests_when_served_then_every_frame_is_well_formed() {
    // GIVEN: Two peers past the greeting
    let fixture = running_server(1).await;
    let mut peers = vec![fixture.connect().await, fixture.connect().await];
    for peer in &mut peers {
        peer.read_preview_list().await.expect("greeting").expect("list");
    }

    // WHEN: Each pipelines many requests without waiting
    const REQUESTS: usize = 25;
    for peer in &mut peers {
        for i in 0..REQUESTS {
            let id = if i % 2 == 0 { 1 } else { 2 };
            peer.send_frame(&encode_content_request(id).expect("encode"))
                .await
                .expect("send");
        }
    }

    // THEN: Each receives exactly that many decodable content frames
    for peer in &mut peers {
        let mut local = 0;
        let mut remote = 0;
        for _ in 0..REQUESTS {
            match peer.next_message().await.expect("well-formed frame") {
                Some(ServerMessage::Content(content)) if content.name == "A" => local += 1,
                Some(ServerMessage::Content(content)) if content.name == "B" => remote += 1,
                other => panic!("unexpected frame: {other:?}"),
            }
        }
        assert_eq!((local, remote), (13, 12));
    }
}

/// **VALUE**: Cancelling the server stops new peers without cutting off the
/// ones already being served.
#[tokio::test]
async fn given_connected_peer_when_server_cancelled_then_peer_still_served_and_new_peers_refused() {
    // GIVEN: A peer mid-session
    let fixture = running_server(1).await;
    let mut client = fixture.connect().await;
    client.read_preview_list().await.expect("greeting").expect("list");

    // WHEN: Cancelling the server
    fixture.server.cancel().await;

    // THEN: The existing peer completes a request, new peers cannot connect
    let answer = client.request_content(2).await.expect("transport");
    assert_eq!(answer.expect("profile 2").name, "B");
    assert!(!fixture.server.is_running().await);
    assert!(!fixture.socket().exists(), "socket file should be removed");
    assert!(ProfileExchangeClient::connect(&fixture.socket()).await.is_err());
}

#[tokio::test]
async fn given_server_when_started_and_cancelled_twice_then_both_are_no_ops() {
    let fixture = running_server(1).await;

    fixture.server.start().await.expect("second start");
    assert!(fixture.server.is_running().await);
    let mut client = fixture.connect().await;
    client.read_preview_list().await.expect("greeting").expect("list");

    fixture.server.cancel().await;
    fixture.server.cancel().await;
    assert!(!fixture.server.is_running().await);
}

#[tokio::test]
async fn given_unstarted_server_when_cancelled_then_no_op() {
    let dir = TempDir::new().expect("tempdir");
    let store: Arc<dyn ProfileStore> = seeded_store(&dir.path().join("profiles"));
    let config = ConfigState::in_memory(test_config(dir.path(), 1));
    let server = ProfileExchangeServer::new(dir.path().join("p.sock"), store, config);

    server.cancel().await;

    assert!(!server.is_running().await);
}

#[tokio::test]
async fn given_running_server_then_socket_is_owner_only() {
    let fixture = running_server(1).await;

    let mode = std::fs::metadata(fixture.socket())
        .expect("socket metadata")
        .permissions()
        .mode();

    assert_eq!(mode & 0o777, 0o600);
    drop(fixture.dir);
}

#[tokio::test]
async fn given_settle_delay_when_peer_connects_then_catalogue_arrives_after_it() {
    // GIVEN: A server with a 200ms settle delay
    let dir = TempDir::new().expect("tempdir");
    let store: Arc<dyn ProfileStore> = seeded_store(&dir.path().join("profiles"));
    let mut config = test_config(dir.path(), 1);
    config.settle_delay_ms = 200;
    let server = ProfileExchangeServer::new(
        dir.path().join("p.sock"),
        store,
        ConfigState::in_memory(config),
    );
    server.start().await.expect("start");

    // WHEN: Connecting and timing the greeting
    let started = tokio::time::Instant::now();
    let mut client = ProfileExchangeClient::connect(server.socket_path())
        .await
        .expect("connect");
    client.read_preview_list().await.expect("greeting").expect("list");

    // THEN: It did not come before the delay
    assert!(started.elapsed() >= Duration::from_millis(200));
}
