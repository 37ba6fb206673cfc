//! End-to-end tests: a real relay on a loopback port, real peers talking
//! to it through `RelayClient`.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use turnrelay::prelude::*;

// =========================================================================
// Helpers
// =========================================================================

const STEP: Duration = Duration::from_secs(5);

/// Starts a relay on an OS-assigned port and returns its address.
async fn start_server(builder: RelayServerBuilder) -> SocketAddr {
    let server = builder
        .host("127.0.0.1")
        .port(0)
        .build()
        .await
        .expect("bind");
    let addr = server.local_addr().expect("local addr");
    tokio::spawn(server.run());
    addr
}

async fn connect(addr: SocketAddr) -> RelayClient {
    let mut config = ClientConfig::new(addr.to_string());
    config.interval = Duration::from_millis(50);
    config.timeout = Duration::from_secs(2);
    RelayClient::connect(config).await.expect("connect")
}

/// Connects and pairs two peers. The first one is White.
async fn pair(addr: SocketAddr) -> (RelayClient, RelayClient) {
    let mut white = connect(addr).await;
    let mut black = connect(addr).await;

    // White's handshake only completes once Black arrives, so drive both.
    let handshake_white = white.handshake();
    let black_after_white = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        black.handshake().await
    };
    let (w, b) = tokio::time::timeout(STEP, async {
        tokio::join!(handshake_white, black_after_white)
    })
    .await
    .expect("pairing timed out");

    assert_eq!(w.expect("white ack").1, Color::White);
    assert_eq!(b.expect("black ack").1, Color::Black);
    (white, black)
}

async fn recv(client: &mut RelayClient) -> Vec<u8> {
    tokio::time::timeout(STEP, client.recv())
        .await
        .expect("recv timed out")
        .expect("recv failed")
}

// =========================================================================
// Pairing
// =========================================================================

#[tokio::test]
async fn test_handshake_two_peers_get_white_and_black() {
    let addr = start_server(RelayServer::builder()).await;

    let (white, black) = pair(addr).await;

    assert_eq!(white.id(), Some(ClientId(1)));
    assert_eq!(black.id(), Some(ClientId(2)));
}

#[tokio::test]
async fn test_handshake_split_across_writes_is_reassembled() {
    let addr = start_server(RelayServer::builder()).await;

    let mut raw = TcpStream::connect(addr).await.unwrap();
    raw.write_all(b"BEG").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    raw.write_all(b"IN\r\n").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut black = connect(addr).await;
    let (id, color) = tokio::time::timeout(STEP, black.handshake())
        .await
        .unwrap()
        .unwrap();
    assert_eq!((id, color), (ClientId(2), Color::Black));

    let mut line = String::new();
    let mut reader = BufReader::new(raw);
    tokio::time::timeout(STEP, reader.read_line(&mut line))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(line, "1:WHITE\n");
}

#[tokio::test]
async fn test_handshake_registry_full_gets_no_ack() {
    let addr = start_server(RelayServer::builder().capacity(3)).await;
    let (_white, _black) = pair(addr).await;

    let mut third = connect(addr).await;
    let result = tokio::time::timeout(Duration::from_millis(300), third.handshake()).await;

    assert!(result.is_err(), "a full relay must not acknowledge");
}

// =========================================================================
// Relaying
// =========================================================================

#[tokio::test]
async fn test_moves_are_relayed_both_ways() {
    let addr = start_server(RelayServer::builder()).await;
    let (mut white, mut black) = pair(addr).await;

    white.send_move(b"e2e4").await.unwrap();
    assert_eq!(recv(&mut black).await, b"e2e4");

    black.send_move(b"c7c5:sicilian").await.unwrap();
    assert_eq!(recv(&mut white).await, b"c7c5:sicilian");
}

#[tokio::test]
async fn test_garbage_does_not_close_the_connection() {
    let addr = start_server(RelayServer::builder()).await;
    let (mut white, mut black) = pair(addr).await;

    white.send_raw(b"garbage").await.unwrap();
    white.send_raw(b"abc:e2e4").await.unwrap();
    white.send_raw(b"99:e2e4").await.unwrap();
    white.send_move(b"e2e4").await.unwrap();

    assert_eq!(recv(&mut black).await, b"e2e4");
}

#[tokio::test]
async fn test_move_larger_than_socket_buffers_arrives_intact() {
    let addr = start_server(
        RelayServer::builder()
            .max_record_len(32 * 1024 * 1024)
            .read_chunk(64 * 1024),
    )
    .await;
    let (mut white, mut black) = pair(addr).await;
    let payload: Vec<u8> = (0..24 * 1024 * 1024u32).map(|i| b'a' + (i % 26) as u8).collect();

    // Black is not reading, so the relay's write to it stalls part way
    // and has to resume once Black drains its socket.
    tokio::time::timeout(STEP, white.send_move(&payload))
        .await
        .expect("send timed out")
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let received = recv(&mut black).await;
    assert_eq!(received.len(), payload.len());
    assert!(received == payload, "relayed move was altered");
}

// =========================================================================
// Reconnect
// =========================================================================

#[tokio::test]
async fn test_reconnect_rebinds_to_new_connection() {
    let addr = start_server(RelayServer::builder()).await;
    let (mut white, mut black) = pair(addr).await;

    black.reconnect().await.unwrap();
    // A move from the new connection proves the rebind went through.
    black.send_move(b"ping").await.unwrap();
    assert_eq!(recv(&mut white).await, b"ping");

    white.send_move(b"e2e4").await.unwrap();
    assert_eq!(recv(&mut black).await, b"e2e4");
}

#[tokio::test]
async fn test_move_for_disconnected_peer_is_held_until_reconnect() {
    let addr = start_server(RelayServer::builder()).await;
    let (mut white, black) = pair(addr).await;

    drop(black);
    // Let the relay notice the hang-up before the move arrives.
    tokio::time::sleep(Duration::from_millis(200)).await;
    white.send_move(b"e2e4").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut returning = connect(addr).await;
    returning.send_raw(b"2:RECONNECT").await.unwrap();

    assert_eq!(recv(&mut returning).await, b"e2e4");
}

// =========================================================================
// Terminate
// =========================================================================

#[tokio::test]
async fn test_terminate_closes_sender_connection() {
    let addr = start_server(RelayServer::builder()).await;
    let (mut white, _black) = pair(addr).await;

    white.send_raw(b"1:END").await.unwrap();

    let result = tokio::time::timeout(STEP, white.recv()).await.unwrap();
    assert!(matches!(result, Err(TurnRelayError::ConnectionClosed)));
}

#[tokio::test]
async fn test_terminate_frees_id_for_next_peer() {
    let addr = start_server(RelayServer::builder()).await;
    let (white, _black) = pair(addr).await;
    white.end().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (first, _second) = pair(addr).await;

    assert_eq!(first.id(), Some(ClientId(1)));
}

#[tokio::test]
async fn test_terminate_with_notify_sends_end_to_survivor() {
    let addr = start_server(RelayServer::builder().notify_on_end(true)).await;
    let (white, mut black) = pair(addr).await;

    white.end().await.unwrap();

    assert_eq!(recv(&mut black).await, b"END");
}

#[tokio::test]
async fn test_terminate_without_notify_survivor_hears_nothing() {
    let addr = start_server(RelayServer::builder()).await;
    let (white, mut black) = pair(addr).await;

    white.end().await.unwrap();
    black.send_move(b"e2e4").await.unwrap();

    let result = tokio::time::timeout(Duration::from_millis(300), black.recv()).await;
    assert!(result.is_err(), "survivor should not receive anything");
}

// =========================================================================
// Orphans
// =========================================================================

#[tokio::test]
async fn test_waiting_peer_reconnects_and_still_gets_paired() {
    let addr = start_server(RelayServer::builder()).await;

    // Peer 1 registers and hangs up before anyone else arrives.
    let mut raw = TcpStream::connect(addr).await.unwrap();
    raw.write_all(b"BEGIN\n").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    drop(raw);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // It comes back under its id and waits again.
    let mut returning = connect(addr).await;
    returning.send_raw(b"1:RECONNECT").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut black = connect(addr).await;
    let (id, color) = tokio::time::timeout(STEP, black.handshake())
        .await
        .unwrap()
        .unwrap();
    assert_eq!((id, color), (ClientId(2), Color::Black));
    assert_eq!(recv(&mut returning).await, b"1:WHITE");
}
