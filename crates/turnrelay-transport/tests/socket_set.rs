//! Integration tests for the socket set.
//!
//! These tests bind a real listener on a random loopback port and drive it
//! with plain tokio client sockets, checking that readiness, non-blocking
//! reads/writes and interest bookkeeping behave as the event loop expects.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use turnrelay_transport::{ConnectionId, Interest, ReadOutcome, SocketSet, Wakeup};

const WAIT: Duration = Duration::from_secs(5);

/// Waits until a wakeup for `conn` matching `pred` shows up.
async fn wait_for(
    set: &mut SocketSet,
    conn: ConnectionId,
    pred: impl Fn(bool, bool) -> bool,
) {
    for _ in 0..50 {
        let wakeups = set.wait(WAIT).await.expect("wait should succeed");
        for wakeup in wakeups {
            if let Wakeup::Ready {
                conn: c,
                readable,
                writable,
            } = wakeup
            {
                if c == conn && pred(readable, writable) {
                    return;
                }
            }
        }
    }
    panic!("no matching wakeup for {conn}");
}

async fn accept_one(set: &mut SocketSet) -> ConnectionId {
    for _ in 0..50 {
        for wakeup in set.wait(WAIT).await.expect("wait should succeed") {
            if let Wakeup::Accepted { conn, .. } = wakeup {
                return conn;
            }
        }
    }
    panic!("listener never accepted");
}

async fn bound_set() -> (SocketSet, String) {
    let set = SocketSet::bind("127.0.0.1:0").await.expect("should bind");
    let addr = set.local_addr().expect("local addr").to_string();
    (set, addr)
}

#[tokio::test]
async fn test_wait_accepts_and_registers_read_interest() {
    let (mut set, addr) = bound_set().await;
    let _client = TcpStream::connect(&addr).await.expect("connect");

    let conn = accept_one(&mut set).await;

    assert!(set.contains(conn));
    assert_eq!(set.len(), 1);
    assert_eq!(set.interest(conn), Some(Interest::READ));
}

#[tokio::test]
async fn test_read_returns_bytes_sent_by_peer() {
    let (mut set, addr) = bound_set().await;
    let mut client = TcpStream::connect(&addr).await.expect("connect");
    let conn = accept_one(&mut set).await;

    client.write_all(b"BEGIN\n").await.expect("client write");
    wait_for(&mut set, conn, |readable, _| readable).await;

    let mut buf = [0u8; 64];
    match set.read(conn, &mut buf) {
        ReadOutcome::Data(n) => assert_eq!(&buf[..n], b"BEGIN\n"),
        other => panic!("expected data, got {other:?}"),
    }
}

#[tokio::test]
async fn test_read_reports_closed_after_peer_shutdown() {
    let (mut set, addr) = bound_set().await;
    let client = TcpStream::connect(&addr).await.expect("connect");
    let conn = accept_one(&mut set).await;

    drop(client);
    wait_for(&mut set, conn, |readable, _| readable).await;

    let mut buf = [0u8; 16];
    assert!(matches!(set.read(conn, &mut buf), ReadOutcome::Closed));
}

#[tokio::test]
async fn test_write_interest_wakes_and_delivers() {
    let (mut set, addr) = bound_set().await;
    let mut client = TcpStream::connect(&addr).await.expect("connect");
    let conn = accept_one(&mut set).await;

    assert!(set.want_write(conn));
    wait_for(&mut set, conn, |_, writable| writable).await;
    let written = set.write(conn, b"1:WHITE\n").expect("write");
    assert_eq!(written, 8);
    set.clear_write(conn);
    assert_eq!(set.interest(conn), Some(Interest::READ));

    let mut buf = [0u8; 8];
    client.read_exact(&mut buf).await.expect("client read");
    assert_eq!(&buf, b"1:WHITE\n");
}

#[tokio::test]
async fn test_wait_times_out_with_no_activity() {
    let (mut set, _addr) = bound_set().await;

    let wakeups = set
        .wait(Duration::from_millis(20))
        .await
        .expect("timeout is not an error");

    assert!(wakeups.is_empty());
}

#[tokio::test]
async fn test_close_removes_connection() {
    let (mut set, addr) = bound_set().await;
    let _client = TcpStream::connect(&addr).await.expect("connect");
    let conn = accept_one(&mut set).await;

    assert!(set.close(conn).is_some());

    assert!(!set.contains(conn));
    assert!(set.is_empty());
    assert!(!set.want_write(conn));
    assert!(set.close(conn).is_none());
    let mut buf = [0u8; 4];
    assert!(matches!(set.read(conn, &mut buf), ReadOutcome::Failed(_)));
}

#[tokio::test]
async fn test_accept_after_close_never_reuses_connection_id() {
    let (mut set, addr) = bound_set().await;
    let _first = TcpStream::connect(&addr).await.expect("connect");
    let first = accept_one(&mut set).await;
    set.close(first);

    let _second = TcpStream::connect(&addr).await.expect("connect");
    let second = accept_one(&mut set).await;

    assert_ne!(first, second);
    assert!(second > first);
}
