//! Integration tests for the byte-stream transport.
//!
//! An in-memory `tokio::io::duplex` pipe stands in for a socket: one end
//! is wrapped in a `StreamConnection`, the test drives the other end.

use stanzaforge_transport::{Connection, StreamConnection, TransportError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[tokio::test]
async fn test_stream_send_and_receive() {
    let (local, mut remote) = tokio::io::duplex(1024);
    let conn = StreamConnection::new(local);

    assert!(conn.id().get() > 0);

    // --- Connection sends, peer receives ---
    conn.send(b"<presence/>").await.expect("send should succeed");
    let mut buf = [0u8; 11];
    remote.read_exact(&mut buf).await.expect("peer should read");
    assert_eq!(&buf, b"<presence/>");

    // --- Peer sends, connection receives ---
    remote
        .write_all(b"<message/>")
        .await
        .expect("peer should write");
    let chunk = conn.recv().await.expect("recv should succeed");
    assert_eq!(chunk.as_deref(), Some(&b"<message/>"[..]));
}

#[tokio::test]
async fn test_stream_recv_after_peer_drop_returns_none() {
    let (local, remote) = tokio::io::duplex(64);
    let conn = StreamConnection::new(local);
    drop(remote);

    let chunk = conn.recv().await.expect("clean close is not an error");
    assert!(chunk.is_none());
}

#[tokio::test]
async fn test_stream_recv_respects_read_chunk() {
    let (local, mut remote) = tokio::io::duplex(64);
    let conn = StreamConnection::new(local).with_read_chunk(4);

    remote.write_all(b"abcdefgh").await.unwrap();
    let first = conn.recv().await.unwrap().unwrap();
    assert!(first.len() <= 4);
}

#[tokio::test]
async fn test_stream_send_after_close_fails() {
    let (local, _remote) = tokio::io::duplex(64);
    let conn = StreamConnection::new(local);

    conn.close().await.expect("close should succeed");
    // Closing twice is harmless.
    conn.close().await.expect("second close should succeed");

    let err = conn.send(b"late").await.unwrap_err();
    assert!(matches!(err, TransportError::ConnectionClosed(_)));
}

#[tokio::test]
async fn test_stream_ids_are_unique() {
    let (a, _a) = tokio::io::duplex(8);
    let (b, _b) = tokio::io::duplex(8);
    let first = StreamConnection::new(a);
    let second = StreamConnection::new(b);
    assert_ne!(first.id(), second.id());
}
