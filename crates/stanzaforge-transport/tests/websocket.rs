//! Integration tests for the WebSocket transport.
//!
//! Both ends run over an in-memory `tokio::io::duplex` pipe with
//! `WebSocketStream::from_raw_socket`, skipping the HTTP upgrade. The test
//! drives the server end directly with tungstenite messages.

#[cfg(feature = "websocket")]
mod websocket {
    use futures_util::{SinkExt, StreamExt};
    use stanzaforge_transport::{
        Connection, TransportError, WebSocketConnection,
    };
    use tokio::io::DuplexStream;
    use tokio_tungstenite::WebSocketStream;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::tungstenite::protocol::Role;

    async fn pair() -> (WebSocketConnection<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (local, remote) = tokio::io::duplex(64 * 1024);
        let client = WebSocketStream::from_raw_socket(local, Role::Client, None).await;
        let server = WebSocketStream::from_raw_socket(remote, Role::Server, None).await;
        (WebSocketConnection::new(client), server)
    }

    #[tokio::test]
    async fn test_websocket_send_is_one_text_message() {
        let (conn, mut server) = pair().await;

        conn.send(b"<presence/>").await.expect("send should succeed");

        let msg = server.next().await.unwrap().unwrap();
        assert!(msg.is_text());
        assert_eq!(msg.into_text().unwrap().as_str(), "<presence/>");
    }

    #[tokio::test]
    async fn test_websocket_recv_text_and_binary() {
        let (conn, mut server) = pair().await;

        server.send(Message::text("<message/>")).await.unwrap();
        server
            .send(Message::Binary(b"<iq/>".to_vec().into()))
            .await
            .unwrap();

        assert_eq!(conn.recv().await.unwrap().as_deref(), Some(&b"<message/>"[..]));
        assert_eq!(conn.recv().await.unwrap().as_deref(), Some(&b"<iq/>"[..]));
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_peer_close() {
        let (conn, mut server) = pair().await;

        server.send(Message::Close(None)).await.unwrap();

        let result = conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on peer close");
    }

    #[tokio::test]
    async fn test_websocket_send_after_close_fails() {
        let (conn, _server) = pair().await;

        conn.close().await.expect("close should succeed");
        let result = conn.send(b"<presence/>").await;

        assert!(matches!(result, Err(TransportError::ConnectionClosed(_))));
    }

    #[tokio::test]
    async fn test_websocket_send_rejects_invalid_utf8() {
        let (conn, _server) = pair().await;

        let result = conn.send(&[0xff, 0xfe]).await;

        assert!(matches!(result, Err(TransportError::NotText(_))));
    }
}
