//! A session served over XML-over-WebSocket framing.
//!
//! The server end speaks raw tungstenite messages over an in-memory pipe:
//! an `<open/>` framing element, one stanza per text message, then
//! `<close/>` and a WebSocket close.

use std::sync::Arc;

use futures_util::SinkExt;
use stanzaforge::prelude::*;
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::Role;

const FRAMING: &str = "urn:ietf:params:xml:ns:xmpp-framing";

#[derive(Default)]
struct Collect {
    frames: Mutex<Vec<Frame>>,
}

impl FrameHandler for Collect {
    async fn on_frame<C>(
        &self,
        _session: &Arc<Session<C>>,
        frame: Frame,
    ) -> Result<(), StanzaforgeError>
    where
        C: Connection<Error = TransportError>,
    {
        self.frames.lock().await.push(frame);
        Ok(())
    }
}

#[tokio::test]
async fn test_serve_over_websocket_framing() {
    let (local, remote) = tokio::io::duplex(64 * 1024);
    let client = WebSocketStream::from_raw_socket(local, Role::Client, None).await;
    let mut server = WebSocketStream::from_raw_socket(remote, Role::Server, None).await;

    let session = Arc::new(Session::new(
        "me@example.com/web",
        WebSocketConnection::new(client),
    ));
    let hub = Hub::new();
    let handler = Collect::default();

    let peer = async {
        for text in [
            "<open xmlns='urn:ietf:params:xml:ns:xmpp-framing' from='example.com' version='1.0'/>",
            "<message xmlns='jabber:client' from='you@example.com/p' id='w1'><body>over ws</body></message>",
            "<close xmlns='urn:ietf:params:xml:ns:xmpp-framing'/>",
        ] {
            server.send(WsMessage::text(text)).await.unwrap();
        }
        server.send(WsMessage::Close(None)).await.unwrap();
    };

    let (result, ()) = tokio::join!(serve(&hub, Arc::clone(&session), &handler), peer);
    result.expect("stream should end cleanly");

    let frames = handler.frames.lock().await;
    assert_eq!(frames.len(), 3);

    let Frame::Raw(open) = &frames[0] else {
        panic!("expected the framing <open/> as a raw element");
    };
    assert!(open.name().is(FRAMING, "open"));
    assert_eq!(open.attr("from"), Some("example.com"));

    let Frame::Stanza(Stanza::Message(message)) = &frames[1] else {
        panic!("expected a message");
    };
    assert_eq!(message.header.id.as_deref(), Some("w1"));
    assert_eq!(message.body.as_deref(), Some("over ws"));

    assert!(matches!(&frames[2], Frame::Raw(close) if close.local_name() == "close"));
    assert!(hub.is_empty().await);
}
