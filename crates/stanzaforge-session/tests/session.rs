//! Integration tests for `Session` over an in-memory duplex pipe.
//!
//! The test plays the server: it reads what the session writes from the
//! remote end of the pipe and writes replies into it.

use std::sync::Arc;

use stanzaforge_protocol::{Element, Iq, IqType, Message, Stanza};
use stanzaforge_session::{Hub, Session, SessionError};
use stanzaforge_transport::{StreamConnection, TransportError};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

type TestSession = Session<StreamConnection<DuplexStream>>;

fn session(jid: &str) -> (TestSession, DuplexStream) {
    let (local, remote) = tokio::io::duplex(64 * 1024);
    (Session::new(jid, StreamConnection::new(local)), remote)
}

async fn read_available(remote: &mut DuplexStream) -> String {
    let mut buf = vec![0u8; 4096];
    let n = remote.read(&mut buf).await.expect("peer should read");
    String::from_utf8(buf[..n].to_vec()).expect("session writes UTF-8")
}

#[tokio::test]
async fn test_send_writes_encoded_stanza() {
    let (session, mut remote) = session("a@x/r");

    session
        .send(&Stanza::Message(Message::chat("b@x", "hello")))
        .await
        .unwrap();

    let written = read_available(&mut remote).await;
    assert!(written.starts_with("<message"));
    assert!(written.contains("to=\"b@x\""));
    assert!(written.contains("<body>hello</body>"));
}

#[tokio::test]
async fn test_next_reads_peer_stanzas_then_end() {
    let (session, mut remote) = session("a@x/r");
    remote
        .write_all(b"<message from='b@x' id='m1'><body>hi</body></message>")
        .await
        .unwrap();
    drop(remote);

    let frame = session.next().await.unwrap().expect("one frame");
    let stanza = frame.into_stanza().expect("a stanza");
    assert_eq!(stanza.id(), Some("m1"));
    assert!(session.next().await.unwrap().is_none());
}

#[tokio::test]
async fn test_send_request_assigns_id_and_response_completes_it() {
    let (session, mut remote) = session("a@x/r");

    let query = Element::parse("<query xmlns='jabber:iq:roster'/>").unwrap();
    let mut request = Stanza::Iq(Iq::new(IqType::Get).with_payload(query));
    let id = session.send_request(&mut request).await.unwrap();

    assert_eq!(id.len(), 32);
    assert_eq!(request.id(), Some(id.as_str()));
    assert!(session.correlator().is_pending(&id).await);

    let written = read_available(&mut remote).await;
    assert!(written.contains(&format!("id=\"{id}\"")));
    assert!(written.contains("<query xmlns='jabber:iq:roster'/>"));

    let reply = format!("<iq type='result' id='{id}'/>");
    remote.write_all(reply.as_bytes()).await.unwrap();

    let response = session.next().await.unwrap().unwrap().into_stanza().unwrap();
    assert_eq!(session.complete(&response).await, Some(id.clone()));
    assert!(!session.correlator().is_pending(&id).await);
}

#[tokio::test]
async fn test_send_request_keeps_caller_id_and_rejects_duplicate() {
    let (session, _remote) = session("a@x/r");

    let mut first = Stanza::Iq(Iq::new(IqType::Get));
    first.header_mut().unwrap().id = Some("fixed".into());
    let id = session.send_request(&mut first).await.unwrap();
    assert_eq!(id, "fixed");

    let mut second = first.clone();
    let err = session.send_request(&mut second).await.unwrap_err();
    assert!(matches!(err, SessionError::DuplicateRequestId(id) if id == "fixed"));
}

#[tokio::test]
async fn test_send_after_close_fails_with_connection_closed() {
    let (session, _remote) = session("a@x/r");

    session.close().await.unwrap();
    let err = session.send_raw("<presence/>").await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::Transport(TransportError::ConnectionClosed(_))
    ));
}

#[tokio::test]
async fn test_failed_request_send_is_not_left_pending() {
    let (session, _remote) = session("a@x/r");
    session.close().await.unwrap();

    let mut request = Stanza::Iq(Iq::new(IqType::Set));
    assert!(session.send_request(&mut request).await.is_err());

    assert_eq!(session.correlator().pending().await, 0);
}

#[tokio::test]
async fn test_hub_broadcast_reaches_registered_sessions() {
    let hub = Hub::new();
    let (alice, mut alice_peer) = session("alice@x/phone");
    let (bob, mut bob_peer) = session("bob@x/laptop");
    hub.register(Arc::new(alice)).await;
    hub.register(Arc::new(bob)).await;

    let report = hub.broadcast("<presence type='unavailable'/>").await;

    assert_eq!(report.delivered, 2);
    assert_eq!(
        read_available(&mut alice_peer).await,
        "<presence type='unavailable'/>"
    );
    assert_eq!(
        read_available(&mut bob_peer).await,
        "<presence type='unavailable'/>"
    );
}

#[tokio::test]
async fn test_hub_unregister_closes_session_transport() {
    let hub = Hub::new();
    let (alice, _peer) = session("alice@x/phone");
    let alice = Arc::new(alice);
    hub.register(Arc::clone(&alice)).await;

    assert!(hub.unregister(&alice.jid().bare()).await.unwrap());

    let err = alice.send_raw("<presence/>").await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Transport(TransportError::ConnectionClosed(_))
    ));
}
