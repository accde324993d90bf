//! One authenticated client stream.
//!
//! A [`Session`] ties together the connection, the decoder reading from
//! it, and the correlator for requests sent on it. All methods take
//! `&self`, so a session can sit behind an `Arc` with one task reading
//! and any number of tasks sending.

use std::sync::Arc;

use stanzaforge_protocol::{DecoderConfig, Frame, Jid, Stanza, StreamDecoder};
use stanzaforge_transport::{Connection, ConnectionId, TransportError};
use tokio::sync::Mutex;

use crate::{Correlator, HubSession, SessionError};

/// A client stream bound to an address.
pub struct Session<C> {
    jid: Jid,
    conn: Arc<C>,
    decoder: Mutex<StreamDecoder<C>>,
    correlator: Correlator,
}

impl<C> Session<C>
where
    C: Connection<Error = TransportError>,
{
    /// Wraps an already-negotiated connection.
    pub fn new(jid: impl Into<Jid>, conn: C) -> Self {
        Self::with_config(jid, conn, DecoderConfig::default())
    }

    pub fn with_config(jid: impl Into<Jid>, conn: C, config: DecoderConfig) -> Self {
        let conn = Arc::new(conn);
        let decoder = StreamDecoder::with_config(Arc::clone(&conn), config);
        Self {
            jid: jid.into(),
            conn,
            decoder: Mutex::new(decoder),
            correlator: Correlator::new(),
        }
    }

    /// The full address this session was opened for.
    pub fn jid(&self) -> &Jid {
        &self.jid
    }

    pub fn id(&self) -> ConnectionId {
        self.conn.id()
    }

    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    /// Reads the next frame. `Ok(None)` means the peer ended the stream.
    ///
    /// Concurrent callers are served one at a time.
    pub async fn next(&self) -> Result<Option<Frame>, SessionError> {
        let mut decoder = self.decoder.lock().await;
        Ok(decoder.next().await?)
    }

    /// Encodes and sends one stanza.
    pub async fn send(&self, stanza: &Stanza) -> Result<(), SessionError> {
        let xml = stanza.to_xml()?;
        self.send_raw(&xml).await
    }

    /// Sends pre-rendered XML as a single write.
    ///
    /// The text is not validated. Writes from concurrent callers never
    /// interleave.
    pub async fn send_raw(&self, xml: &str) -> Result<(), SessionError> {
        self.conn.send(xml.as_bytes()).await?;
        tracing::trace!(conn = %self.conn.id(), bytes = xml.len(), "sent");
        Ok(())
    }

    /// Sends `stanza` as a request and starts tracking its id.
    ///
    /// A random id is assigned if the stanza has none. Returns the id to
    /// wait for. If the send fails the id is no longer tracked.
    ///
    /// # Errors
    /// - [`SessionError::DuplicateRequestId`] if the id is already pending.
    /// - [`SessionError::NotRequestable`] for stream errors.
    pub async fn send_request(&self, stanza: &mut Stanza) -> Result<String, SessionError> {
        let name = stanza.name();
        let header = stanza
            .header_mut()
            .ok_or(SessionError::NotRequestable(name))?;
        let id = header.id.get_or_insert_with(Correlator::fresh_id).clone();

        self.correlator.track(id.as_str()).await?;
        if let Err(err) = self.send(stanza).await {
            self.correlator.cancel(&id).await;
            return Err(err);
        }
        Ok(id)
    }

    /// Checks whether `stanza` answers a pending request.
    ///
    /// See [`Correlator::complete`].
    pub async fn complete(&self, stanza: &Stanza) -> Option<String> {
        self.correlator.complete(stanza).await
    }

    /// Closes the connection. Later sends fail with
    /// [`TransportError::ConnectionClosed`].
    pub async fn close(&self) -> Result<(), SessionError> {
        self.conn.close().await?;
        tracing::debug!(conn = %self.conn.id(), jid = %self.jid, "session closed");
        Ok(())
    }
}

impl<C> HubSession for Session<C>
where
    C: Connection<Error = TransportError>,
{
    type Error = SessionError;

    fn jid(&self) -> &Jid {
        &self.jid
    }

    async fn send_raw(&self, payload: &str) -> Result<(), SessionError> {
        Session::send_raw(self, payload).await
    }

    async fn close(&self) -> Result<(), SessionError> {
        Session::close(self).await
    }
}
