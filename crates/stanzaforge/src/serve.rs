//! Driving a session until its stream ends.
//!
//! [`serve`] registers a session in a [`Hub`], reads frames from it, matches
//! responses against pending requests, and hands every frame to a
//! [`FrameHandler`]. When the stream ends the session is unregistered,
//! unless a newer session for the same identity has taken its place.

use std::sync::Arc;

use stanzaforge_protocol::Frame;
use stanzaforge_session::{Hub, Session};
use stanzaforge_transport::{Connection, TransportError};

use crate::StanzaforgeError;

/// Application callback for inbound frames.
pub trait FrameHandler: Send + Sync + 'static {
    /// Called once per decoded frame, in stream order.
    ///
    /// Responses to requests sent with [`Session::send_request`] arrive
    /// here too, after they have been matched. Returning an error stops
    /// [`serve`].
    async fn on_frame<C>(
        &self,
        session: &Arc<Session<C>>,
        frame: Frame,
    ) -> Result<(), StanzaforgeError>
    where
        C: Connection<Error = TransportError>;
}

/// Serves `session` until the peer ends the stream or a fatal error occurs.
///
/// Per-stanza decode failures are logged and skipped. Returns `Ok(())` on
/// a clean end of stream.
pub async fn serve<C, H>(
    hub: &Hub<Session<C>>,
    session: Arc<Session<C>>,
    handler: &H,
) -> Result<(), StanzaforgeError>
where
    C: Connection<Error = TransportError>,
    H: FrameHandler,
{
    hub.register(Arc::clone(&session)).await;

    let result = read_loop(&session, handler).await;

    if let Err(e) = hub.unregister_session(&session).await {
        tracing::warn!(jid = %session.jid(), error = %e, "failed to close session");
    }
    result
}

async fn read_loop<C, H>(
    session: &Arc<Session<C>>,
    handler: &H,
) -> Result<(), StanzaforgeError>
where
    C: Connection<Error = TransportError>,
    H: FrameHandler,
{
    let conn_id = session.id();
    loop {
        let frame = match session.next().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::info!(%conn_id, jid = %session.jid(), "stream ended");
                return Ok(());
            }
            Err(e) if e.is_fatal() => {
                tracing::warn!(%conn_id, error = %e, "stream failed");
                return Err(e.into());
            }
            Err(e) => {
                tracing::warn!(%conn_id, error = %e, "skipping undecodable element");
                continue;
            }
        };

        if let Frame::Stanza(stanza) = &frame {
            if let Some(id) = session.complete(stanza).await {
                tracing::debug!(%conn_id, %id, "response matched pending request");
            }
        }

        handler.on_frame(session, frame).await?;
    }
}
