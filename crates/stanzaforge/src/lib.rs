//! # Stanzaforge
//!
//! Client-side core for XML stanza streams (XMPP-style messaging).
//!
//! Stanzaforge decodes a long-lived XML stream into typed stanzas without
//! losing unrecognized content, correlates requests with their responses,
//! and keeps a hub of live sessions keyed by bare identity.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use stanzaforge::prelude::*;
//!
//! struct Log;
//!
//! impl FrameHandler for Log {
//!     async fn on_frame<C>(
//!         &self,
//!         _session: &Arc<Session<C>>,
//!         frame: Frame,
//!     ) -> Result<(), StanzaforgeError>
//!     where
//!         C: Connection<Error = TransportError>,
//!     {
//!         println!("{frame:?}");
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() -> Result<(), StanzaforgeError> {
//! stanzaforge::telemetry::init_tracing();
//! let tcp = tokio::net::TcpStream::connect("127.0.0.1:5222").await
//!     .map_err(TransportError::ReceiveFailed)?;
//! let session = Arc::new(Session::new("user@example.com/laptop", StreamConnection::new(tcp)));
//! let hub = Hub::new();
//! serve(&hub, session, &Log).await
//! # }
//! ```

#![allow(async_fn_in_trait)]

mod error;
mod serve;
pub mod telemetry;

pub use error::StanzaforgeError;
pub use serve::{FrameHandler, serve};

pub use stanzaforge_protocol as protocol;
pub use stanzaforge_session as session;
pub use stanzaforge_transport as transport;

/// Convenience re-exports for embedding applications.
pub mod prelude {
    pub use crate::{FrameHandler, StanzaforgeError, serve};
    pub use stanzaforge_protocol::{
        BareJid, DecoderConfig, Element, Frame, Iq, IqType, Jid, Message,
        MessageType, Presence, PresenceType, ProtocolError, Show, Stanza,
        StreamDecoder, UnknownElementPolicy,
    };
    pub use stanzaforge_session::{
        BroadcastReport, Correlator, Hub, HubSession, Session, SessionError,
    };
    pub use stanzaforge_transport::{
        Connection, ConnectionId, StreamConnection, TransportError,
        WebSocketConnection,
    };
}
