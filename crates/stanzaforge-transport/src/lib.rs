//! Transport abstraction layer for Stanzaforge.
//!
//! Provides the [`Connection`] trait: an ordered, reliable byte stream that
//! has already been established (TCP, TLS, an in-memory pipe in tests).
//! Socket setup and TLS negotiation happen before a connection reaches this
//! crate.
//!
//! [`StreamConnection`] implements the trait for any tokio
//! `AsyncRead + AsyncWrite` stream. With the `websocket` feature (on by
//! default), [`WebSocketConnection`] implements it over an established
//! WebSocket.

#![allow(async_fn_in_trait)]

mod error;
mod stream;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use stream::{DEFAULT_READ_CHUNK, StreamConnection};
#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnection;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide identifier of one established connection, used to tag
/// log lines. Never zero, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A single connection that can send and receive bytes.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Writes `data` to the remote peer and flushes it.
    ///
    /// One call is one atomic write: concurrent senders never interleave
    /// their bytes.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Receives the next chunk of bytes from the remote peer.
    ///
    /// Chunk boundaries carry no meaning. Returns `Ok(None)` when the peer
    /// cleanly closed its side of the stream.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Closes the connection. Later sends fail.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_next_is_unique_and_increasing() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b > a);
        assert!(a.get() > 0);
    }

    #[test]
    fn test_connection_id_display_tags_log_lines() {
        let id = ConnectionId::next();
        assert_eq!(id.to_string(), format!("conn-{}", id.get()));
    }
}
