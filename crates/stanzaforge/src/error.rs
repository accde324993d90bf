//! Unified error type for Stanzaforge.

use stanzaforge_protocol::ProtocolError;
use stanzaforge_session::SessionError;
use stanzaforge_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` conversions let `?` lift errors from any layer.
#[derive(Debug, thiserror::Error)]
pub enum StanzaforgeError {
    /// A transport-level error (send, recv, closed connection).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (malformed stream, bad field, unknown element).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (duplicate request id, failed send).
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl StanzaforgeError {
    /// Returns `true` if the stream this error came from is unusable.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Protocol(err) => err.is_fatal(),
            Self::Session(err) => err.is_fatal(),
        }
    }
}
