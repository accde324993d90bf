//! Error types for the session layer.

use stanzaforge_protocol::ProtocolError;
use stanzaforge_transport::TransportError;

/// Errors that can occur while driving a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Decoding or encoding failed. See [`ProtocolError::is_fatal`].
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The connection failed or was already closed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A request was sent with an id that is still awaiting its response.
    ///
    /// Ids must be unique among outstanding requests on one session.
    #[error("request id {0:?} is already pending")]
    DuplicateRequestId(String),

    /// The stanza kind carries no id and cannot be sent as a request.
    #[error("<{0}> cannot be sent as a request")]
    NotRequestable(&'static str),
}

impl SessionError {
    /// Returns `true` if the session can no longer be used.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Protocol(err) => err.is_fatal(),
            Self::Transport(_) => true,
            Self::DuplicateRequestId(_) | Self::NotRequestable(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_fatal_follows_protocol_classification() {
        let field = ProtocolError::UnknownElement("x".into());
        assert!(!SessionError::from(field).is_fatal());
        assert!(SessionError::from(ProtocolError::StreamClosed).is_fatal());
        assert!(
            SessionError::from(TransportError::ConnectionClosed("c".into()))
                .is_fatal()
        );
        assert!(!SessionError::DuplicateRequestId("1".into()).is_fatal());
    }

    #[test]
    fn test_duplicate_request_id_display_quotes_id() {
        let err = SessionError::DuplicateRequestId("abc".into());
        assert_eq!(err.to_string(), "request id \"abc\" is already pending");
    }
}
