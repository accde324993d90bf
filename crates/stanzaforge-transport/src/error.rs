use crate::ConnectionId;

/// Failures of the byte stream underneath a session.
///
/// Every variant is fatal to the connection it came from: the stream is
/// ordered and has no resynchronization point, so the session owning the
/// connection must be closed.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed locally and can no longer be written to.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Writing or flushing outbound bytes failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Reading the next inbound chunk failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// A text-framed transport was handed bytes that are not UTF-8.
    #[error("payload is not valid UTF-8: {0}")]
    NotText(#[source] std::string::FromUtf8Error),
}

impl TransportError {
    /// The error returned by a write on a connection that was closed.
    pub(crate) fn closed(id: ConnectionId) -> Self {
        Self::ConnectionClosed(format!("{id} is closed"))
    }
}
