//! Error types for the protocol layer.
//!
//! The decoder distinguishes four outcomes that callers must treat
//! differently:
//!
//! - end of stream: not an error at all, reported as `Ok(None)`;
//! - [`ProtocolError::Malformed`] / [`ProtocolError::Transport`]: fatal,
//!   the decoder is closed and the session must be torn down;
//! - [`ProtocolError::Field`]: one stanza had an unparsable value, the
//!   stream is still usable;
//! - [`ProtocolError::UnknownElement`]: a top-level element was rejected by
//!   policy, the stream is still usable.

use stanzaforge_transport::TransportError;

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The byte stream violated XML well-formedness: unbalanced tags,
    /// invalid UTF-8, an unbound prefix, or end of input inside an element.
    #[error("malformed stream: {0}")]
    Malformed(String),

    /// A recognized element carried a value that could not be parsed.
    ///
    /// Scoped to the one stanza it came from.
    #[error("invalid `{field}` on <{element}>: {value:?} ({reason})")]
    Field {
        /// Local name of the stanza or sub-element.
        element: String,
        /// Attribute or child that failed to parse.
        field: String,
        /// The offending raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A top-level element is neither a stanza nor stream framing.
    #[error("unrecognized top-level element {0}")]
    UnknownElement(String),

    /// `next()` was called on a decoder that already failed fatally.
    #[error("stream is closed")]
    StreamClosed,

    /// Rendering a stanza to XML failed.
    #[error("encode failed: {0}")]
    Encode(String),

    /// The underlying byte stream failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ProtocolError {
    /// Returns `true` if the stream cannot be read any further.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Malformed(_) | Self::StreamClosed | Self::Transport(_)
        )
    }

    pub(crate) fn field(
        element: &str,
        field: &str,
        value: &str,
        reason: impl Into<String>,
    ) -> Self {
        Self::Field {
            element: element.to_string(),
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
