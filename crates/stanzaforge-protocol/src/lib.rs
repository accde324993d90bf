//! Wire protocol for Stanzaforge.
//!
//! This crate turns the bytes of an XML stream into typed stanzas and back:
//!
//! - **Elements** ([`Element`], [`Namespaces`]): namespace-resolved XML
//!   trees that keep their exact source text.
//! - **Stanzas** ([`Stanza`], [`Message`], [`Presence`], [`Iq`],
//!   [`StreamError`]): the typed model, with unrecognized children kept
//!   verbatim in each stanza's extension list.
//! - **Decoder** ([`StreamDecoder`]): pulls one top-level element at a
//!   time from a [`Connection`](stanzaforge_transport::Connection).
//! - **Errors** ([`ProtocolError`]): fatal versus per-stanza failures.
//!
//! ```text
//! Transport (bytes) → Protocol (Stanza) → Session (identity, requests)
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod decoder;
mod element;
mod error;
mod jid;
pub mod ns;
mod stanza;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use decoder::{
    DecoderConfig, DecoderState, Frame, StreamDecoder, StreamHeader,
    UnknownElementPolicy,
};
pub use element::{Attribute, Element, Namespaces, Node, QualifiedName};
pub use error::ProtocolError;
pub use jid::{BareJid, Jid};
pub use stanza::{
    Iq, IqType, Message, MessageType, Presence, PresenceType, Show, Stanza,
    StanzaHeader, StreamError,
};
