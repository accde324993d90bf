//! Session layer for Stanzaforge.
//!
//! - **Sessions** ([`Session`]): one connection, its decoder, and its
//!   outstanding requests.
//! - **Correlation** ([`Correlator`]): matches responses to requests by id.
//! - **Hub** ([`Hub`]): the registry of live sessions keyed by bare
//!   identity, with broadcast.
//!
//! ```text
//! Application (above)  ← registers sessions, reads frames, broadcasts
//!     ↕
//! Session Layer (this crate)  ← identity, sends, request tracking
//!     ↕
//! Protocol Layer (below)  ← Stanza, StreamDecoder
//! ```

#![allow(async_fn_in_trait)]

mod correlator;
mod error;
mod hub;
mod session;

pub use correlator::Correlator;
pub use error::SessionError;
pub use hub::{BroadcastReport, Hub, HubSession};
pub use session::Session;
