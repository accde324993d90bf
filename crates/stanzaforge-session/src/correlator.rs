//! Request/response correlation by stanza id.
//!
//! The correlator only remembers which ids are outstanding. It does not
//! buffer responses or impose timeouts: the caller reads stanzas as usual,
//! hands each one to [`Correlator::complete`], and decides for itself how
//! long to wait (wrap the read in `tokio::time::timeout`, then
//! [`Correlator::cancel`] the id).

use std::collections::HashSet;

use rand::Rng;
use stanzaforge_protocol::Stanza;
use tokio::sync::Mutex;

use crate::SessionError;

/// Tracks request ids that are awaiting a response.
#[derive(Debug, Default)]
pub struct Correlator {
    pending: Mutex<HashSet<String>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates a random 32-character hex id (128 bits).
    pub fn fresh_id() -> String {
        let mut rng = rand::rng();
        let bytes: [u8; 16] = rng.random();
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Records `id` as outstanding.
    ///
    /// # Errors
    /// [`SessionError::DuplicateRequestId`] if `id` is already outstanding.
    pub async fn track(&self, id: impl Into<String>) -> Result<(), SessionError> {
        let id = id.into();
        let mut pending = self.pending.lock().await;
        if pending.contains(&id) {
            return Err(SessionError::DuplicateRequestId(id));
        }
        pending.insert(id);
        Ok(())
    }

    /// Matches an inbound stanza against the outstanding ids.
    ///
    /// Returns the id (and forgets it) if `stanza` answers an outstanding
    /// request. An iq only answers with type `result` or `error`; other
    /// stanza kinds match on id alone.
    pub async fn complete(&self, stanza: &Stanza) -> Option<String> {
        let id = stanza.id()?;
        if let Stanza::Iq(iq) = stanza {
            if !iq.kind.is_response() {
                return None;
            }
        }
        self.pending.lock().await.take(id)
    }

    /// Forgets `id`. Returns `true` if it was outstanding.
    pub async fn cancel(&self, id: &str) -> bool {
        self.pending.lock().await.remove(id)
    }

    pub async fn is_pending(&self, id: &str) -> bool {
        self.pending.lock().await.contains(id)
    }

    /// Number of outstanding requests.
    pub async fn pending(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use stanzaforge_protocol::{Iq, IqType, Message};

    use super::*;

    fn iq(kind: IqType, id: &str) -> Stanza {
        let mut iq = Iq::new(kind);
        iq.header.id = Some(id.to_string());
        Stanza::Iq(iq)
    }

    #[test]
    fn test_fresh_id_is_32_hex_chars_and_unique() {
        let a = Correlator::fresh_id();
        let b = Correlator::fresh_id();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_track_duplicate_id_is_rejected() {
        let correlator = Correlator::new();
        correlator.track("r1").await.unwrap();

        let result = correlator.track("r1").await;

        assert!(matches!(result, Err(SessionError::DuplicateRequestId(id)) if id == "r1"));
        assert_eq!(correlator.pending().await, 1);
    }

    #[tokio::test]
    async fn test_complete_result_iq_clears_pending() {
        let correlator = Correlator::new();
        correlator.track("r1").await.unwrap();

        let matched = correlator.complete(&iq(IqType::Result, "r1")).await;

        assert_eq!(matched.as_deref(), Some("r1"));
        assert!(!correlator.is_pending("r1").await);
        // A second response with the same id matches nothing.
        assert!(correlator.complete(&iq(IqType::Result, "r1")).await.is_none());
    }

    #[tokio::test]
    async fn test_complete_get_iq_with_same_id_does_not_match() {
        let correlator = Correlator::new();
        correlator.track("r1").await.unwrap();

        assert!(correlator.complete(&iq(IqType::Get, "r1")).await.is_none());
        assert!(correlator.is_pending("r1").await);
    }

    #[tokio::test]
    async fn test_complete_message_matches_on_id() {
        let correlator = Correlator::new();
        correlator.track("m1").await.unwrap();

        let mut message = Message::chat("a@x", "hi");
        message.header.id = Some("m1".into());

        assert_eq!(
            correlator.complete(&Stanza::Message(message)).await.as_deref(),
            Some("m1")
        );
    }

    #[tokio::test]
    async fn test_cancel_allows_id_reuse() {
        let correlator = Correlator::new();
        correlator.track("r1").await.unwrap();

        assert!(correlator.cancel("r1").await);
        assert!(!correlator.cancel("r1").await);
        correlator.track("r1").await.expect("id is free again");
    }
}
