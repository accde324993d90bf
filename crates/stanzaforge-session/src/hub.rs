//! The session hub: a registry of live sessions keyed by bare identity.
//!
//! Each bare identity (`user@domain`) maps to at most one session.
//! Registering `user@domain/phone` after `user@domain/laptop` replaces
//! the laptop session.
//!
//! # Concurrency
//!
//! Every operation takes the same async mutex. [`Hub::range`] and
//! [`Hub::broadcast`] hold it for their whole run, so a visitor that
//! calls back into the hub deadlocks. [`Hub::broadcast_detached`] sends
//! outside the lock instead.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;

use stanzaforge_protocol::{BareJid, Jid};
use tokio::sync::Mutex;

// ---------------------------------------------------------------------------
// HubSession
// ---------------------------------------------------------------------------

/// What the hub needs from a registered session.
pub trait HubSession: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// The session's full address. The hub keys on its bare part.
    fn jid(&self) -> &Jid;

    /// Sends pre-rendered XML.
    async fn send_raw(&self, payload: &str) -> Result<(), Self::Error>;

    /// Closes the underlying transport.
    async fn close(&self) -> Result<(), Self::Error>;
}

// ---------------------------------------------------------------------------
// BroadcastReport
// ---------------------------------------------------------------------------

/// Outcome of a broadcast.
#[derive(Debug)]
pub struct BroadcastReport<E> {
    /// Sessions the payload was written to.
    pub delivered: usize,
    /// Sessions whose send failed, with the error.
    pub failures: Vec<(BareJid, E)>,
}

impl<E> BroadcastReport<E> {
    fn new() -> Self {
        Self {
            delivered: 0,
            failures: Vec::new(),
        }
    }

    /// Returns `true` if every send succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

/// Registry of live sessions.
pub struct Hub<S> {
    sessions: Mutex<HashMap<BareJid, Arc<S>>>,
}

impl<S: HubSession> Default for Hub<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: HubSession> Hub<S> {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `session` under its bare identity.
    ///
    /// Returns the session it replaced, if any. The replaced session is
    /// left open: close it, keep it, or use [`Hub::register_replacing`].
    pub async fn register(&self, session: Arc<S>) -> Option<Arc<S>> {
        let bare = session.jid().bare();
        let jid = session.jid().clone();
        let previous = self.sessions.lock().await.insert(bare, session);
        match &previous {
            Some(old) => tracing::info!(%jid, replaced = %old.jid(), "session re-registered"),
            None => tracing::info!(%jid, "session registered"),
        }
        previous
    }

    /// Registers `session` and closes the session it replaced.
    ///
    /// The close happens after the registry lock is released. Registering
    /// the same session twice does not close it.
    pub async fn register_replacing(&self, session: Arc<S>) -> Result<Option<Arc<S>>, S::Error> {
        let previous = self.register(Arc::clone(&session)).await;
        if let Some(old) = &previous {
            if !Arc::ptr_eq(old, &session) {
                old.close().await?;
            }
        }
        Ok(previous)
    }

    /// Removes the session registered under `bare` and closes it.
    ///
    /// Returns `Ok(false)` if nothing was registered. The entry is removed
    /// even if the close fails.
    pub async fn unregister(&self, bare: &BareJid) -> Result<bool, S::Error> {
        let removed = self.sessions.lock().await.remove(bare);
        let Some(session) = removed else {
            return Ok(false);
        };
        tracing::info!(jid = %session.jid(), "session unregistered");
        session.close().await?;
        Ok(true)
    }

    /// Removes and closes `session`, but only if it is still the one
    /// registered under its bare identity.
    ///
    /// Returns `Ok(false)` if it was never registered or has since been
    /// replaced; a replaced session is not closed here.
    pub async fn unregister_session(&self, session: &Arc<S>) -> Result<bool, S::Error> {
        let bare = session.jid().bare();
        {
            let mut sessions = self.sessions.lock().await;
            match sessions.get(&bare) {
                Some(current) if Arc::ptr_eq(current, session) => {
                    sessions.remove(&bare);
                }
                _ => return Ok(false),
            }
        }
        tracing::info!(jid = %session.jid(), "session unregistered");
        session.close().await?;
        Ok(true)
    }

    /// The session registered for `bare`, if any.
    pub async fn get(&self, bare: &BareJid) -> Option<Arc<S>> {
        self.sessions.lock().await.get(bare).cloned()
    }

    /// Number of registered identities.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Returns `true` if no session is registered.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Visits every entry under the lock until `visit` breaks.
    ///
    /// Order is unspecified. `visit` must not call back into the hub.
    pub async fn range<F>(&self, mut visit: F)
    where
        F: FnMut(&BareJid, &Arc<S>) -> ControlFlow<()>,
    {
        let sessions = self.sessions.lock().await;
        for (bare, session) in sessions.iter() {
            if visit(bare, session).is_break() {
                break;
            }
        }
    }

    /// Sends `payload` to every registered session while holding the lock.
    ///
    /// A failed send is logged and recorded in the report. It does not stop
    /// the broadcast and does not unregister the session.
    pub async fn broadcast(&self, payload: &str) -> BroadcastReport<S::Error> {
        let sessions = self.sessions.lock().await;
        let mut report = BroadcastReport::new();
        for (bare, session) in sessions.iter() {
            deliver::<S>(&mut report, bare, session, payload).await;
        }
        report
    }

    /// Like [`Hub::broadcast`], but sends after releasing the lock.
    ///
    /// Targets are the sessions registered when the call started. A session
    /// unregistered meanwhile may still receive the payload.
    pub async fn broadcast_detached(&self, payload: &str) -> BroadcastReport<S::Error> {
        let targets: Vec<(BareJid, Arc<S>)> = self
            .sessions
            .lock()
            .await
            .iter()
            .map(|(bare, session)| (bare.clone(), Arc::clone(session)))
            .collect();

        let mut report = BroadcastReport::new();
        for (bare, session) in &targets {
            deliver::<S>(&mut report, bare, session, payload).await;
        }
        report
    }
}

async fn deliver<S: HubSession>(
    report: &mut BroadcastReport<S::Error>,
    bare: &BareJid,
    session: &S,
    payload: &str,
) {
    match session.send_raw(payload).await {
        Ok(()) => report.delivered += 1,
        Err(e) => {
            tracing::warn!(jid = %bare, error = %e, "broadcast send failed");
            report.failures.push((bare.clone(), e));
        }
    }
}
