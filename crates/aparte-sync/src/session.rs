//! One live subscription per UI context.
//!
//! Hosts navigate between peers; every switch must cancel the previous
//! thread's subscription before the next one goes live, or repeated
//! switching leaks registrations in the engine.  [`ThreadSession`] owns that
//! discipline.

use tracing::debug;

use aparte_shared::ThreadKey;

use crate::engine::{Subscription, SubscriptionHandle, SyncEngine};
use crate::error::SyncError;

/// Tracks the single active thread of one UI context.
///
/// The session keeps only the cancellation handle; the caller owns the
/// [`Subscription`] returned by [`ThreadSession::activate`] and reads updates
/// from it.
pub struct ThreadSession {
    engine: SyncEngine,
    active: Option<(ThreadKey, SubscriptionHandle)>,
}

impl ThreadSession {
    pub fn new(engine: SyncEngine) -> Self {
        Self { engine, active: None }
    }

    /// Switch the session to the thread between `local_id` and `peer_id`.
    ///
    /// The previous subscription (if any) is cancelled first, so at most one
    /// registration is live per session at any time.  Re-activating the
    /// current thread also goes through cancel-then-subscribe and therefore
    /// starts a fresh replay.
    pub fn activate(&mut self, local_id: &str, peer_id: &str) -> Result<Subscription, SyncError> {
        let thread = ThreadKey::resolve(local_id, peer_id)?;

        self.deactivate();

        let subscription = self.engine.subscribe(&thread);
        debug!(thread = %thread, "session activated");
        self.active = Some((thread, subscription.handle()));
        Ok(subscription)
    }

    /// Cancel the active subscription, if any.  Idempotent.
    pub fn deactivate(&mut self) {
        if let Some((thread, handle)) = self.active.take() {
            debug!(thread = %thread, "session deactivated");
            handle.cancel();
        }
    }

    /// The currently active thread, if any.
    pub fn active_thread(&self) -> Option<&ThreadKey> {
        self.active.as_ref().map(|(thread, _)| thread)
    }
}

impl Drop for ThreadSession {
    fn drop(&mut self) {
        self.deactivate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aparte_shared::{DecryptPolicy, MessageCodec};
    use aparte_store::Database;

    use crate::engine::ThreadUpdate;

    fn open_engine(dir: &tempfile::TempDir) -> SyncEngine {
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        SyncEngine::new(
            db,
            MessageCodec::from_secret("k", DecryptPolicy::Passthrough),
        )
    }

    #[tokio::test]
    async fn test_switching_peers_cancels_the_previous_subscription() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open_engine(&dir);
        let mut session = ThreadSession::new(engine.clone());

        let sub_alice = session.activate("me", "alice").unwrap();
        let alice_thread = sub_alice.thread().clone();
        assert_eq!(engine.subscriber_count(&alice_thread), 1);

        let sub_bob = session.activate("me", "bob").unwrap();
        assert_eq!(engine.subscriber_count(&alice_thread), 0);
        assert_eq!(engine.subscriber_count(sub_bob.thread()), 1);
        assert_eq!(session.active_thread(), Some(sub_bob.thread()));

        drop(sub_alice);
    }

    #[tokio::test]
    async fn test_rapid_switching_leaves_exactly_one_registration() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open_engine(&dir);
        let mut session = ThreadSession::new(engine.clone());

        let peers = ["alice", "bob", "carol"];
        let mut last = None;
        for round in 0..9 {
            let sub = session.activate("me", peers[round % peers.len()]).unwrap();
            last = Some(sub);
        }

        let last = last.unwrap();
        for peer in peers {
            let thread = ThreadKey::resolve("me", peer).unwrap();
            let expected = usize::from(&thread == last.thread());
            assert_eq!(engine.subscriber_count(&thread), expected);
        }
    }

    #[tokio::test]
    async fn test_active_subscription_receives_updates() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open_engine(&dir);
        let mut session = ThreadSession::new(engine.clone());

        let mut sub = session.activate("me", "alice").unwrap();
        let thread = sub.thread().clone();

        match sub.recv().await.unwrap() {
            ThreadUpdate::Snapshot(snapshot) => assert!(snapshot.messages.is_empty()),
            other => panic!("expected snapshot, got {other:?}"),
        }

        engine.send_text(&thread, "me", "hi alice").unwrap();
        match sub.recv().await.unwrap() {
            ThreadUpdate::Snapshot(snapshot) => {
                assert_eq!(snapshot.messages.len(), 1);
                assert_eq!(snapshot.messages[0].text, "hi alice");
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_deactivate_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open_engine(&dir);
        let mut session = ThreadSession::new(engine.clone());

        let sub = session.activate("me", "alice").unwrap();
        let thread = sub.thread().clone();

        session.deactivate();
        session.deactivate();
        assert_eq!(engine.subscriber_count(&thread), 0);
        assert!(session.active_thread().is_none());
    }
}
