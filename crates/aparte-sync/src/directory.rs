//! Read-only surface consumed from the identity provider and user directory.
//!
//! The core never authenticates users or writes roster entries; it watches
//! what the host's glue publishes.  [`IdentityEvents`] carries the signed-in
//! identity and its changes, [`DirectoryFeed`] the live roster used to pick
//! a peer.

use std::sync::Mutex;

use tokio::sync::{broadcast, watch};

use aparte_shared::Identity;

/// Authentication-state change, as reported by the identity provider.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    SignedIn(Identity),
    SignedOut,
}

/// Buffered auth events before a slow consumer starts lagging.
const AUTH_EVENT_CAPACITY: usize = 16;

/// Bridge between the external identity provider and the core.
///
/// The host's auth glue calls [`signed_in`] / [`signed_out`]; the core and
/// UI contexts read [`current_identity`] and [`watch`] for changes.
///
/// [`signed_in`]: IdentityEvents::signed_in
/// [`signed_out`]: IdentityEvents::signed_out
/// [`current_identity`]: IdentityEvents::current_identity
/// [`watch`]: IdentityEvents::watch
pub struct IdentityEvents {
    current: Mutex<Option<Identity>>,
    events: broadcast::Sender<AuthEvent>,
}

impl IdentityEvents {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            current: Mutex::new(None),
            events,
        }
    }

    /// The identity currently signed in, if any.
    pub fn current_identity(&self) -> Option<Identity> {
        self.current.lock().ok().and_then(|guard| guard.clone())
    }

    /// Subscribe to authentication-state changes.
    pub fn watch(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// Record a sign-in and notify watchers.
    pub fn signed_in(&self, identity: Identity) {
        if let Ok(mut guard) = self.current.lock() {
            *guard = Some(identity.clone());
        }
        let _ = self.events.send(AuthEvent::SignedIn(identity));
    }

    /// Record a sign-out and notify watchers.
    pub fn signed_out(&self) {
        if let Ok(mut guard) = self.current.lock() {
            *guard = None;
        }
        let _ = self.events.send(AuthEvent::SignedOut);
    }
}

impl Default for IdentityEvents {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Directory roster
// ---------------------------------------------------------------------------

/// Producing half of the directory roster, held by the host's glue.
pub struct DirectoryPublisher {
    tx: watch::Sender<Vec<Identity>>,
}

/// Consuming half: a live, insertion-ordered roster snapshot.
///
/// Clone freely; every clone observes the same roster.
#[derive(Clone)]
pub struct DirectoryFeed {
    rx: watch::Receiver<Vec<Identity>>,
}

impl DirectoryPublisher {
    /// Create an empty roster and the feed that watches it.
    pub fn new() -> (Self, DirectoryFeed) {
        let (tx, rx) = watch::channel(Vec::new());
        (Self { tx }, DirectoryFeed { rx })
    }

    /// Insert a new identity, or update it in place if the id is already
    /// listed.  Insertion order is preserved across updates.
    pub fn upsert(&self, identity: Identity) {
        self.tx.send_modify(|roster| {
            match roster.iter().position(|entry| entry.id == identity.id) {
                Some(index) => roster[index] = identity,
                None => roster.push(identity),
            }
        });
    }

    /// Remove an identity from the roster.
    pub fn remove(&self, id: &str) {
        self.tx.send_modify(|roster| roster.retain(|entry| entry.id != id));
    }
}

impl DirectoryFeed {
    /// The full roster in insertion order.
    pub fn snapshot(&self) -> Vec<Identity> {
        self.rx.borrow().clone()
    }

    /// The roster without the given identity, i.e. everyone the current
    /// user could open a thread with.
    pub fn peers(&self, exclude_id: &str) -> Vec<Identity> {
        self.rx
            .borrow()
            .iter()
            .filter(|entry| entry.id != exclude_id)
            .cloned()
            .collect()
    }

    /// Wait for the next roster change.  Returns `false` once the publisher
    /// is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_identity_follows_auth_events() {
        let events = IdentityEvents::new();
        assert!(events.current_identity().is_none());

        events.signed_in(Identity::new("u1", "Uma"));
        assert_eq!(events.current_identity().unwrap().id, "u1");

        events.signed_out();
        assert!(events.current_identity().is_none());
    }

    #[tokio::test]
    async fn test_watchers_receive_auth_events() {
        let events = IdentityEvents::new();
        let mut rx = events.watch();

        events.signed_in(Identity::new("u1", "Uma"));
        events.signed_out();

        assert!(matches!(rx.recv().await.unwrap(), AuthEvent::SignedIn(id) if id.id == "u1"));
        assert!(matches!(rx.recv().await.unwrap(), AuthEvent::SignedOut));
    }

    #[test]
    fn test_roster_keeps_insertion_order_across_updates() {
        let (publisher, feed) = DirectoryPublisher::new();

        publisher.upsert(Identity::new("u1", "Uma"));
        publisher.upsert(Identity::new("u2", "Ben"));
        publisher.upsert(Identity::new("u1", "Uma renamed"));

        let roster = feed.snapshot();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].id, "u1");
        assert_eq!(roster[0].display_name, "Uma renamed");
        assert_eq!(roster[1].id, "u2");
    }

    #[test]
    fn test_peers_excludes_the_current_user() {
        let (publisher, feed) = DirectoryPublisher::new();
        publisher.upsert(Identity::new("u1", "Uma"));
        publisher.upsert(Identity::new("u2", "Ben"));

        let peers = feed.peers("u1");
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].id, "u2");
    }

    #[tokio::test]
    async fn test_feed_observes_live_changes() {
        let (publisher, mut feed) = DirectoryPublisher::new();

        publisher.upsert(Identity::new("u1", "Uma"));
        assert!(feed.changed().await);
        assert_eq!(feed.snapshot().len(), 1);

        publisher.remove("u1");
        assert!(feed.changed().await);
        assert!(feed.snapshot().is_empty());
    }
}
