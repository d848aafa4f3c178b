//! Subscription engine.
//!
//! The engine is the sole consumer of the store's change feed.  A single
//! background dispatch task turns every committed append into a whole-log
//! snapshot and fans it out to that thread's subscribers over per-subscriber
//! channels, so a slow observer never holds up the store or other observers.
//!
//! Deliveries are whole snapshots rather than diffs: each update carries the
//! complete ordered thread state, and a per-subscriber high-water mark
//! guarantees every delivered snapshot strictly extends the previous one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use aparte_shared::{CodecError, MessageCodec, ThreadKey};
use aparte_store::{Database, MessageRecord, StoreError, ThreadChange};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncFault};

// ---------------------------------------------------------------------------
// Observer-facing types
// ---------------------------------------------------------------------------

/// A message as observers see it: body decoded by the codec.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ThreadMessage {
    pub id: Uuid,
    pub thread: ThreadKey,
    pub sender_id: String,
    /// Decoded body.  Under the passthrough policy a record that fails to
    /// decrypt renders as its literal stored text.
    pub text: String,
    pub sent_at: DateTime<Utc>,
    pub seq: i64,
}

/// The complete ordered state of one thread at a point in time.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ThreadSnapshot {
    pub thread: ThreadKey,
    pub messages: Vec<ThreadMessage>,
}

/// One delivery to a subscriber.
#[derive(Debug, Clone)]
pub enum ThreadUpdate {
    /// The thread's full ordered log.
    Snapshot(ThreadSnapshot),
    /// The log could not be read or decoded; the subscription stays live.
    Fault(SyncFault),
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Live synchronization engine over one message store.
///
/// Cheap to clone; all clones share the store, the codec, and the subscriber
/// registry.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    db: Mutex<Database>,
    codec: MessageCodec,
    topics: Mutex<HashMap<ThreadKey, Topic>>,
    next_subscriber_id: AtomicU64,
}

#[derive(Default)]
struct Topic {
    subscribers: Vec<Subscriber>,
}

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<ThreadUpdate>,
    /// Record count of the last delivered snapshot; `None` until the initial
    /// snapshot has gone out.
    delivered: Option<usize>,
}

impl SyncEngine {
    /// Build an engine over an open database.
    ///
    /// Spawns the dispatch task, so this must be called from within a Tokio
    /// runtime.
    pub fn new(db: Database, codec: MessageCodec) -> Self {
        let changes = db.changes();
        let inner = Arc::new(EngineInner {
            db: Mutex::new(db),
            codec,
            topics: Mutex::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(0),
        });

        tokio::spawn(dispatch_loop(Arc::downgrade(&inner), changes));

        Self { inner }
    }

    /// Build an engine from configuration: open the store at the configured
    /// location and derive the codec from the configured shared secret.
    pub fn open(config: &SyncConfig) -> Result<Self, SyncError> {
        let secret = config.secret.as_deref().ok_or_else(|| {
            SyncError::Config("shared secret is not set (APARTE_SECRET)".to_string())
        })?;

        let db = match &config.data_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(StoreError::from)?;
                Database::open_at(&dir.join("aparte.db"))?
            }
            None => Database::new()?,
        };

        let codec = MessageCodec::from_secret(secret, config.decrypt_policy);
        Ok(Self::new(db, codec))
    }

    /// Open a live subscription on a thread.
    ///
    /// The current full log (empty included, so hosts can tell "no messages"
    /// from "not yet connected") is delivered immediately, then a fresh
    /// snapshot after every committed append until cancellation.  Subscribers
    /// to the same thread are fully independent.
    pub fn subscribe(&self, thread: &ThreadKey) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut topics) = self.inner.topics.lock() {
            topics.entry(thread.clone()).or_default().subscribers.push(Subscriber {
                id,
                tx,
                delivered: None,
            });
        }
        debug!(thread = %thread, subscriber = id, "subscribed");

        // Initial replay.
        self.inner.publish(thread, None);

        Subscription {
            rx,
            handle: SubscriptionHandle {
                thread: thread.clone(),
                id,
                engine: Arc::downgrade(&self.inner),
            },
        }
    }

    /// Encrypt and append a message.
    ///
    /// Encryption happens before any store mutation, so a codec failure
    /// leaves the log untouched and the caller free to retry.  Fan-out to
    /// subscribers rides on the store's change feed.
    pub fn send_text(
        &self,
        thread: &ThreadKey,
        sender_id: &str,
        text: &str,
    ) -> Result<MessageRecord, SyncError> {
        let ciphertext = self.inner.codec.encrypt(text)?;

        let db = self.inner.db.lock().map_err(|_| SyncError::LockPoisoned)?;
        let record = db.append_message(thread, sender_id, &ciphertext)?;
        Ok(record)
    }

    /// One-shot decoded read of a thread's full ordered log.
    pub fn messages(&self, thread: &ThreadKey) -> Result<Vec<ThreadMessage>, SyncError> {
        let records = {
            let db = self.inner.db.lock().map_err(|_| SyncError::LockPoisoned)?;
            db.thread_messages(thread)?
        };

        records
            .into_iter()
            .map(|record| self.inner.decode(record).map_err(SyncError::from))
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self, thread: &ThreadKey) -> usize {
        self.inner
            .topics
            .lock()
            .map(|topics| topics.get(thread).map_or(0, |t| t.subscribers.len()))
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Consume the store change feed for the lifetime of the engine.
async fn dispatch_loop(
    inner: Weak<EngineInner>,
    mut changes: broadcast::Receiver<ThreadChange>,
) {
    loop {
        match changes.recv().await {
            Ok(change) => {
                let Some(inner) = inner.upgrade() else { break };
                inner.publish(&change.thread, Some(change.seq));
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                // We no longer know which threads the lost announcements were
                // for; refresh every watched thread.  The high-water mark
                // keeps this from regressing any subscriber.
                warn!(skipped, "change feed lagged, refreshing all watched threads");
                let Some(inner) = inner.upgrade() else { break };
                inner.publish_all();
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("dispatch loop stopped");
}

impl EngineInner {
    /// Snapshot a thread and deliver it to its subscribers.
    ///
    /// `up_to` bounds the snapshot at a given arrival seq so that a burst of
    /// appends still produces one snapshot per committed append, in order.
    fn publish(&self, thread: &ThreadKey, up_to: Option<i64>) {
        let watched = self
            .topics
            .lock()
            .map(|topics| topics.contains_key(thread))
            .unwrap_or(false);
        if !watched {
            return;
        }

        match self.load_snapshot(thread, up_to) {
            Ok(snapshot) => self.deliver_snapshot(thread, snapshot),
            Err(fault) => self.deliver_fault(thread, fault),
        }
    }

    fn publish_all(&self) {
        let threads: Vec<ThreadKey> = match self.topics.lock() {
            Ok(topics) => topics.keys().cloned().collect(),
            Err(_) => return,
        };
        for thread in threads {
            match self.load_snapshot(&thread, None) {
                Ok(snapshot) => self.deliver_snapshot(&thread, snapshot),
                Err(fault) => self.deliver_fault(&thread, fault),
            }
        }
    }

    fn load_snapshot(
        &self,
        thread: &ThreadKey,
        up_to: Option<i64>,
    ) -> Result<ThreadSnapshot, SyncFault> {
        let records = {
            let db = self
                .db
                .lock()
                .map_err(|_| SyncFault::Store("store lock poisoned".to_string()))?;
            db.thread_messages(thread)
                .map_err(|e| SyncFault::Store(e.to_string()))?
        };

        let mut messages = Vec::with_capacity(records.len());
        for record in records {
            if let Some(limit) = up_to {
                if record.seq > limit {
                    continue;
                }
            }
            let message = self
                .decode(record)
                .map_err(|e| SyncFault::Decode(e.to_string()))?;
            messages.push(message);
        }

        Ok(ThreadSnapshot {
            thread: thread.clone(),
            messages,
        })
    }

    fn decode(&self, record: MessageRecord) -> Result<ThreadMessage, CodecError> {
        let text = self.codec.decrypt(&record.ciphertext)?;
        Ok(ThreadMessage {
            id: record.id,
            thread: record.thread,
            sender_id: record.sender_id,
            text,
            sent_at: record.server_ts,
            seq: record.seq,
        })
    }

    fn deliver_snapshot(&self, thread: &ThreadKey, snapshot: ThreadSnapshot) {
        let Ok(mut topics) = self.topics.lock() else { return };
        let Some(topic) = topics.get_mut(thread) else { return };

        let len = snapshot.messages.len();
        topic.subscribers.retain_mut(|sub| {
            // Only deliver strict extensions of what this subscriber has.
            let grew = sub.delivered.map_or(true, |count| len > count);
            if !grew {
                return true;
            }
            if sub.tx.send(ThreadUpdate::Snapshot(snapshot.clone())).is_err() {
                debug!(thread = %thread, subscriber = sub.id, "dropping disconnected subscriber");
                return false;
            }
            sub.delivered = Some(len);
            true
        });

        if topic.subscribers.is_empty() {
            topics.remove(thread);
        }
    }

    fn deliver_fault(&self, thread: &ThreadKey, fault: SyncFault) {
        warn!(thread = %thread, error = %fault, "reporting fault to subscribers");
        let Ok(mut topics) = self.topics.lock() else { return };
        let Some(topic) = topics.get_mut(thread) else { return };

        topic
            .subscribers
            .retain(|sub| sub.tx.send(ThreadUpdate::Fault(fault.clone())).is_ok());

        if topic.subscribers.is_empty() {
            topics.remove(thread);
        }
    }

    fn remove_subscriber(&self, thread: &ThreadKey, id: u64) {
        let Ok(mut topics) = self.topics.lock() else { return };
        if let Some(topic) = topics.get_mut(thread) {
            topic.subscribers.retain(|sub| sub.id != id);
            if topic.subscribers.is_empty() {
                topics.remove(thread);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Cancellation handle for one subscriber registration.
///
/// Cancelling is idempotent and never disturbs other subscribers of the same
/// thread.
#[derive(Clone)]
pub struct SubscriptionHandle {
    thread: ThreadKey,
    id: u64,
    engine: Weak<EngineInner>,
}

impl SubscriptionHandle {
    /// Remove the registration.  Calling this twice is a no-op.
    pub fn cancel(&self) {
        if let Some(inner) = self.engine.upgrade() {
            debug!(thread = %self.thread, subscriber = self.id, "cancelled");
            inner.remove_subscriber(&self.thread, self.id);
        }
    }

    pub fn thread(&self) -> &ThreadKey {
        &self.thread
    }
}

/// A live subscription: the receiving end of one thread's update stream.
///
/// Dropping the subscription cancels it.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<ThreadUpdate>,
    handle: SubscriptionHandle,
}

impl Subscription {
    /// Wait for the next update.  Returns `None` once cancelled and drained.
    pub async fn recv(&mut self) -> Option<ThreadUpdate> {
        self.rx.recv().await
    }

    /// Non-blocking poll for a pending update.
    pub fn try_recv(&mut self) -> Result<ThreadUpdate, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }

    /// A detached handle that can cancel this subscription, e.g. from the
    /// session that owns the thread switch.
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle.clone()
    }

    pub fn thread(&self) -> &ThreadKey {
        &self.handle.thread
    }

    /// Cancel and discard anything still queued; subsequent `recv` returns
    /// `None` immediately.  Idempotent.
    pub fn cancel(&mut self) {
        self.handle.cancel();
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}
