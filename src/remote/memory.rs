//! In-process remote document store.

use crate::error::{Result, StoreError};
use crate::remote::{Document, RemoteChannel, RemoteEvent, RemoteSubscription};
use crate::subscriptions::{DropReason, SubscriptionConfig, SubscriptionManager};
use crate::types::Identity;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Record of one accepted write.
#[derive(Clone, Debug, PartialEq)]
pub struct WriteRecord {
    pub uid: String,
    pub document: Document,
}

#[derive(Default)]
struct Inner {
    /// Documents by identity id.
    documents: RwLock<HashMap<String, Document>>,
    /// Subscribers by identity id.
    channels: RwLock<HashMap<String, Arc<SubscriptionManager<RemoteEvent>>>>,
    /// Writes accepted through `write_whole`, oldest first.
    writes: Mutex<Vec<WriteRecord>>,
    fail_writes: AtomicBool,
    fail_subscribe: AtomicBool,
    /// Subscribers get no initial read until something is published.
    defer_first_read: AtomicBool,
    write_delay: Mutex<Option<Duration>>,
}

/// A remote store living in this process.
///
/// Behaves like a hosted document database: subscribers get the current
/// document immediately and a push for every later write, including their
/// own. Clones share state, so tests can play "another device" by writing
/// through a clone.
#[derive(Clone)]
pub struct MemoryRemote {
    inner: Arc<Inner>,
    buffer_size: usize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            inner: Arc::default(),
            buffer_size: SubscriptionConfig::default().buffer_size,
        }
    }

    /// Remote with an existing document for `uid`.
    pub fn with_document(uid: &str, document: Document) -> Self {
        let remote = Self::new();
        remote
            .inner
            .documents
            .write()
            .insert(uid.to_string(), document);
        remote
    }

    /// Current document for `uid`.
    pub fn document(&self, uid: &str) -> Option<Document> {
        self.inner.documents.read().get(uid).cloned()
    }

    /// All writes accepted through [`RemoteChannel::write_whole`].
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.inner.writes.lock().clone()
    }

    /// Number of writes accepted for `uid`.
    pub fn write_count(&self, uid: &str) -> usize {
        self.inner
            .writes
            .lock()
            .iter()
            .filter(|w| w.uid == uid)
            .count()
    }

    /// Open subscriptions for `uid`.
    pub fn subscriber_count(&self, uid: &str) -> usize {
        self.inner
            .channels
            .read()
            .get(uid)
            .map_or(0, |c| c.subscription_count())
    }

    /// Replace a document as if another client wrote it.
    pub fn put_external(&self, uid: &str, document: Document) {
        self.inner
            .documents
            .write()
            .insert(uid.to_string(), document.clone());
        self.publish(uid, RemoteEvent::Document(Some(document)));
    }

    /// Push an error to every subscriber of `uid`.
    pub fn push_error(&self, uid: &str, message: &str) {
        self.publish(uid, RemoteEvent::Error(message.to_string()));
    }

    /// Make `write_whole` fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make `subscribe` fail.
    pub fn set_fail_subscribe(&self, fail: bool) {
        self.inner.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Withhold the initial read from new subscribers. The next published
    /// event (a write, [`put_external`](Self::put_external) or
    /// [`push_error`](Self::push_error)) is the first thing they see.
    pub fn set_defer_first_read(&self, defer: bool) {
        self.inner.defer_first_read.store(defer, Ordering::SeqCst);
    }

    /// End every subscription to `uid` from the remote side.
    pub fn disconnect(&self, uid: &str) {
        let channel = self.inner.channels.read().get(uid).cloned();
        if let Some(channel) = channel {
            channel.close_all(DropReason::Closed);
        }
    }

    /// Delay every write, to widen races in tests.
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *self.inner.write_delay.lock() = delay;
    }

    fn channel(&self, uid: &str) -> Arc<SubscriptionManager<RemoteEvent>> {
        if let Some(channel) = self.inner.channels.read().get(uid) {
            return Arc::clone(channel);
        }
        Arc::clone(
            self.inner
                .channels
                .write()
                .entry(uid.to_string())
                .or_default(),
        )
    }

    fn publish(&self, uid: &str, event: RemoteEvent) {
        let channel = self.inner.channels.read().get(uid).cloned();
        if let Some(channel) = channel {
            channel.broadcast(event);
        }
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteChannel for MemoryRemote {
    fn subscribe(&self, identity: &Identity) -> Result<RemoteSubscription> {
        if self.inner.fail_subscribe.load(Ordering::SeqCst) {
            return Err(StoreError::RemoteSync(format!(
                "subscribe refused for {}",
                identity.uid
            )));
        }

        let channel = self.channel(&identity.uid);
        let handle = channel.subscribe(SubscriptionConfig {
            buffer_size: self.buffer_size,
        });

        // Hold the document lock while delivering the first read so a
        // concurrent write cannot slip in between read and registration.
        if !self.inner.defer_first_read.load(Ordering::SeqCst) {
            let documents = self.inner.documents.read();
            let current = documents.get(&identity.uid).cloned();
            channel.send_to(handle.id, RemoteEvent::Document(current));
        }

        let weak: Weak<SubscriptionManager<RemoteEvent>> = Arc::downgrade(&channel);
        let id = handle.id;
        Ok(RemoteSubscription::new(id, handle.receiver, move || {
            if let Some(channel) = weak.upgrade() {
                channel.unsubscribe(id);
            }
        }))
    }

    fn write_whole(&self, identity: &Identity, document: &Document) -> Result<()> {
        let delay = *self.inner.write_delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::RemoteSync(format!(
                "write refused for {}",
                identity.uid
            )));
        }
        if !document.is_object() {
            return Err(StoreError::RemoteSync("document must be an object".into()));
        }

        let channel = self.channel(&identity.uid);
        {
            let mut documents = self.inner.documents.write();
            documents.insert(identity.uid.clone(), document.clone());
            self.inner.writes.lock().push(WriteRecord {
                uid: identity.uid.clone(),
                document: document.clone(),
            });
            channel.broadcast(RemoteEvent::Document(Some(document.clone())));
        }
        Ok(())
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for channel in self.channels.get_mut().values() {
            channel.close_all(DropReason::Closed);
        }
    }
}
