//! Subscription manager for broadcasting events.

use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{DropReason, SubscriptionConfig, SubscriptionHandle, SubscriptionId};

/// Internal subscription state.
struct Subscription<E> {
    sender: Sender<E>,
}

impl<E> Subscription<E> {
    /// Try to send an event. Returns false if buffer is full (subscriber will be dropped).
    fn try_send(&self, event: E) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(crossbeam_channel::TrySendError::Full(_)) => false,
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Manages subscriptions and broadcasts events.
///
/// Each subscriber gets a bounded buffer. A subscriber that lets its buffer
/// fill up, or drops its receiver, is removed on the next broadcast.
pub struct SubscriptionManager<E> {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription<E>>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl<E: Clone + From<DropReason>> SubscriptionManager<E> {
    /// Create a new subscription manager.
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a new subscription.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle<E> {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1));

        self.subscriptions
            .write()
            .insert(id, Subscription { sender });

        SubscriptionHandle { id, receiver }
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subs = self.subscriptions.write();
        if let Some(sub) = subs.remove(&id) {
            // Send dropped event (best effort)
            let _ = sub.sender.try_send(E::from(DropReason::Unsubscribed));
        }
    }

    /// Drop every subscription, telling each why.
    pub fn close_all(&self, reason: DropReason) {
        let mut subs = self.subscriptions.write();
        for (_, sub) in subs.drain() {
            let _ = sub.sender.try_send(E::from(reason.clone()));
        }
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Whether a subscription is still registered.
    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.subscriptions.read().contains_key(&id)
    }

    /// Broadcast an event to every subscription. Drops subscribers that fail to receive.
    pub fn broadcast(&self, event: E) {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if !sub.try_send(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        // Remove dropped subscriptions
        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            for id in to_remove {
                if let Some(sub) = subs.remove(&id) {
                    // Try to notify about the drop (might fail, that's ok)
                    let _ = sub.sender.try_send(E::from(DropReason::BufferOverflow));
                }
            }
        }
    }

    /// Send an event directly to one subscription.
    /// Returns false if the subscription was dropped.
    pub fn send_to(&self, id: SubscriptionId, event: E) -> bool {
        let delivered = {
            let subs = self.subscriptions.read();
            match subs.get(&id) {
                Some(sub) => sub.try_send(event),
                None => return false,
            }
        };

        if !delivered {
            self.subscriptions.write().remove(&id);
        }
        delivered
    }
}

impl<E: Clone + From<DropReason>> Default for SubscriptionManager<E> {
    fn default() -> Self {
        Self::new()
    }
}
