//! Subscription types for live store updates.

use crate::types::Identity;
use serde::{Deserialize, Serialize};

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered events before dropping subscriber.
    /// Default: 256
    pub buffer_size: usize,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self { buffer_size: 256 }
    }
}

/// Events emitted to façade subscribers (views).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// The active snapshot was replaced.
    SnapshotChanged { source: ChangeSource },

    /// The bound identity changed (`None` = signed out).
    SessionChanged { user: Option<Identity> },

    /// The store finished its initial load.
    Settled,

    /// A remote failure the user should see.
    Alert { message: String },

    /// Subscription was dropped.
    Dropped { reason: DropReason },
}

impl From<DropReason> for StoreEvent {
    fn from(reason: DropReason) -> Self {
        StoreEvent::Dropped { reason }
    }
}

/// What caused a snapshot replacement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    /// An explicit save through the façade.
    Save,
    /// A push from the remote subscription.
    Remote,
    /// The daily rollover reset the counters.
    Rollover,
    /// The active subject changed or was re-supplied.
    ProfileSwitch,
    /// Signed out; the snapshot was reset.
    Logout,
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// The producing side shut down.
    Closed,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to manage a subscription.
pub struct SubscriptionHandle<E> {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<E>,
}

impl<E> SubscriptionHandle<E> {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<E, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<E, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<E, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}
