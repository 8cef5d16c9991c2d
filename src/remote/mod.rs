//! Remote document channel.
//!
//! One document per authenticated identity, read and written whole. The
//! engine subscribes to its identity's document and receives the current
//! value immediately, then every later change, until it closes the
//! subscription.

mod memory;
mod writer;

pub use memory::{MemoryRemote, WriteRecord};
pub use writer::RemoteWriter;

use crate::error::Result;
use crate::subscriptions::{DropReason, SubscriptionId};
use crate::types::Identity;
use crossbeam_channel::Receiver;

/// A remote document. Always sanitized before it is written.
pub type Document = serde_json::Value;

/// Events pushed by a remote subscription.
#[derive(Clone, Debug)]
pub enum RemoteEvent {
    /// Current document, or `None` if it does not exist.
    Document(Option<Document>),

    /// The remote side reported a failure.
    Error(String),

    /// The subscription ended on the remote side.
    Dropped { reason: DropReason },
}

impl From<DropReason> for RemoteEvent {
    fn from(reason: DropReason) -> Self {
        RemoteEvent::Dropped { reason }
    }
}

/// Per-identity document accessor.
pub trait RemoteChannel: Send + Sync {
    /// Subscribe to the identity's document.
    ///
    /// The first event must describe the current document (or its absence).
    fn subscribe(&self, identity: &Identity) -> Result<RemoteSubscription>;

    /// Replace the identity's document in one atomic overwrite.
    fn write_whole(&self, identity: &Identity, document: &Document) -> Result<()>;
}

/// An open remote subscription.
///
/// Dropping it (or calling [`close`](Self::close)) unregisters it from the
/// remote side. Events still buffered in the receiver are dropped with it.
pub struct RemoteSubscription {
    pub id: SubscriptionId,
    receiver: Receiver<RemoteEvent>,
    on_close: Option<Box<dyn FnOnce() + Send>>,
}

impl RemoteSubscription {
    pub fn new(
        id: SubscriptionId,
        receiver: Receiver<RemoteEvent>,
        on_close: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            id,
            receiver,
            on_close: Some(Box::new(on_close)),
        }
    }

    /// Channel the remote pushes events into.
    pub fn receiver(&self) -> &Receiver<RemoteEvent> {
        &self.receiver
    }

    /// Unregister from the remote side.
    pub fn close(self) {}
}

impl Drop for RemoteSubscription {
    fn drop(&mut self) {
        if let Some(on_close) = self.on_close.take() {
            on_close();
        }
    }
}

impl std::fmt::Debug for RemoteSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSubscription")
            .field("id", &self.id)
            .finish()
    }
}
