//! Subscription system for live updates.
//!
//! [`SubscriptionManager`] fans events out to any number of in-process
//! subscribers over bounded channels, dropping subscribers that fall behind.
//! The façade uses it to notify views of [`StoreEvent`]s, and the in-memory
//! remote uses it to push document changes.
//!
//! # Example
//!
//! ```ignore
//! let handle = store.subscribe(SubscriptionConfig::default());
//!
//! loop {
//!     match handle.recv() {
//!         Ok(StoreEvent::SnapshotChanged { .. }) => render(&store.snapshot()),
//!         Ok(StoreEvent::Settled) => hide_spinner(),
//!         Ok(StoreEvent::Dropped { .. }) | Err(_) => break,
//!         Ok(_) => {}
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{
    ChangeSource, DropReason, StoreEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
};
