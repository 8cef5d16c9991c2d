//! # Vitalstore
//!
//! State-sync and lifecycle engine for a personal health tracker. One JSON
//! snapshot holds a subject's profile, plans, inventory and daily counters;
//! the store keeps it consistent across a local cache, a per-identity remote
//! document and the signed-in session.
//!
//! ## Core Concepts
//!
//! - **Snapshot**: The whole application state, replaced wholesale on save
//! - **Cache**: Local copy loaded before any network activity
//! - **Remote**: One document per identity, pushed to the store on change
//! - **Rollover**: Daily counters reset when the calendar day moves on
//! - **Profiles**: Subjects archived and restored by name
//!
//! ## Example
//!
//! ```ignore
//! use vitalstore::{MemoryAuth, MemoryRemote, Store, StoreConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let store = Store::open(
//!     StoreConfig {
//!         cache_dir: "./vitalstore".into(),
//!         ..Default::default()
//!     },
//!     Arc::new(MemoryAuth::new()),
//!     Arc::new(MemoryRemote::new()),
//! )?;
//! store.wait_until_settled(Duration::from_secs(5));
//!
//! store.modify(|s| s.add_water(250.0))?;
//! ```

pub mod cache;
pub mod error;
pub mod identity;
pub mod profiles;
pub mod remote;
pub mod rollover;
pub mod sanitize;
pub mod store;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use cache::{FileCache, LocalCache, MemoryCache, DEFAULT_CACHE_KEY};
pub use error::{Result, StoreError};
pub use identity::{
    AuthProvider, LifecycleAction, MemoryAuth, SessionCallback, SessionLifecycle, SessionState,
};
pub use profiles::{switch_profile, ExtractedProfile, ProfileExtraction};
pub use remote::{Document, MemoryRemote, RemoteChannel, RemoteEvent, RemoteSubscription};
pub use rollover::{Clock, FixedClock, SystemClock};
pub use sanitize::sanitize;
pub use store::{Store, StoreConfig, StoreParts, StoreView};
pub use subscriptions::{
    ChangeSource, DropReason, StoreEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
    SubscriptionManager,
};
pub use types::*;
