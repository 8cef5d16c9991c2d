//! Identity lifecycle.
//!
//! Wraps an external auth provider's session notifications into a single
//! session state and decides when the engine opens and closes the remote
//! subscription.

mod lifecycle;
mod provider;

pub use lifecycle::{LifecycleAction, SessionLifecycle, SessionState};
pub use provider::{AuthProvider, MemoryAuth, SessionCallback};
