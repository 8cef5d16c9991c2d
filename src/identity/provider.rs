//! Auth provider contract and an in-process implementation.

use crate::error::{Result, StoreError};
use crate::types::{Identity, SignInMethod};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Callback invoked with the new session on every change.
pub type SessionCallback = Box<dyn Fn(Option<Identity>) + Send + Sync>;

/// External authentication provider.
pub trait AuthProvider: Send + Sync {
    /// Start an interactive sign-in.
    fn sign_in(&self, method: SignInMethod) -> Result<Identity>;

    /// End the current session.
    fn sign_out(&self) -> Result<()>;

    /// Register for session changes.
    ///
    /// Implementations call `callback` once with the current session as soon
    /// as it is known, then on every change.
    fn on_session_change(&self, callback: SessionCallback);
}

#[derive(Default)]
struct Inner {
    session: Option<Identity>,
    /// The provider has not yet determined the initial session.
    undetermined: bool,
    accounts: HashMap<SignInMethod, Identity>,
    sign_in_failure: Option<String>,
    sign_out_failure: Option<String>,
    listeners: Vec<Arc<dyn Fn(Option<Identity>) + Send + Sync>>,
}

/// Scriptable provider living in this process.
///
/// Clones share state. Listeners are called synchronously on the thread that
/// changed the session, after the provider's own lock is released.
#[derive(Clone, Default)]
pub struct MemoryAuth {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryAuth {
    /// Provider with no signed-in identity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider whose session is already restored.
    pub fn signed_in(identity: Identity) -> Self {
        let auth = Self::new();
        auth.inner.lock().session = Some(identity);
        auth
    }

    /// Provider that has not finished its initial session check. Listeners
    /// hear nothing until [`set_session`](Self::set_session) is called.
    pub fn undetermined() -> Self {
        let auth = Self::new();
        auth.inner.lock().undetermined = true;
        auth
    }

    /// Account returned when signing in with `method`.
    pub fn register(&self, method: SignInMethod, identity: Identity) {
        self.inner.lock().accounts.insert(method, identity);
    }

    /// Make sign-in fail with `message` (`None` to succeed again).
    pub fn fail_sign_in(&self, message: Option<&str>) {
        self.inner.lock().sign_in_failure = message.map(str::to_string);
    }

    /// Make sign-out fail with `message` (`None` to succeed again).
    pub fn fail_sign_out(&self, message: Option<&str>) {
        self.inner.lock().sign_out_failure = message.map(str::to_string);
    }

    /// Current session as the provider sees it.
    pub fn session(&self) -> Option<Identity> {
        self.inner.lock().session.clone()
    }

    /// Change the session without a sign-in call (restored or expired
    /// sessions) and notify listeners.
    pub fn set_session(&self, session: Option<Identity>) {
        {
            let mut inner = self.inner.lock();
            inner.undetermined = false;
            inner.session = session.clone();
        }
        self.notify(session);
    }

    fn notify(&self, session: Option<Identity>) {
        let listeners = self.inner.lock().listeners.clone();
        for listener in listeners {
            listener(session.clone());
        }
    }
}

impl AuthProvider for MemoryAuth {
    fn sign_in(&self, method: SignInMethod) -> Result<Identity> {
        let identity = {
            let inner = self.inner.lock();
            if let Some(message) = &inner.sign_in_failure {
                return Err(StoreError::Auth(message.clone()));
            }
            inner
                .accounts
                .get(&method)
                .cloned()
                .ok_or_else(|| StoreError::Auth(format!("no {} account available", method)))?
        };

        self.set_session(Some(identity.clone()));
        Ok(identity)
    }

    fn sign_out(&self) -> Result<()> {
        if let Some(message) = &self.inner.lock().sign_out_failure {
            return Err(StoreError::Auth(message.clone()));
        }
        self.set_session(None);
        Ok(())
    }

    fn on_session_change(&self, callback: SessionCallback) {
        let callback: Arc<dyn Fn(Option<Identity>) + Send + Sync> = Arc::from(callback);
        let initial = {
            let mut inner = self.inner.lock();
            inner.listeners.push(Arc::clone(&callback));
            (!inner.undetermined).then(|| inner.session.clone())
        };

        if let Some(session) = initial {
            callback(session);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(auth: &MemoryAuth) -> Arc<Mutex<Vec<Option<Identity>>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        auth.on_session_change(Box::new(move |session| sink.lock().push(session)));
        seen
    }

    #[test]
    fn test_initial_notification() {
        let auth = MemoryAuth::signed_in(Identity::new("u1"));
        let seen = recorder(&auth);
        assert_eq!(*seen.lock(), vec![Some(Identity::new("u1"))]);
    }

    #[test]
    fn test_undetermined_waits() {
        let auth = MemoryAuth::undetermined();
        let seen = recorder(&auth);
        assert!(seen.lock().is_empty());

        auth.set_session(None);
        assert_eq!(*seen.lock(), vec![None]);
    }

    #[test]
    fn test_sign_in_and_out_notify() {
        let auth = MemoryAuth::new();
        auth.register(SignInMethod::Google, Identity::new("g1"));
        let seen = recorder(&auth);

        let identity = auth.sign_in(SignInMethod::Google).unwrap();
        assert_eq!(identity.uid, "g1");
        auth.sign_out().unwrap();

        assert_eq!(
            *seen.lock(),
            vec![None, Some(Identity::new("g1")), None]
        );
    }

    #[test]
    fn test_sign_in_failures() {
        let auth = MemoryAuth::new();
        assert!(matches!(
            auth.sign_in(SignInMethod::Facebook),
            Err(StoreError::Auth(_))
        ));

        auth.register(SignInMethod::Facebook, Identity::new("f1"));
        auth.fail_sign_in(Some("popup closed"));
        let err = auth.sign_in(SignInMethod::Facebook).unwrap_err();
        assert_eq!(err.to_string(), "Authentication error: popup closed");
        assert!(auth.session().is_none());
    }
}
