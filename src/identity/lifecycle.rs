//! Session state machine.

use crate::types::Identity;

/// What the engine knows about the current session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No session notification has arrived yet.
    #[default]
    Unknown,
    /// The provider reported no signed-in identity.
    Anonymous,
    /// An identity is signed in and bound to the store.
    Authenticated(Identity),
}

/// Side effect the engine must perform for a transition, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleAction {
    /// Close the subscription opened for this identity.
    Close(Identity),
    /// Open a subscription for this identity.
    Open(Identity),
}

/// Tracks the session and decides when remote subscriptions open and close.
///
/// Driven only by session-change notifications. Every `Open` is preceded by
/// a `Close` of the previous identity, so at most one subscription is open.
#[derive(Debug, Default)]
pub struct SessionLifecycle {
    state: SessionState,
}

impl SessionLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The bound identity, if any.
    pub fn identity(&self) -> Option<&Identity> {
        match &self.state {
            SessionState::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    /// Whether the first session check has completed.
    pub fn is_known(&self) -> bool {
        self.state != SessionState::Unknown
    }

    /// Apply a session-change notification.
    pub fn on_session_change(&mut self, session: Option<Identity>) -> Vec<LifecycleAction> {
        let previous = std::mem::take(&mut self.state);

        let (next, actions) = match (previous, session) {
            (SessionState::Authenticated(current), Some(incoming)) if current == incoming => {
                (SessionState::Authenticated(current), Vec::new())
            }
            (SessionState::Authenticated(current), Some(incoming)) => (
                SessionState::Authenticated(incoming.clone()),
                vec![LifecycleAction::Close(current), LifecycleAction::Open(incoming)],
            ),
            (SessionState::Authenticated(current), None) => {
                (SessionState::Anonymous, vec![LifecycleAction::Close(current)])
            }
            (_, Some(incoming)) => (
                SessionState::Authenticated(incoming.clone()),
                vec![LifecycleAction::Open(incoming)],
            ),
            (_, None) => (SessionState::Anonymous, Vec::new()),
        };

        self.state = next;
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ana() -> Identity {
        Identity::new("ana")
    }

    fn bea() -> Identity {
        Identity::new("bea")
    }

    #[test]
    fn test_starts_unknown() {
        let lifecycle = SessionLifecycle::new();
        assert_eq!(lifecycle.state(), &SessionState::Unknown);
        assert!(!lifecycle.is_known());
        assert!(lifecycle.identity().is_none());
    }

    #[test]
    fn test_unknown_to_anonymous() {
        let mut lifecycle = SessionLifecycle::new();
        assert!(lifecycle.on_session_change(None).is_empty());
        assert_eq!(lifecycle.state(), &SessionState::Anonymous);
        assert!(lifecycle.is_known());
    }

    #[test]
    fn test_unknown_to_authenticated_opens() {
        let mut lifecycle = SessionLifecycle::new();
        let actions = lifecycle.on_session_change(Some(ana()));

        assert_eq!(actions, vec![LifecycleAction::Open(ana())]);
        assert_eq!(lifecycle.identity(), Some(&ana()));
    }

    #[test]
    fn test_leaving_authenticated_closes() {
        let mut lifecycle = SessionLifecycle::new();
        lifecycle.on_session_change(Some(ana()));

        let actions = lifecycle.on_session_change(None);
        assert_eq!(actions, vec![LifecycleAction::Close(ana())]);
        assert_eq!(lifecycle.state(), &SessionState::Anonymous);
    }

    #[test]
    fn test_identity_change_closes_before_opening() {
        let mut lifecycle = SessionLifecycle::new();
        lifecycle.on_session_change(Some(ana()));

        let actions = lifecycle.on_session_change(Some(bea()));
        assert_eq!(
            actions,
            vec![LifecycleAction::Close(ana()), LifecycleAction::Open(bea())]
        );
    }

    #[test]
    fn test_duplicate_notification_is_noop() {
        let mut lifecycle = SessionLifecycle::new();
        lifecycle.on_session_change(Some(ana()));

        assert!(lifecycle.on_session_change(Some(ana())).is_empty());
        assert_eq!(lifecycle.identity(), Some(&ana()));
    }

    #[test]
    fn test_reconnect_opens_fresh_subscription() {
        let mut lifecycle = SessionLifecycle::new();
        lifecycle.on_session_change(Some(ana()));
        lifecycle.on_session_change(None);

        let actions = lifecycle.on_session_change(Some(ana()));
        assert_eq!(actions, vec![LifecycleAction::Open(ana())]);
    }

    #[test]
    fn test_at_most_one_open_subscription() {
        let mut lifecycle = SessionLifecycle::new();
        let mut open = 0i32;

        let sessions = [
            Some(ana()),
            Some(ana()),
            Some(bea()),
            None,
            None,
            Some(bea()),
            Some(ana()),
            None,
        ];
        for session in sessions {
            for action in lifecycle.on_session_change(session) {
                match action {
                    LifecycleAction::Open(_) => open += 1,
                    LifecycleAction::Close(_) => open -= 1,
                }
                assert!((0..=1).contains(&open));
            }
        }
        assert_eq!(open, 0);
    }
}
