//! Route guard over the observable session state
//!
//! Decides whether a navigation may render protected content. The guard never
//! rejects while the session is still loading; it waits for the resolved
//! verdict so users are not bounced to login during bootstrap.

use tokio::sync::watch;
use tracing::debug;

use crate::monitor::SessionSnapshot;

/// Paths that must stay reachable while unauthenticated.
const DEFAULT_AUTH_PATHS: &[&str] = &["/login", "/auth/callback"];

/// Verdict for one navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Render the requested content.
    Allow,
    /// Send the user to the login entry point.
    RedirectToLogin,
    /// No verdict yet; keep showing the loading state.
    Wait,
}

/// Route guard bound to one realm's session.
pub struct RouteGuard {
    snapshots: watch::Receiver<SessionSnapshot>,
    /// Realm the guarded content belongs to. A session snapshot from a
    /// different realm never authorizes this guard's content.
    realm: String,
    auth_paths: Vec<String>,
}

impl RouteGuard {
    /// Create a guard for the realm the session is currently scoped to.
    #[must_use]
    pub fn new(snapshots: watch::Receiver<SessionSnapshot>) -> Self {
        let realm = snapshots.borrow().realm.clone();
        Self {
            snapshots,
            realm,
            auth_paths: DEFAULT_AUTH_PATHS.iter().map(|path| (*path).to_string()).collect(),
        }
    }

    /// Replace the set of always-reachable paths.
    #[must_use]
    pub fn with_auth_paths(mut self, paths: Vec<String>) -> Self {
        self.auth_paths = paths;
        self
    }

    /// Rebind the guard to a different realm. Content guarded for the old
    /// realm is no longer authorized by the current session.
    pub fn set_realm(&mut self, realm: impl Into<String>) {
        self.realm = realm.into();
    }

    /// Evaluate a navigation against the latest snapshot.
    #[must_use]
    pub fn evaluate(&self, path: &str) -> GuardDecision {
        if self.is_auth_path(path) {
            return GuardDecision::Allow;
        }

        let snapshot = self.snapshots.borrow();
        if snapshot.is_loading() {
            return GuardDecision::Wait;
        }
        if snapshot.realm != self.realm {
            debug!(expected = %self.realm, actual = %snapshot.realm, "realm changed, denying");
            return GuardDecision::RedirectToLogin;
        }
        if snapshot.is_authenticated() {
            GuardDecision::Allow
        } else {
            GuardDecision::RedirectToLogin
        }
    }

    /// Evaluate a navigation, waiting out the loading phase first.
    ///
    /// Never returns `Wait`: the session resolves exactly once, so this
    /// completes as soon as the bootstrap verdict lands.
    pub async fn decide(&mut self, path: &str) -> GuardDecision {
        loop {
            match self.evaluate(path) {
                GuardDecision::Wait => {
                    if self.snapshots.changed().await.is_err() {
                        // Sender gone while still loading: fail closed.
                        return GuardDecision::RedirectToLogin;
                    }
                }
                decision => return decision,
            }
        }
    }

    fn is_auth_path(&self, path: &str) -> bool {
        self.auth_paths.iter().any(|auth_path| path.starts_with(auth_path.as_str()))
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for guard.
    use super::*;
    use crate::monitor::SessionPhase;

    fn channel(phase: SessionPhase) -> (watch::Sender<SessionSnapshot>, RouteGuard) {
        let (tx, rx) =
            watch::channel(SessionSnapshot { phase, realm: "acme".to_string() });
        (tx, RouteGuard::new(rx))
    }

    #[test]
    fn auth_paths_are_always_allowed() {
        let (_tx, guard) = channel(SessionPhase::Unauthenticated);
        assert_eq!(guard.evaluate("/login"), GuardDecision::Allow);
        assert_eq!(guard.evaluate("/auth/callback?code=x"), GuardDecision::Allow);
    }

    #[test]
    fn loading_session_yields_wait_not_redirect() {
        let (_tx, guard) = channel(SessionPhase::Loading);
        assert_eq!(guard.evaluate("/realms/acme/users"), GuardDecision::Wait);

        let (_tx, guard) = channel(SessionPhase::Uninitialized);
        assert_eq!(guard.evaluate("/realms/acme/users"), GuardDecision::Wait);
    }

    #[test]
    fn authenticated_session_is_allowed_through() {
        let (_tx, guard) = channel(SessionPhase::Authenticated);
        assert_eq!(guard.evaluate("/realms/acme/users"), GuardDecision::Allow);
    }

    #[test]
    fn renewing_session_keeps_content_visible() {
        let (_tx, guard) = channel(SessionPhase::Renewing);
        assert_eq!(guard.evaluate("/realms/acme/users"), GuardDecision::Allow);
    }

    #[test]
    fn unauthenticated_session_is_redirected() {
        let (_tx, guard) = channel(SessionPhase::Unauthenticated);
        assert_eq!(guard.evaluate("/realms/acme/users"), GuardDecision::RedirectToLogin);
    }

    #[test]
    fn realm_switch_invalidates_the_session() {
        let (tx, mut guard) = channel(SessionPhase::Authenticated);
        guard.set_realm("other-tenant");
        assert_eq!(guard.evaluate("/realms/other-tenant/users"), GuardDecision::RedirectToLogin);

        // Once the session catches up to the new realm, access resumes.
        tx.send_modify(|snapshot| snapshot.realm = "other-tenant".to_string());
        assert_eq!(guard.evaluate("/realms/other-tenant/users"), GuardDecision::Allow);
    }

    #[tokio::test]
    async fn decide_waits_for_the_bootstrap_verdict() {
        let (tx, mut guard) = channel(SessionPhase::Loading);

        let resolve = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            tx.send_modify(|snapshot| snapshot.phase = SessionPhase::Authenticated);
            tx
        });

        assert_eq!(guard.decide("/realms/acme/users").await, GuardDecision::Allow);
        drop(resolve.await);
    }

    #[tokio::test]
    async fn decide_fails_closed_when_the_session_disappears() {
        let (tx, mut guard) = channel(SessionPhase::Loading);
        drop(tx);
        assert_eq!(guard.decide("/realms/acme/users").await, GuardDecision::RedirectToLogin);
    }
}
