//! Session presence as reported by the identity provider.
//!
//! Sign-up and sign-in themselves happen elsewhere; this module only carries
//! the resulting "who is logged in" signal and lets interested parties watch
//! it change.

use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserSession {
    pub user_id: Uuid,
    pub email: Option<String>,
}

/// Cheap, clonable handle to the current session.
#[derive(Clone)]
pub struct AuthSession {
    tx: Arc<watch::Sender<Option<UserSession>>>,
}

impl AuthSession {
    pub fn signed_out() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn signed_in(session: UserSession) -> Self {
        let auth = Self::signed_out();
        auth.sign_in(session);
        auth
    }

    pub fn sign_in(&self, session: UserSession) {
        log::info!("Session started for user {}", session.user_id);
        self.tx.send_replace(Some(session));
    }

    /// Ends the session, e.g. on logout or token expiry.
    pub fn sign_out(&self) {
        if self.tx.send_replace(None).is_some() {
            log::info!("Session ended");
        }
    }

    pub fn session(&self) -> Option<UserSession> {
        self.tx.borrow().clone()
    }

    pub fn current_user(&self) -> Option<Uuid> {
        self.tx.borrow().as_ref().map(|session| session.user_id)
    }

    /// Change notifications. The receiver sees every later sign-in / sign-out.
    pub fn subscribe(&self) -> watch::Receiver<Option<UserSession>> {
        self.tx.subscribe()
    }
}
