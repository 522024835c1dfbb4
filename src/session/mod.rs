//! Process-wide session state.
//!
//! A single holder for "current user or none" plus a broadcast channel for
//! components that want to react to sign-in and sign-out transitions.
//! Only the auth service and the pipeline's forced-logout path write here;
//! everyone else subscribes or reads.

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::{info, trace};

use crate::models::UserIdentity;

// Enough headroom that a slow subscriber does not lag under normal churn.
const SESSION_CHANNEL_CAPACITY: usize = 16;

/// A session transition as broadcast to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    SignedIn { user: UserIdentity },
    SignedOut,
}

/// Observable holder of the current user identity.
pub struct SessionState {
    current: RwLock<Option<UserIdentity>>,
    sender: broadcast::Sender<SessionEvent>,
}

impl SessionState {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(SESSION_CHANNEL_CAPACITY);
        Self {
            current: RwLock::new(None),
            sender,
        }
    }

    /// The latest published user, or `None` when signed out.
    pub async fn current(&self) -> Option<UserIdentity> {
        self.current.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Subscribe to session transitions. Only transitions published after
    /// this call are delivered; the current value is read separately.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        trace!("New session state subscriber");
        self.sender.subscribe()
    }

    /// Publish a signed-in user. Called on bootstrap and on every auth
    /// endpoint success that represents a session change.
    pub async fn signed_in(&self, user: UserIdentity) {
        info!(user_id = user.id, "Session established");
        *self.current.write().await = Some(user.clone());
        // A send error only means nobody is listening right now.
        let _ = self.sender.send(SessionEvent::SignedIn { user });
    }

    /// Publish a signed-out session. Called on logout and on the
    /// pipeline's forced-logout path.
    pub async fn signed_out(&self) {
        info!("Session cleared");
        *self.current.write().await = None;
        let _ = self.sender.send(SessionEvent::SignedOut);
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> UserIdentity {
        UserIdentity {
            id: 1,
            email: "test@example.com".to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            profile_picture: None,
            roles: None,
        }
    }

    #[tokio::test]
    async fn tracks_current_user() {
        let session = SessionState::new();
        assert!(!session.is_authenticated().await);

        session.signed_in(sample_user()).await;
        assert_eq!(session.current().await.unwrap().id, 1);

        session.signed_out().await;
        assert!(session.current().await.is_none());
    }

    #[tokio::test]
    async fn broadcasts_transitions_in_order() {
        let session = SessionState::new();
        let mut receiver = session.subscribe();

        session.signed_in(sample_user()).await;
        session.signed_out().await;

        match receiver.recv().await.unwrap() {
            SessionEvent::SignedIn { user } => assert_eq!(user.id, 1),
            other => panic!("expected SignedIn, got {:?}", other),
        }
        assert!(matches!(receiver.recv().await.unwrap(), SessionEvent::SignedOut));
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_fine() {
        let session = SessionState::new();
        session.signed_in(sample_user()).await;
        session.signed_out().await;
        assert!(session.current().await.is_none());
    }
}
