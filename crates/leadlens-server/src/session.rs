//! In-process session store with a sliding expiration window.
//!
//! Sessions are handed to handlers as immutable values; the activity refresh
//! on every authenticated request writes a new value back into the store
//! rather than mutating anything a handler can reach.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use leadlens_airtable::UserRecord;
use tokio::sync::Mutex;
use uuid::Uuid;

/// An authenticated session. `user_id` is the application-level identifier
/// used for license linkage; `record_id` addresses the user's record in the
/// remote store.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub record_id: String,
    pub username: String,
    pub role: String,
    pub login_time: Instant,
    pub last_activity: Instant,
}

/// Shared session map keyed by bearer token.
///
/// State machine per token: absent (anonymous) → present (authenticated) →
/// absent again, either explicitly via [`SessionStore::remove`] (logout) or
/// lazily when [`SessionStore::authenticate`] finds the idle window exceeded.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<String, Session>>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a fresh session for an authenticated user and stores it.
    pub async fn create(&self, user: &UserRecord, role: &str) -> Session {
        let session = Session {
            token: Uuid::new_v4().to_string(),
            user_id: user.user_id.clone(),
            record_id: user.record_id.clone(),
            username: user.username.clone(),
            role: role.to_owned(),
            login_time: Instant::now(),
            last_activity: Instant::now(),
        };
        self.inner
            .lock()
            .await
            .insert(session.token.clone(), session.clone());
        session
    }

    /// Validates a token against the sliding window.
    ///
    /// Returns `None` for unknown tokens and for sessions idle longer than
    /// `timeout` (which are evicted on the spot). Otherwise the stored
    /// session gets a refreshed `last_activity` and the refreshed value is
    /// returned.
    pub async fn authenticate(&self, token: &str, timeout: Duration) -> Option<Session> {
        let mut sessions = self.inner.lock().await;
        let session = sessions.get(token)?;

        if session.last_activity.elapsed() > timeout {
            sessions.remove(token);
            return None;
        }

        let refreshed = Session {
            last_activity: Instant::now(),
            ..session.clone()
        };
        sessions.insert(token.to_owned(), refreshed.clone());
        Some(refreshed)
    }

    /// Drops a session; `true` when one existed.
    pub async fn remove(&self, token: &str) -> bool {
        self.inner.lock().await.remove(token).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> UserRecord {
        UserRecord {
            record_id: "recUSER1".to_string(),
            user_id: "recUSER1".to_string(),
            username: "mario.rossi".to_string(),
            name: Some("Mario Rossi".to_string()),
        }
    }

    #[tokio::test]
    async fn create_then_authenticate_roundtrip() {
        let store = SessionStore::new();
        let session = store.create(&test_user(), "user").await;

        let found = store
            .authenticate(&session.token, Duration::from_secs(3600))
            .await
            .expect("session should be valid");
        assert_eq!(found.username, "mario.rossi");
        assert_eq!(found.role, "user");
    }

    #[tokio::test]
    async fn unknown_token_is_anonymous() {
        let store = SessionStore::new();
        assert!(store
            .authenticate("no-such-token", Duration::from_secs(3600))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn idle_session_expires_and_is_evicted() {
        let store = SessionStore::new();
        let session = store.create(&test_user(), "user").await;

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(store
            .authenticate(&session.token, Duration::ZERO)
            .await
            .is_none());

        // evicted: even a generous timeout cannot resurrect it
        assert!(store
            .authenticate(&session.token, Duration::from_secs(3600))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn authenticate_refreshes_the_activity_window() {
        let store = SessionStore::new();
        let session = store.create(&test_user(), "user").await;

        let first = store
            .authenticate(&session.token, Duration::from_secs(3600))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = store
            .authenticate(&session.token, Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(second.last_activity > first.last_activity);
    }

    #[tokio::test]
    async fn logout_removes_the_session() {
        let store = SessionStore::new();
        let session = store.create(&test_user(), "user").await;

        assert!(store.remove(&session.token).await);
        assert!(!store.remove(&session.token).await);
        assert!(store
            .authenticate(&session.token, Duration::from_secs(3600))
            .await
            .is_none());
    }
}
