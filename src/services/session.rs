use crate::entities::User;
use crate::services::credential_store::{AuthError, CredentialStore};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use rand::{RngCore, rngs::OsRng};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

/// Random bytes per token (256 bits).
pub const TOKEN_BYTES: usize = 32;

/// Default session lifetime (24 hours).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Error, Debug)]
pub enum SessionError {
    /// Unknown, revoked, or orphaned token.
    #[error("session not found")]
    NotFound,

    #[error("session expired")]
    Expired,

    #[error("user lookup failed: {0}")]
    Lookup(#[from] AuthError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Expired,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Session {
    pub token: String,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn state_at(&self, now: DateTime<Utc>) -> SessionState {
        if now > self.expires_at {
            SessionState::Expired
        } else {
            SessionState::Active
        }
    }
}

/// In-memory session table.
///
/// Revoked sessions are removed outright, so callers cannot tell them apart
/// from tokens that never existed. Expired sessions are removed lazily on
/// validation and in bulk by [`SessionManager::purge_expired`].
pub struct SessionManager {
    sessions: DashMap<String, Session>,
    credentials: CredentialStore,
    ttl: TimeDelta,
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

impl SessionManager {
    pub fn new(credentials: CredentialStore, ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            credentials,
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::hours(24)),
        }
    }

    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    pub fn create(&self, user_id: i32) -> Session {
        loop {
            let token = generate_token();
            if let Entry::Vacant(slot) = self.sessions.entry(token.clone()) {
                let now = Utc::now();
                let session = Session {
                    token,
                    user_id,
                    created_at: now,
                    expires_at: now + self.ttl,
                };
                slot.insert(session.clone());
                tracing::debug!("Session issued for user {}", user_id);
                return session;
            }
        }
    }

    /// Resolves a token to its user.
    pub async fn validate(&self, token: &str) -> Result<User, SessionError> {
        let session = self
            .sessions
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or(SessionError::NotFound)?;

        if session.state_at(Utc::now()) == SessionState::Expired {
            self.sessions.remove(token);
            tracing::debug!("Session for user {} expired", session.user_id);
            return Err(SessionError::Expired);
        }

        match self.credentials.find_by_id(session.user_id).await? {
            Some(user) => Ok(user),
            None => {
                self.sessions.remove(token);
                tracing::warn!(
                    "Dropping session of vanished user {}",
                    session.user_id
                );
                Err(SessionError::NotFound)
            }
        }
    }

    /// Idempotent. Returns whether a live session was removed.
    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    /// Drops every session owned by `user_id`.
    pub fn revoke_user(&self, user_id: i32) -> usize {
        let mut removed = 0;
        self.sessions.retain(|_, session| {
            let keep = session.user_id != user_id;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut removed = 0;
        self.sessions.retain(|_, session| {
            let keep = session.state_at(now) == SessionState::Active;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Role;
    use crate::infrastructure::database::setup_database;
    use std::sync::Arc;

    async fn manager_with_user(ttl: Duration) -> (SessionManager, User) {
        let db = setup_database("sqlite::memory:").await.unwrap();
        let credentials = CredentialStore::new(db).unwrap();
        let user = credentials
            .create_user("operator", "password123", Role::User)
            .await
            .unwrap();
        (SessionManager::new(credentials, ttl), user)
    }

    #[tokio::test]
    async fn test_create_and_validate() {
        let (manager, user) = manager_with_user(DEFAULT_SESSION_TTL).await;
        let session = manager.create(user.id);

        assert_eq!(session.user_id, user.id);
        assert_eq!(session.expires_at - session.created_at, TimeDelta::hours(24));

        let resolved = manager.validate(&session.token).await.unwrap();
        assert_eq!(resolved.id, user.id);
    }

    #[tokio::test]
    async fn test_tokens_are_long_and_unique() {
        let (manager, user) = manager_with_user(DEFAULT_SESSION_TTL).await;
        let a = manager.create(user.id);
        let b = manager.create(user.id);

        assert_ne!(a.token, b.token);
        let raw = URL_SAFE_NO_PAD.decode(&a.token).unwrap();
        assert_eq!(raw.len(), TOKEN_BYTES);
        assert_eq!(manager.active_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let (manager, _) = manager_with_user(DEFAULT_SESSION_TTL).await;
        assert!(matches!(
            manager.validate("not-a-token").await,
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let (manager, user) = manager_with_user(DEFAULT_SESSION_TTL).await;
        let session = manager.create(user.id);

        assert!(manager.revoke(&session.token));
        assert!(matches!(
            manager.validate(&session.token).await,
            Err(SessionError::NotFound)
        ));

        assert!(!manager.revoke(&session.token));
        assert!(matches!(
            manager.validate(&session.token).await,
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_expired_then_not_found() {
        let (manager, user) = manager_with_user(Duration::from_secs(1)).await;
        let session = manager.create(user.id);
        assert!(manager.validate(&session.token).await.is_ok());

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert!(matches!(
            manager.validate(&session.token).await,
            Err(SessionError::Expired)
        ));
        assert!(matches!(
            manager.validate(&session.token).await,
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (manager, user) = manager_with_user(Duration::from_millis(20)).await;
        manager.create(user.id);
        manager.create(user.id);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(manager.purge_expired(), 2);
        assert_eq!(manager.active_count(), 0);
    }

    #[tokio::test]
    async fn test_revoke_user_drops_all_sessions() {
        let (manager, user) = manager_with_user(DEFAULT_SESSION_TTL).await;
        let a = manager.create(user.id);
        let b = manager.create(user.id);
        let other = manager.create(user.id + 1);

        assert_eq!(manager.revoke_user(user.id), 2);
        assert!(manager.validate(&a.token).await.is_err());
        assert!(manager.validate(&b.token).await.is_err());
        assert_eq!(manager.active_count(), 1);
        assert!(manager.revoke(&other.token));
    }

    #[tokio::test]
    async fn test_session_of_missing_user_is_dropped() {
        let (manager, user) = manager_with_user(DEFAULT_SESSION_TTL).await;
        let orphan = manager.create(user.id + 100);

        assert!(matches!(
            manager.validate(&orphan.token).await,
            Err(SessionError::NotFound)
        ));
        assert_eq!(manager.active_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_create_and_validate() {
        let (manager, user) = manager_with_user(DEFAULT_SESSION_TTL).await;
        let manager = Arc::new(manager);

        let mut handles = Vec::new();
        for _ in 0..32 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                let session = manager.create(user.id);
                manager.validate(&session.token).await.map(|u| u.id)
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), user.id);
        }
        assert_eq!(manager.active_count(), 32);
    }
}
