use crate::entities::{Role, User, prelude::Users, users};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, SqlErr,
};
use std::sync::Arc;
use thiserror::Error;

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum password length.
pub const MAX_PASSWORD_LENGTH: usize = 128;

#[derive(Error, Debug)]
pub enum AuthError {
    /// Unknown identifier or wrong password. The two are never distinguished.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("identifier already exists")]
    DuplicateIdentifier,

    #[error("identifier must not be empty")]
    InvalidIdentifier,

    #[error("user not found")]
    UserNotFound,

    #[error("password must be between {MIN_PASSWORD_LENGTH} and {MAX_PASSWORD_LENGTH} characters")]
    WeakPassword,

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

/// Hook for callers that count login attempts (throttling, lockout).
pub trait LoginAttemptObserver: Send + Sync {
    fn on_failure(&self, identifier: &str);

    fn on_success(&self, _identifier: &str) {}
}

/// Persistent user records and password verification.
#[derive(Clone)]
pub struct CredentialStore {
    db: DatabaseConnection,
    /// Verified against when the identifier is unknown so both failure paths
    /// cost one full Argon2 run.
    dummy_hash: Arc<str>,
}

fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

fn verify_hash(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!("Stored password hash is malformed: {}", e);
            false
        }
    }
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    let len = password.chars().count();
    if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&len) {
        return Err(AuthError::WeakPassword);
    }
    Ok(())
}

async fn hash_off_runtime(password: &str) -> Result<String, AuthError> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AuthError::Hashing(e.to_string()))?
}

impl CredentialStore {
    pub fn new(db: DatabaseConnection) -> Result<Self, AuthError> {
        let dummy_hash = hash_password("placeholder-password-never-matches")?;
        Ok(Self {
            db,
            dummy_hash: Arc::from(dummy_hash),
        })
    }

    /// Checks a login attempt.
    ///
    /// Unknown identifiers and wrong passwords both return
    /// [`AuthError::InvalidCredentials`] after one Argon2 verification.
    pub async fn verify(
        &self,
        identifier: &str,
        candidate_password: &str,
        observer: Option<&dyn LoginAttemptObserver>,
    ) -> Result<User, AuthError> {
        let user = Users::find()
            .filter(users::Column::Identifier.eq(identifier))
            .one(&self.db)
            .await?;

        let hash = match &user {
            Some(u) => u.password_hash.clone(),
            None => self.dummy_hash.to_string(),
        };
        let candidate = candidate_password.to_owned();
        let matched = tokio::task::spawn_blocking(move || verify_hash(&candidate, &hash))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?;

        match user {
            Some(user) if matched => {
                if let Some(observer) = observer {
                    observer.on_success(identifier);
                }
                tracing::info!("🔑 User {} authenticated", user.id);
                Ok(user)
            }
            Some(user) => {
                tracing::debug!("Login rejected: password mismatch for user {}", user.id);
                if let Some(observer) = observer {
                    observer.on_failure(identifier);
                }
                Err(AuthError::InvalidCredentials)
            }
            None => {
                tracing::debug!("Login rejected: unknown identifier '{}'", identifier);
                if let Some(observer) = observer {
                    observer.on_failure(identifier);
                }
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    pub async fn create_user(
        &self,
        identifier: &str,
        password: &str,
        role: Role,
    ) -> Result<User, AuthError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(AuthError::InvalidIdentifier);
        }
        validate_password(password)?;

        let exists = Users::find()
            .filter(users::Column::Identifier.eq(identifier))
            .one(&self.db)
            .await?
            .is_some();
        if exists {
            return Err(AuthError::DuplicateIdentifier);
        }

        let password_hash = hash_off_runtime(password).await?;

        let user = users::ActiveModel {
            identifier: Set(identifier.to_string()),
            password_hash: Set(password_hash),
            role: Set(role),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        match user.insert(&self.db).await {
            Ok(user) => {
                tracing::info!("👤 Created user {} ({:?})", user.id, user.role);
                Ok(user)
            }
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Err(AuthError::DuplicateIdentifier)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn update_password(&self, user_id: i32, password: &str) -> Result<(), AuthError> {
        validate_password(password)?;
        let user = self
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let password_hash = hash_off_runtime(password).await?;
        let mut active: users::ActiveModel = user.into();
        active.password_hash = Set(password_hash);
        active.update(&self.db).await?;

        tracing::info!("🔐 Password updated for user {}", user_id);
        Ok(())
    }

    pub async fn update_role(&self, user_id: i32, role: Role) -> Result<User, AuthError> {
        let user = self
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let mut active: users::ActiveModel = user.into();
        active.role = Set(role);
        let updated = active.update(&self.db).await?;

        tracing::info!("🛡️  Role of user {} set to {:?}", user_id, role);
        Ok(updated)
    }

    pub async fn find_by_id(&self, user_id: i32) -> Result<Option<User>, AuthError> {
        Ok(Users::find_by_id(user_id).one(&self.db).await?)
    }

    pub async fn list_users(&self) -> Result<Vec<User>, AuthError> {
        Ok(Users::find()
            .order_by_asc(users::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn count(&self) -> Result<u64, AuthError> {
        Ok(Users::find().count(&self.db).await?)
    }
}
