//! User Store
//!
//! The persistence boundary for identity records. The session service and
//! the auth gate only talk to [`UserStore`]; Postgres and in-memory backends
//! are provided.

use crate::error::AuthError;
use crate::models::Identity;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Identity persistence used by the session service and auth gate
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create a user. Fails with `DuplicateIdentity` if the username is taken.
    async fn create(&self, username: &str, password_hash: &str) -> Result<Identity, AuthError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Identity>, AuthError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, AuthError>;
}

// ============================================
// Postgres
// ============================================

/// Postgres-backed user store
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create the users table if it does not exist
    pub async fn migrate(&self) -> Result<(), AuthError> {
        tracing::info!("Running user store migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGSERIAL PRIMARY KEY,
                username VARCHAR(20) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            "#,
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, username: &str, password_hash: &str) -> Result<Identity, AuthError> {
        let result = sqlx::query_as::<_, Identity>(
            r#"
            INSERT INTO users (username, password_hash)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.db)
        .await;

        match result {
            Ok(identity) => Ok(identity),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Err(AuthError::DuplicateIdentity)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Identity>, AuthError> {
        let identity = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(identity)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, AuthError> {
        let identity = sqlx::query_as("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.db)
            .await?;
        Ok(identity)
    }
}

// ============================================
// In-memory
// ============================================

#[derive(Default)]
struct MemoryUsers {
    next_id: i64,
    by_id: HashMap<i64, Identity>,
}

/// In-memory user store, used when no database is configured and in tests
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<MemoryUsers>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove a user, returning whether it existed
    pub async fn remove(&self, id: i64) -> bool {
        self.users.write().await.by_id.remove(&id).is_some()
    }

    /// Rename a user in place, bumping `updated_at`
    pub async fn rename(&self, id: i64, username: &str) -> Option<Identity> {
        let mut users = self.users.write().await;
        let identity = users.by_id.get_mut(&id)?;
        identity.username = username.to_string();
        identity.updated_at = Utc::now();
        Some(identity.clone())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, username: &str, password_hash: &str) -> Result<Identity, AuthError> {
        let mut users = self.users.write().await;

        if users.by_id.values().any(|u| u.username == username) {
            return Err(AuthError::DuplicateIdentity);
        }

        users.next_id += 1;
        let now = Utc::now();
        let identity = Identity {
            id: users.next_id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
            updated_at: now,
        };
        users.by_id.insert(identity.id, identity.clone());

        Ok(identity)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Identity>, AuthError> {
        Ok(self.users.read().await.by_id.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, AuthError> {
        Ok(self
            .users
            .read()
            .await
            .by_id
            .values()
            .find(|u| u.username == username)
            .cloned())
    }
}

/// Store whose every call fails, as an unreachable database would
#[cfg(test)]
pub(crate) struct FailingUserStore;

#[cfg(test)]
#[async_trait]
impl UserStore for FailingUserStore {
    async fn create(&self, _: &str, _: &str) -> Result<Identity, AuthError> {
        Err(AuthError::Database("connection refused".into()))
    }

    async fn find_by_id(&self, _: i64) -> Result<Option<Identity>, AuthError> {
        Err(AuthError::Database("connection refused".into()))
    }

    async fn find_by_username(&self, _: &str) -> Result<Option<Identity>, AuthError> {
        Err(AuthError::Database("connection refused".into()))
    }
}
