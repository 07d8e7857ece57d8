//! Session Service
//!
//! Registration, login and token refresh. Sessions are stateless: nothing is
//! stored per token, a session lasts as long as its token does.

use crate::config::AuthConfig;
use crate::error::{AuthError, TokenError};
use crate::models::*;
use crate::password::PasswordHasher;
use crate::store::UserStore;
use crate::token::TokenCodec;

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use std::sync::Arc;
use validator::Validate;

/// Username of the account created on first start
pub const DEFAULT_ADMIN: &str = "admin";

/// Session service
pub struct SessionService {
    store: Arc<dyn UserStore>,
    hasher: Arc<PasswordHasher>,
    codec: Arc<TokenCodec>,
    token_ttl: Duration,
    renewal_window: Duration,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn UserStore>,
        codec: Arc<TokenCodec>,
        config: &AuthConfig,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            store,
            hasher: Arc::new(PasswordHasher::new(config)?),
            codec,
            token_ttl: seconds(config.token_ttl, "TOKEN_TTL")?,
            renewal_window: seconds(config.renewal_window, "TOKEN_RENEWAL_WINDOW")?,
        })
    }

    pub fn codec(&self) -> &Arc<TokenCodec> {
        &self.codec
    }

    // ============================================
    // Registration
    // ============================================

    /// Register a new user and issue a token
    pub async fn register(&self, username: &str, password: &str) -> Result<TokenResponse, AuthError> {
        RegisterRequest {
            username: username.to_string(),
            password: password.to_string(),
        }
        .validate()?;

        if self.store.find_by_username(username).await?.is_some() {
            return Err(AuthError::DuplicateIdentity);
        }

        let password_hash = self.hash_password(password).await?;
        let identity = self.store.create(username, &password_hash).await?;

        tracing::info!(user_id = identity.id, "User registered");

        self.issue(&identity)
    }

    /// Create the default admin account if it does not exist.
    ///
    /// Returns the generated password when the account was created.
    pub async fn ensure_default_admin(&self) -> Result<Option<String>, AuthError> {
        if self.store.find_by_username(DEFAULT_ADMIN).await?.is_some() {
            return Ok(None);
        }

        let mut bytes = [0u8; 6];
        rand::thread_rng().fill_bytes(&mut bytes);
        let password: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();

        let password_hash = self.hash_password(&password).await?;
        match self.store.create(DEFAULT_ADMIN, &password_hash).await {
            Ok(identity) => {
                tracing::info!(user_id = identity.id, "Default admin user created");
                Ok(Some(password))
            }
            // Another instance won the race
            Err(AuthError::DuplicateIdentity) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // ============================================
    // Login
    // ============================================

    /// Verify credentials and issue a token.
    ///
    /// Unknown usernames and wrong passwords fail identically.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenResponse, AuthError> {
        let Some(identity) = self.store.find_by_username(username).await? else {
            self.verify_password(password, None).await?;
            return Err(AuthError::InvalidCredentials);
        };

        if !self
            .verify_password(password, Some(identity.password_hash.clone()))
            .await?
        {
            tracing::debug!(user_id = identity.id, "Password verification failed");
            return Err(AuthError::InvalidCredentials);
        }

        self.issue(&identity)
    }

    // ============================================
    // Token Refresh
    // ============================================

    /// Exchange a token that is about to expire for a fresh one
    pub async fn refresh(&self, token: &str) -> Result<TokenResponse, AuthError> {
        self.refresh_at(token, Utc::now()).await
    }

    /// Refresh as if the current time were `now`
    pub async fn refresh_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenResponse, AuthError> {
        let claims = self.codec.validate_at(token, now)?;

        let remaining = Duration::seconds(claims.exp - now.timestamp());
        if remaining > self.renewal_window {
            return Err(AuthError::TokenStillValid);
        }

        let identity = self
            .store
            .find_by_id(claims.user_id)
            .await?
            .ok_or(AuthError::IdentityGone)?;

        tracing::debug!(user_id = identity.id, "Token refreshed");

        self.issue_at(&identity, now)
    }

    /// Load the identity a set of claims refers to
    pub async fn current_user(&self, claims: &Claims) -> Result<Identity, AuthError> {
        self.store
            .find_by_id(claims.user_id)
            .await?
            .ok_or_else(|| {
                tracing::warn!(user_id = claims.user_id, "Valid token for unknown user");
                AuthError::UnknownIdentity
            })
    }

    // Argon2 is CPU and memory heavy, keep it off the async workers

    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_owned();

        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(join_error)?
    }

    /// Verify against `hash`, or burn a dummy verification when there is none
    async fn verify_password(&self, password: &str, hash: Option<String>) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_owned();

        tokio::task::spawn_blocking(move || match hash {
            Some(hash) => hasher.verify(&password, &hash),
            None => hasher.verify_dummy(&password),
        })
        .await
        .map_err(join_error)
    }

    fn issue(&self, identity: &Identity) -> Result<TokenResponse, AuthError> {
        self.issue_at(identity, Utc::now())
    }

    fn issue_at(&self, identity: &Identity, now: DateTime<Utc>) -> Result<TokenResponse, AuthError> {
        let (token, expires_at) = self
            .codec
            .mint_at(identity, self.token_ttl, now)
            .map_err(|e| match e {
                TokenError::InvalidInput => AuthError::Internal,
                other => AuthError::Token(other),
            })?;

        Ok(TokenResponse {
            token,
            expires_at,
            user: UserResponse::from(identity),
        })
    }
}

fn seconds(value: i64, name: &str) -> Result<Duration, AuthError> {
    Duration::try_seconds(value)
        .ok_or_else(|| AuthError::Config(format!("{} is out of range", name)))
}

fn join_error(e: tokio::task::JoinError) -> AuthError {
    tracing::error!("Password hashing task failed: {:?}", e);
    AuthError::Internal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::test_config;
    use crate::store::{FailingUserStore, MemoryUserStore};
    use crate::token::SigningSecret;

    fn service_with_store() -> (SessionService, Arc<MemoryUserStore>) {
        let config = test_config();
        let store = Arc::new(MemoryUserStore::new());
        let codec = Arc::new(TokenCodec::new(
            &SigningSecret::from_config(&config).unwrap(),
            &config.jwt_issuer,
        ));
        let service = SessionService::new(store.clone(), codec, &config).unwrap();
        (service, store)
    }

    fn service() -> SessionService {
        service_with_store().0
    }

    #[tokio::test]
    async fn test_register_issues_seven_day_token() {
        let service = service();
        let before = Utc::now();
        let response = service.register("alice", "secret1").await.unwrap();

        assert_eq!(response.user.username, "alice");
        let claims = service.codec().validate(&response.token).unwrap();
        assert_eq!(claims.sub, response.user.id.to_string());
        assert!(response.expires_at >= before + Duration::days(7) - Duration::seconds(1));
        assert!(response.expires_at <= Utc::now() + Duration::days(7));
    }

    #[tokio::test]
    async fn test_register_enforces_policy() {
        let service = service();

        for (username, password) in [
            ("al", "secret1"),
            ("a_very_long_username_x", "secret1"),
            ("alice", "12345"),
            ("", ""),
        ] {
            assert!(matches!(
                service.register(username, password).await,
                Err(AuthError::ValidationFailed(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_register_duplicate() {
        let service = service();
        service.register("alice", "secret1").await.unwrap();
        assert_eq!(
            service.register("alice", "another1").await.unwrap_err(),
            AuthError::DuplicateIdentity
        );
    }

    #[tokio::test]
    async fn test_login_success_and_failure() {
        let service = service();
        let registered = service.register("alice", "secret1").await.unwrap();

        let response = service.login("alice", "secret1").await.unwrap();
        assert_eq!(response.user.id, registered.user.id);

        assert_eq!(
            service.login("alice", "wrongpw").await.unwrap_err(),
            AuthError::InvalidCredentials
        );
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let service = service();
        service.register("realuser", "rightpass").await.unwrap();

        let unknown = service.login("nouser", "x").await.unwrap_err();
        let wrong = service.login("realuser", "wrongpass").await.unwrap_err();

        assert_eq!(unknown, wrong);
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn test_refresh_too_early() {
        let service = service();
        let response = service.register("alice", "secret1").await.unwrap();

        assert_eq!(
            service.refresh(&response.token).await.unwrap_err(),
            AuthError::TokenStillValid
        );
    }

    #[tokio::test]
    async fn test_refresh_near_expiry() {
        let (service, store) = service_with_store();
        let registered = service.register("alice", "secret1").await.unwrap();
        let identity = store.find_by_id(registered.user.id).await.unwrap().unwrap();

        let (token, _) = service
            .codec()
            .mint(&identity, Duration::minutes(10))
            .unwrap();

        let before = Utc::now();
        let refreshed = service.refresh(&token).await.unwrap();
        assert_ne!(refreshed.token, token);
        assert!(refreshed.expires_at >= before + Duration::days(7) - Duration::seconds(1));

        let claims = service.codec().validate(&refreshed.token).unwrap();
        assert_eq!(claims.user_id, identity.id);
    }

    #[tokio::test]
    async fn test_refresh_uses_current_identity_snapshot() {
        let (service, store) = service_with_store();
        let registered = service.register("alice", "secret1").await.unwrap();
        let identity = store.find_by_id(registered.user.id).await.unwrap().unwrap();
        let (token, _) = service
            .codec()
            .mint(&identity, Duration::minutes(10))
            .unwrap();

        store.rename(identity.id, "alicia").await.unwrap();

        let refreshed = service.refresh(&token).await.unwrap();
        assert_eq!(refreshed.user.username, "alicia");
    }

    #[tokio::test]
    async fn test_refresh_at_simulated_time() {
        let service = service();
        let response = service.register("alice", "secret1").await.unwrap();
        let near_expiry = response.expires_at - Duration::minutes(10);

        let refreshed = service.refresh_at(&response.token, near_expiry).await.unwrap();
        assert_eq!(refreshed.expires_at, near_expiry + Duration::days(7));

        assert_eq!(
            service
                .refresh_at(&response.token, response.expires_at)
                .await
                .unwrap_err(),
            AuthError::Token(TokenError::Expired)
        );
    }

    #[tokio::test]
    async fn test_refresh_identity_gone() {
        let (service, store) = service_with_store();
        let registered = service.register("alice", "secret1").await.unwrap();
        let identity = store.find_by_id(registered.user.id).await.unwrap().unwrap();
        let (token, _) = service
            .codec()
            .mint(&identity, Duration::minutes(10))
            .unwrap();

        store.remove(identity.id).await;

        assert_eq!(
            service.refresh(&token).await.unwrap_err(),
            AuthError::IdentityGone
        );
    }

    #[tokio::test]
    async fn test_refresh_rejects_garbage() {
        let service = service();
        assert_eq!(
            service.refresh("not-a-token").await.unwrap_err(),
            AuthError::Token(TokenError::MalformedToken)
        );
    }

    #[tokio::test]
    async fn test_default_admin_created_once() {
        let service = service();

        let password = service.ensure_default_admin().await.unwrap().unwrap();
        assert_eq!(password.len(), 12);
        assert!(service.login(DEFAULT_ADMIN, &password).await.is_ok());

        assert_eq!(service.ensure_default_admin().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_as_database_error() {
        let config = test_config();
        let codec = Arc::new(TokenCodec::new(
            &SigningSecret::from_config(&config).unwrap(),
            &config.jwt_issuer,
        ));
        let service = SessionService::new(Arc::new(FailingUserStore), codec, &config).unwrap();

        assert!(matches!(
            service.login("alice", "secret1").await,
            Err(AuthError::Database(_))
        ));
        assert!(matches!(
            service.register("alice", "secret1").await,
            Err(AuthError::Database(_))
        ));
    }

    #[tokio::test]
    async fn test_current_user() {
        let (service, store) = service_with_store();
        let registered = service.register("alice", "secret1").await.unwrap();
        let claims = service.codec().validate(&registered.token).unwrap();

        let identity = service.current_user(&claims).await.unwrap();
        assert_eq!(identity.username, "alice");

        store.remove(identity.id).await;
        assert_eq!(
            service.current_user(&claims).await.unwrap_err(),
            AuthError::UnknownIdentity
        );
    }

    #[test]
    fn test_out_of_range_ttl_is_a_config_error() {
        let config = AuthConfig {
            token_ttl: i64::MAX,
            ..test_config()
        };
        let codec = Arc::new(TokenCodec::new(
            &SigningSecret::from_config(&config).unwrap(),
            &config.jwt_issuer,
        ));

        assert!(matches!(
            SessionService::new(Arc::new(MemoryUserStore::new()), codec, &config),
            Err(AuthError::Config(_))
        ));
    }
}
