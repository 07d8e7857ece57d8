//! Authentication Middleware
//!
//! The request gate: bearer extraction, token validation and identity
//! resolution, in strict and optional flavours.

use crate::error::AuthError;
use crate::models::AuthContext;
use crate::service::SessionService;
use crate::state::AppState;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

const BEARER_PREFIX: &str = "Bearer ";

/// Pull the token out of an `Authorization: Bearer <token>` header
pub fn extract_bearer(header: Option<&HeaderValue>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingCredential)?;
    let header = header.to_str().map_err(|_| AuthError::MalformedCredential)?;

    let token = header
        .strip_prefix(BEARER_PREFIX)
        .ok_or(AuthError::MalformedCredential)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::EmptyCredential);
    }

    Ok(token)
}

/// Validates bearer tokens and resolves them to identities
pub struct AuthGate {
    sessions: Arc<SessionService>,
}

impl AuthGate {
    pub fn new(sessions: Arc<SessionService>) -> Self {
        Self { sessions }
    }

    /// Strict evaluation: every failure is an error
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let token = extract_bearer(headers.get(AUTHORIZATION))?;

        let claims = self
            .sessions
            .codec()
            .validate(token)
            .map_err(AuthError::Unauthorized)?;

        let identity = self.sessions.current_user(&claims).await?;

        Ok(AuthContext { identity, claims })
    }

    /// Lenient evaluation: any failure yields no context
    pub async fn try_authenticate(&self, headers: &HeaderMap) -> Option<AuthContext> {
        self.authenticate(headers).await.ok()
    }
}

/// Require an authenticated user
///
/// Rejects the request unless the bearer token is valid and its user still
/// exists; otherwise stores the [`AuthContext`] in request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let context = state.gate.authenticate(req.headers()).await?;

    req.extensions_mut().insert(context);

    Ok(next.run(req).await)
}

/// Optional authentication
///
/// Attaches an [`AuthContext`] when the request carries a usable token and
/// proceeds anonymously otherwise.
pub async fn optional_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if let Some(context) = state.gate.try_authenticate(req.headers()).await {
        req.extensions_mut().insert(context);
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TokenError;
    use crate::models::Identity;
    use crate::password::test_config;
    use crate::store::{FailingUserStore, MemoryUserStore, UserStore};
    use crate::token::{SigningSecret, TokenCodec};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use chrono::Duration;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    fn gate_over(store: Arc<dyn UserStore>) -> (AuthGate, Arc<TokenCodec>) {
        let config = test_config();
        let codec = Arc::new(TokenCodec::new(
            &SigningSecret::from_bytes("test-secret-key-that-is-long-enough!!"),
            "docark",
        ));
        let sessions = SessionService::new(store, codec.clone(), &config).unwrap();
        (AuthGate::new(Arc::new(sessions)), codec)
    }

    fn gate() -> (AuthGate, Arc<TokenCodec>, Arc<MemoryUserStore>) {
        let store = Arc::new(MemoryUserStore::new());
        let (gate, codec) = gate_over(store.clone());
        (gate, codec, store)
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_extract_bearer() {
        let value = HeaderValue::from_static("Bearer abc.def.ghi");
        assert_eq!(extract_bearer(Some(&value)), Ok("abc.def.ghi"));
    }

    #[test]
    fn test_extract_bearer_failures_are_distinct() {
        assert_eq!(extract_bearer(None), Err(AuthError::MissingCredential));

        let basic = HeaderValue::from_static("Basic dXNlcjpwYXNz");
        assert_eq!(extract_bearer(Some(&basic)), Err(AuthError::MalformedCredential));

        let lowercase = HeaderValue::from_static("bearer abc");
        assert_eq!(
            extract_bearer(Some(&lowercase)),
            Err(AuthError::MalformedCredential)
        );

        let empty = HeaderValue::from_static("Bearer ");
        assert_eq!(extract_bearer(Some(&empty)), Err(AuthError::EmptyCredential));
    }

    #[tokio::test]
    async fn test_gate_admits_valid_token() {
        let (gate, codec, store) = gate();
        let alice = store.create("alice", "hash").await.unwrap();
        let (token, _) = codec.mint(&alice, Duration::hours(1)).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );

        let context = gate.authenticate(&headers).await.unwrap();
        assert_eq!(context.identity.username, "alice");
        assert_eq!(context.claims.sub, alice.id.to_string());
        assert!(gate.try_authenticate(&headers).await.is_some());
    }

    #[tokio::test]
    async fn test_gate_rejections() {
        let (gate, codec, store) = gate();

        assert_eq!(
            gate.authenticate(&HeaderMap::new()).await.unwrap_err(),
            AuthError::MissingCredential
        );
        assert_eq!(
            gate.authenticate(&headers("Token abc")).await.unwrap_err(),
            AuthError::MalformedCredential
        );
        assert_eq!(
            gate.authenticate(&headers("Bearer abc")).await.unwrap_err(),
            AuthError::Unauthorized(TokenError::MalformedToken)
        );

        let bob = store.create("bob", "hash").await.unwrap();
        let (token, _) = codec.mint(&bob, Duration::hours(1)).unwrap();
        store.remove(bob.id).await;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        assert_eq!(
            gate.authenticate(&headers).await.unwrap_err(),
            AuthError::UnknownIdentity
        );
        assert!(gate.try_authenticate(&headers).await.is_none());
    }

    #[tokio::test]
    async fn test_gate_rejects_expired_token() {
        let (gate, codec, store) = gate();
        let alice = store.create("alice", "hash").await.unwrap();
        let minted_at = chrono::Utc::now() - Duration::hours(2);
        let (token, _) = codec
            .mint_at(&alice, Duration::hours(1), minted_at)
            .unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        assert_eq!(
            gate.authenticate(&headers).await.unwrap_err(),
            AuthError::Unauthorized(TokenError::Expired)
        );
    }

    #[tokio::test]
    async fn test_store_failure_is_not_an_auth_failure() {
        let (gate, codec) = gate_over(Arc::new(FailingUserStore));
        let alice = Identity {
            id: 1,
            username: "alice".to_string(),
            password_hash: String::new(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let (token, _) = codec.mint(&alice, Duration::hours(1)).unwrap();
        let headers = bearer(&token);

        let err = gate.authenticate(&headers).await.unwrap_err();
        assert!(matches!(err, AuthError::Database(_)));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        assert!(gate.try_authenticate(&headers).await.is_none());
    }
}
