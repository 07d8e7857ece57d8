//! Error Types
//!
//! Token, authentication and glue-service errors, each convertible into an
//! HTTP response with a `{"error": .., "message": ..}` body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Failures of minting or validating a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Cannot mint a token for an absent identity")]
    InvalidInput,

    #[error("Malformed token")]
    MalformedToken,

    #[error("Unsupported token algorithm")]
    UnsupportedAlgorithm,

    #[error("Token signature does not verify")]
    BadSignature,

    #[error("Token has expired")]
    Expired,

    #[error("Token is not yet valid")]
    NotYetValid,

    #[error("Failed to sign token")]
    Signing,
}

impl TokenError {
    pub fn code(&self) -> &'static str {
        match self {
            TokenError::InvalidInput => "invalid_input",
            TokenError::MalformedToken => "malformed_token",
            TokenError::UnsupportedAlgorithm => "unsupported_algorithm",
            TokenError::BadSignature => "bad_signature",
            TokenError::Expired => "token_expired",
            TokenError::NotYetValid => "token_not_yet_valid",
            TokenError::Signing => "signing_failed",
        }
    }
}

/// Authentication errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Validation error: {0}")]
    ValidationFailed(String),

    #[error("Username already registered")]
    DuplicateIdentity,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("{0}")]
    Token(#[from] TokenError),

    #[error("Token is still valid, refresh not needed")]
    TokenStillValid,

    #[error("The user associated with this token no longer exists")]
    IdentityGone,

    #[error("The user associated with this token does not exist")]
    UnknownIdentity,

    #[error("Authorization header is required")]
    MissingCredential,

    #[error("Invalid authorization header format")]
    MalformedCredential,

    #[error("Bearer token is empty")]
    EmptyCredential,

    #[error("Unauthorized: {0}")]
    Unauthorized(TokenError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error")]
    Internal,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            AuthError::ValidationFailed(msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", msg.clone())
            }
            AuthError::DuplicateIdentity => {
                (StatusCode::CONFLICT, "duplicate_identity", self.to_string())
            }
            AuthError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                self.to_string(),
            ),
            AuthError::Token(err) | AuthError::Unauthorized(err) => {
                (StatusCode::UNAUTHORIZED, err.code(), err.to_string())
            }
            AuthError::TokenStillValid => (
                StatusCode::BAD_REQUEST,
                "token_still_valid",
                self.to_string(),
            ),
            AuthError::IdentityGone | AuthError::UnknownIdentity => (
                StatusCode::UNAUTHORIZED,
                "unknown_identity",
                self.to_string(),
            ),
            AuthError::MissingCredential => (
                StatusCode::UNAUTHORIZED,
                "missing_credential",
                self.to_string(),
            ),
            AuthError::MalformedCredential | AuthError::EmptyCredential => (
                StatusCode::UNAUTHORIZED,
                "malformed_credential",
                self.to_string(),
            ),
            AuthError::Config(_) | AuthError::Database(_) | AuthError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred".to_string(),
            ),
        };

        (
            status,
            Json(serde_json::json!({
                "error": error_code,
                "message": message
            })),
        )
            .into_response()
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        AuthError::Database(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        tracing::error!("Password hashing error: {:?}", err);
        AuthError::Internal
    }
}

impl From<validator::ValidationErrors> for AuthError {
    fn from(err: validator::ValidationErrors) -> Self {
        AuthError::ValidationFailed(err.to_string())
    }
}

/// Errors from the search proxy and upload endpoints
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Search backend error: {0}")]
    Search(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ServiceError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg),
            ServiceError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ServiceError::Search(msg) => {
                tracing::error!("Search error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "search_error",
                    "The search backend is unavailable".to_string(),
                )
            }
            ServiceError::Storage(msg) => {
                tracing::error!("Storage error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    "A storage error occurred".to_string(),
                )
            }
        };

        (
            status,
            Json(serde_json::json!({
                "error": error,
                "message": message
            })),
        )
            .into_response()
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        ServiceError::Search(err.to_string())
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::Storage(err.to_string())
    }
}
