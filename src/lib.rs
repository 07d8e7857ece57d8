//! Docark
//!
//! Backend for a searchable archive of HTML documents:
//! - User registration and login
//! - Stateless HS256 session tokens with near-expiry refresh
//! - Argon2id password hashing
//! - Strict and optional request authentication gates
//! - Keyword search proxied to Meilisearch
//! - HTML upload and archiving
//!
//! # Configuration
//!
//! Loaded from environment variables, see [`config::AuthConfig`] and
//! [`config::ServerConfig`]:
//! - `JWT_SECRET` - Secret key for signing tokens (min 32 chars, generated if unset)
//! - `TOKEN_TTL` - Token lifetime in seconds (default: 604800)
//! - `TOKEN_RENEWAL_WINDOW` - Refresh allowed in the last N seconds (default: 1800)
//! - `DATABASE_URL` - PostgreSQL connection string (in-memory store if unset)
//! - `MEILI_HOST` / `MEILI_API_KEY` / `MEILI_INDEX` - Search backend

pub mod archive;
pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod password;
pub mod search;
pub mod service;
pub mod state;
pub mod store;
pub mod token;

// Re-export commonly used types
pub use config::{AuthConfig, ServerConfig};
pub use error::{AuthError, ServiceError, TokenError};
pub use extractors::{CurrentUser, MaybeUser};
pub use handlers::create_routes;
pub use middleware::AuthGate;
pub use models::*;
pub use service::SessionService;
pub use state::AppState;
pub use store::{MemoryUserStore, PgUserStore, UserStore};
pub use token::{SigningSecret, TokenCodec};
