//! Configuration
//!
//! All values are loaded from environment variables once at startup.

use crate::error::AuthError;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Longest accepted token lifetime: ten years
pub const MAX_TOKEN_TTL: i64 = 10 * 365 * 24 * 60 * 60;

/// Authentication configuration loaded from environment
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC secret for signing tokens (from JWT_SECRET env var).
    /// When unset a random secret is generated at startup.
    pub jwt_secret: Option<String>,

    /// Token issuer (from JWT_ISSUER env var)
    pub jwt_issuer: String,

    /// Token time-to-live in seconds (from TOKEN_TTL env var)
    pub token_ttl: i64,

    /// Refresh is only allowed once the remaining lifetime drops to this
    /// many seconds (from TOKEN_RENEWAL_WINDOW env var)
    pub renewal_window: i64,

    /// Argon2 memory cost in KiB (from ARGON2_MEMORY_COST env var)
    pub argon2_memory_cost: u32,

    /// Argon2 time cost (iterations) (from ARGON2_TIME_COST env var)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (from ARGON2_PARALLELISM env var)
    pub argon2_parallelism: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_issuer: "docark".to_string(),
            token_ttl: 604800,    // 7 days
            renewal_window: 1800, // 30 minutes
            argon2_memory_cost: 65536,
            argon2_time_cost: 3,
            argon2_parallelism: 4,
        }
    }
}

impl AuthConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            jwt_secret: env::var("JWT_SECRET").ok().filter(|s| !s.is_empty()),

            jwt_issuer: env::var("JWT_ISSUER").unwrap_or(defaults.jwt_issuer),

            token_ttl: parse_var("TOKEN_TTL").unwrap_or(defaults.token_ttl),

            renewal_window: parse_var("TOKEN_RENEWAL_WINDOW").unwrap_or(defaults.renewal_window),

            argon2_memory_cost: parse_var("ARGON2_MEMORY_COST")
                .unwrap_or(defaults.argon2_memory_cost),

            argon2_time_cost: parse_var("ARGON2_TIME_COST").unwrap_or(defaults.argon2_time_cost),

            argon2_parallelism: parse_var("ARGON2_PARALLELISM")
                .unwrap_or(defaults.argon2_parallelism),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), AuthError> {
        if let Some(secret) = &self.jwt_secret {
            if secret.len() < 32 {
                return Err(AuthError::Config(
                    "JWT_SECRET must be at least 32 characters".to_string(),
                ));
            }
        }

        if self.jwt_issuer.is_empty() {
            return Err(AuthError::Config("JWT_ISSUER must not be empty".to_string()));
        }

        if self.token_ttl <= 0 || self.token_ttl > MAX_TOKEN_TTL {
            return Err(AuthError::Config(format!(
                "TOKEN_TTL must be between 1 and {} seconds",
                MAX_TOKEN_TTL
            )));
        }

        if self.renewal_window <= 0 || self.renewal_window >= self.token_ttl {
            return Err(AuthError::Config(
                "TOKEN_RENEWAL_WINDOW must be positive and smaller than TOKEN_TTL".to_string(),
            ));
        }

        Ok(())
    }
}

/// Server and collaborator configuration loaded from environment
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Enables permissive CORS for the development web client
    pub debug: bool,
    pub archive_dir: PathBuf,
    pub static_dir: PathBuf,
    /// Postgres connection string; the in-memory user store is used when unset
    pub database_url: Option<String>,
    pub meili_host: String,
    pub meili_api_key: Option<String>,
    pub meili_index: String,
    pub search_page_size: u32,
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, AuthError> {
        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:7845".to_string())
            .parse()
            .map_err(|e| AuthError::Config(format!("Invalid BIND_ADDR: {}", e)))?;

        let config = Self {
            bind_addr,
            debug: env::var("DEBUG")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false),
            archive_dir: env::var("ARCHIVE_DIR")
                .unwrap_or_else(|_| "./static/archive".to_string())
                .into(),
            static_dir: env::var("STATIC_DIR")
                .unwrap_or_else(|_| "./static/web".to_string())
                .into(),
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            meili_host: env::var("MEILI_HOST")
                .unwrap_or_else(|_| "http://127.0.0.1:7700".to_string()),
            meili_api_key: env::var("MEILI_API_KEY").ok().filter(|s| !s.is_empty()),
            meili_index: env::var("MEILI_INDEX").unwrap_or_else(|_| "documents".to_string()),
            search_page_size: parse_var("SEARCH_PAGE_SIZE").unwrap_or(10),
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES").unwrap_or(50 * 1024 * 1024),
        };

        if config.search_page_size == 0 {
            return Err(AuthError::Config(
                "SEARCH_PAGE_SIZE must be positive".to_string(),
            ));
        }

        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}
