//! Shared application state

use crate::archive::Archive;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::middleware::AuthGate;
use crate::search::SearchIndex;
use crate::service::SessionService;
use crate::store::UserStore;
use crate::token::{SigningSecret, TokenCodec};

use std::sync::Arc;

/// State shared by every handler and the gate middleware
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionService>,
    pub gate: Arc<AuthGate>,
    pub search: Arc<dyn SearchIndex>,
    pub archive: Arc<Archive>,
}

impl AppState {
    /// Wire the auth components around one signing secret and user store
    pub fn new(
        config: &AuthConfig,
        secret: &SigningSecret,
        store: Arc<dyn UserStore>,
        search: Arc<dyn SearchIndex>,
        archive: Archive,
    ) -> Result<Self, AuthError> {
        let codec = Arc::new(TokenCodec::new(secret, &config.jwt_issuer));
        let sessions = Arc::new(SessionService::new(store, codec, config)?);
        let gate = Arc::new(AuthGate::new(sessions.clone()));

        Ok(Self {
            sessions,
            gate,
            search,
            archive: Arc::new(archive),
        })
    }
}
