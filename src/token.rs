//! Session Tokens
//!
//! HS256 JWTs binding [`Claims`] to the process signing secret.

use crate::config::AuthConfig;
use crate::error::{AuthError, TokenError};
use crate::models::{Claims, Identity};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use rand::{rngs::OsRng, RngCore};
use serde::Deserialize;
use uuid::Uuid;

const ALGORITHM: Algorithm = Algorithm::HS256;
const ALGORITHM_NAME: &str = "HS256";

/// Process-wide signing secret, created once at startup
#[derive(Clone)]
pub struct SigningSecret(Vec<u8>);

impl SigningSecret {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Generate a random 32-byte secret
    pub fn generate() -> Result<Self, AuthError> {
        let mut bytes = vec![0u8; 32];
        OsRng.try_fill_bytes(&mut bytes).map_err(|e| {
            tracing::error!("Failed to gather entropy for signing secret: {}", e);
            AuthError::Internal
        })?;
        Ok(Self(bytes))
    }

    /// Use the configured secret, or generate one if none is configured
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        match &config.jwt_secret {
            Some(secret) => Ok(Self::from_bytes(secret.as_bytes())),
            None => {
                tracing::warn!(
                    "JWT_SECRET not set, using a generated secret; tokens will not survive a restart"
                );
                Self::generate()
            }
        }
    }
}

impl std::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningSecret(..)")
    }
}

#[derive(Deserialize)]
struct RawHeader {
    alg: String,
}

/// Mints and validates session tokens
pub struct TokenCodec {
    issuer: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(secret: &SigningSecret, issuer: impl Into<String>) -> Self {
        let issuer = issuer.into();

        // Time windows are checked by hand against the caller's clock.
        let mut validation = Validation::new(ALGORITHM);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;
        validation.set_issuer(&[&issuer]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);

        Self {
            issuer,
            encoding_key: EncodingKey::from_secret(&secret.0),
            decoding_key: DecodingKey::from_secret(&secret.0),
            validation,
        }
    }

    /// Mint a token for `identity` valid for `ttl` from now
    pub fn mint(
        &self,
        identity: &Identity,
        ttl: Duration,
    ) -> Result<(String, DateTime<Utc>), TokenError> {
        self.mint_at(identity, ttl, Utc::now())
    }

    /// Mint a token as if the current time were `now`
    pub fn mint_at(
        &self,
        identity: &Identity,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<(String, DateTime<Utc>), TokenError> {
        if identity.id <= 0 || identity.username.is_empty() || ttl <= Duration::zero() {
            return Err(TokenError::InvalidInput);
        }

        let iat = now.timestamp();
        let exp = now
            .checked_add_signed(ttl)
            .ok_or(TokenError::InvalidInput)?
            .timestamp();

        let claims = Claims {
            user_id: identity.id,
            username: identity.username.clone(),
            iat,
            nbf: iat,
            exp,
            iss: self.issuer.clone(),
            sub: identity.id.to_string(),
            jti: Uuid::new_v4(),
        };

        let token = encode(&Header::new(ALGORITHM), &claims, &self.encoding_key).map_err(|e| {
            tracing::error!("Failed to sign token: {:?}", e);
            TokenError::Signing
        })?;

        Ok((token, claims.expires_at()))
    }

    /// Validate a token against the current time
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        self.validate_at(token, Utc::now())
    }

    /// Validate a token as if the current time were `now`
    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let alg = declared_algorithm(token)?;
        if alg != ALGORITHM_NAME {
            tracing::warn!(alg = %alg, "Rejected token with unexpected algorithm");
            return Err(TokenError::UnsupportedAlgorithm);
        }

        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                tracing::debug!("Token validation failed: {:?}", e);
                match e.kind() {
                    ErrorKind::InvalidSignature => TokenError::BadSignature,
                    ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                        TokenError::UnsupportedAlgorithm
                    }
                    _ => TokenError::MalformedToken,
                }
            })?
            .claims;

        if claims.sub != claims.user_id.to_string() {
            return Err(TokenError::MalformedToken);
        }

        let now = now.timestamp();
        if now >= claims.exp {
            return Err(TokenError::Expired);
        }
        if now < claims.nbf {
            return Err(TokenError::NotYetValid);
        }

        Ok(claims)
    }

    /// Time left before the token expires
    pub fn remaining_lifetime(&self, token: &str) -> Result<Duration, TokenError> {
        let now = Utc::now();
        let claims = self.validate_at(token, now)?;
        Ok(Duration::seconds(claims.exp - now.timestamp()))
    }
}

/// Read the `alg` field of the token header without trusting anything else
fn declared_algorithm(token: &str) -> Result<String, TokenError> {
    let mut segments = token.split('.');
    let (Some(header), Some(_), Some(_), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(TokenError::MalformedToken);
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|_| TokenError::MalformedToken)?;
    let header: RawHeader =
        serde_json::from_slice(&bytes).map_err(|_| TokenError::MalformedToken)?;

    Ok(header.alg)
}
