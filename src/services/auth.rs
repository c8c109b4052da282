//! Credential service: password hashing and JWT issue/validation.
//!
//! DESIGN
//! ======
//! Three token kinds share one HS256 secret and are told apart by the
//! `scope` claim:
//! - `access_token`: bearer credential for API calls (default 60 min)
//! - `refresh_token`: exchanged for a new pair; the latest one is stored on
//!   the user row so a replayed older token can be detected (default 7 days)
//! - `email_token`: embedded in the confirmation link (1 day)
//!
//! Every token carries a random `jti`, so two tokens minted in the same
//! second for the same subject never compare equal.

use std::fmt::Write;

use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

pub const EMAIL_TOKEN_TTL: Duration = Duration::days(1);
const SALT_LEN: usize = 16;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Could not validate credentials")]
    InvalidToken,
    #[error("Invalid scope for token")]
    InvalidScope,
    #[error("token signing failed: {0}")]
    Signing(String),
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

// =============================================================================
// PASSWORDS
// =============================================================================

/// Hash a plain password into an argon2id PHC string.
///
/// # Errors
///
/// Returns [`AuthError::Hashing`] if argon2 rejects the input.
pub fn hash_password(plain: &str) -> Result<String, AuthError> {
    let salt_bytes: [u8; SALT_LEN] = rand::rng().random();
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AuthError::Hashing(e.to_string()))?;
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

/// Check a plain password against a stored PHC hash. Malformed hashes never match.
#[must_use]
pub fn verify_password(plain: &str, hash: &str) -> bool {
    PasswordHash::new(hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok()
    })
}

// =============================================================================
// EMAIL HELPERS
// =============================================================================

/// Trim and lower-case an email, rejecting anything that is not `local@domain`.
#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_ascii_lowercase();
    let mut parts = normalized.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return None;
    };
    if local.is_empty() || domain.is_empty() {
        return None;
    }
    Some(normalized)
}

/// Gravatar identicon URL for an address.
#[must_use]
pub fn gravatar_url(email: &str) -> String {
    let digest = Sha256::digest(email.trim().to_ascii_lowercase().as_bytes());
    format!("https://www.gravatar.com/avatar/{}?d=identicon", bytes_to_hex(&digest))
}

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

fn generate_jti() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes_to_hex(&bytes)
}

// =============================================================================
// TOKENS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenScope {
    AccessToken,
    RefreshToken,
    EmailToken,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub scope: TokenScope,
    pub jti: String,
}

/// Signs and validates every token kind with the configured secret.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    #[must_use]
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    /// Mint an access token. `ttl` overrides the configured lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Signing`] if encoding fails.
    pub fn create_access_token(&self, email: &str, ttl: Option<Duration>) -> Result<String, AuthError> {
        self.issue(email, TokenScope::AccessToken, OffsetDateTime::now_utc(), ttl.unwrap_or(self.access_ttl))
    }

    /// Mint a refresh token. `ttl` overrides the configured lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Signing`] if encoding fails.
    pub fn create_refresh_token(&self, email: &str, ttl: Option<Duration>) -> Result<String, AuthError> {
        self.issue(email, TokenScope::RefreshToken, OffsetDateTime::now_utc(), ttl.unwrap_or(self.refresh_ttl))
    }

    /// Mint the token embedded in confirmation links.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Signing`] if encoding fails.
    pub fn create_email_token(&self, email: &str) -> Result<String, AuthError> {
        self.issue(email, TokenScope::EmailToken, OffsetDateTime::now_utc(), EMAIL_TOKEN_TTL)
    }

    /// Validate an access token and return its subject email.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidToken`] for bad signature, expiry, or a non-access scope.
    pub fn decode_access_token(&self, token: &str) -> Result<String, AuthError> {
        let claims = self.decode(token)?;
        if claims.scope != TokenScope::AccessToken {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims.sub)
    }

    /// Validate a refresh token and return its subject email.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidScope`] when a valid token of another kind is
    /// presented, [`AuthError::InvalidToken`] otherwise.
    pub fn decode_refresh_token(&self, token: &str) -> Result<String, AuthError> {
        let claims = self.decode(token)?;
        if claims.scope != TokenScope::RefreshToken {
            return Err(AuthError::InvalidScope);
        }
        Ok(claims.sub)
    }

    /// Extract the email from a confirmation-link token.
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::decode_refresh_token`].
    pub fn email_from_token(&self, token: &str) -> Result<String, AuthError> {
        let claims = self.decode(token)?;
        if claims.scope != TokenScope::EmailToken {
            return Err(AuthError::InvalidScope);
        }
        Ok(claims.sub)
    }

    fn issue(&self, email: &str, scope: TokenScope, now: OffsetDateTime, ttl: Duration) -> Result<String, AuthError> {
        let claims = Claims {
            sub: email.to_owned(),
            iat: now.unix_timestamp(),
            exp: (now + ttl).unix_timestamp(),
            scope,
            jti: generate_jti(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidToken)
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
