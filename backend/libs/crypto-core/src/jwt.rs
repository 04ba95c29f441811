//! Shared JWT module for Flatmate services
//!
//! Tokens are HS256-signed with a secret shared between the auth API (which
//! issues them at login) and every service that validates them.
//!
//! ## Usage
//!
//! ```rust
//! use crypto_core::jwt::JwtKeys;
//!
//! let keys = JwtKeys::from_secret("change-me").unwrap();
//! let token = keys.issue_token("user-1").unwrap();
//! let claims = keys.validate_token(&token).unwrap().claims;
//! assert_eq!(claims.user_id, "user-1");
//! ```

use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

const TOKEN_EXPIRY_DAYS: i64 = 1;

const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

// ============================================================================
// Data Structures
// ============================================================================

/// JWT claims carried by Flatmate access tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Stable user identifier owned by the identity system
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

// ============================================================================
// Key Storage
// ============================================================================

/// Encoding/decoding key pair derived from a shared secret.
///
/// Keys are immutable once built. Services construct one instance at startup
/// and share it behind an `Arc`.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtKeys").finish_non_exhaustive()
    }
}

impl JwtKeys {
    /// Build keys from the shared HMAC secret.
    ///
    /// ## Errors
    ///
    /// Returns error if the secret is empty.
    pub fn from_secret(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(anyhow!("JWT secret must not be empty"));
        }

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        })
    }

    // ========================================================================
    // Token Generation
    // ========================================================================

    /// Issue a token for `user_id` with the default one-day lifetime.
    pub fn issue_token(&self, user_id: &str) -> Result<String> {
        self.issue_token_with_ttl(user_id, Duration::days(TOKEN_EXPIRY_DAYS))
    }

    /// Issue a token with an explicit lifetime. A negative `ttl` yields an
    /// already-expired token.
    pub fn issue_token_with_ttl(&self, user_id: &str, ttl: Duration) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            user_id: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        encode(&Header::new(JWT_ALGORITHM), &claims, &self.encoding)
            .map_err(|e| anyhow!("Failed to generate token: {e}"))
    }

    // ========================================================================
    // Token Validation
    // ========================================================================

    /// Validate and decode a token (without any "Bearer " prefix).
    ///
    /// ## Errors
    ///
    /// Returns error if:
    /// - Token signature is invalid
    /// - Token is expired
    /// - Token format is malformed or `userId` is missing/empty
    pub fn validate_token(&self, token: &str) -> Result<TokenData<Claims>> {
        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.validate_exp = true;

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            tracing::debug!(error = %e, "JWT validation failed");
            anyhow!("Token validation failed: {e}")
        })?;

        if data.claims.user_id.trim().is_empty() {
            tracing::debug!("JWT rejected: empty userId claim");
            return Err(anyhow!("Invalid token payload: empty userId"));
        }

        Ok(data)
    }

    /// Extract the user id from a validated token.
    pub fn user_id_from_token(&self, token: &str) -> Result<String> {
        self.validate_token(token).map(|data| data.claims.user_id)
    }
}

// ============================================================================
// Tests
// ============================================================================
