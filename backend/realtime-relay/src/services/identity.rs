use async_trait::async_trait;
use crypto_core::JwtKeys;

use crate::error::{AppError, AppResult};
use crate::models::UserId;

/// Resolves the credential presented at connect time to a user id.
///
/// Any failure (missing, malformed, expired, wrong signature) is reported as
/// `AppError::Unauthorized`; callers never see why.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> AppResult<UserId>;
}

/// Verifies HS256 access tokens issued by the auth API
#[derive(Debug, Clone)]
pub struct JwtIdentityVerifier {
    keys: JwtKeys,
}

impl JwtIdentityVerifier {
    pub fn new(keys: JwtKeys) -> Self {
        Self { keys }
    }

    pub fn from_secret(secret: &str) -> AppResult<Self> {
        let keys = JwtKeys::from_secret(secret)
            .map_err(|e| AppError::Config(format!("JWT_SECRET: {e}")))?;
        Ok(Self::new(keys))
    }
}

#[async_trait]
impl IdentityVerifier for JwtIdentityVerifier {
    async fn verify(&self, credential: &str) -> AppResult<UserId> {
        let token = credential.trim();
        if token.is_empty() {
            return Err(AppError::Unauthorized);
        }

        self.keys
            .user_id_from_token(token)
            .map(UserId::new)
            .map_err(|e| {
                tracing::debug!(error = %e, "credential rejected");
                AppError::Unauthorized
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_valid_token_resolves_user() {
        let keys = JwtKeys::from_secret("secret").unwrap();
        let token = keys.issue_token("user-1").unwrap();
        let verifier = JwtIdentityVerifier::new(keys);

        assert_eq!(verifier.verify(&token).await.unwrap(), UserId::from("user-1"));
    }

    #[tokio::test]
    async fn test_blank_and_bad_tokens_unauthorized() {
        let verifier = JwtIdentityVerifier::from_secret("secret").unwrap();

        assert!(matches!(
            verifier.verify("   ").await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            verifier.verify("not-a-jwt").await,
            Err(AppError::Unauthorized)
        ));
    }
}
