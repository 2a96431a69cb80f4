//! Bearer token authentication for hub connections
//!
//! Tokens have the form `<user_id>.<hex hmac-sha256(secret, user_id)>`.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Malformed token")]
    MalformedToken,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Failed to create HMAC: {0}")]
    Hmac(String),
}

/// Resolves a bearer credential to a user id
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<String, AuthError>;
}

fn mac_for(secret: &[u8], user_id: &str) -> Result<HmacSha256, AuthError> {
    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|e| AuthError::Hmac(e.to_string()))?;
    mac.update(user_id.as_bytes());
    Ok(mac)
}

/// Issue a token for `user_id`
pub fn sign_token(secret: &[u8], user_id: &str) -> Result<String, AuthError> {
    let signature = mac_for(secret, user_id)?.finalize().into_bytes();
    Ok(format!("{}.{}", user_id, hex::encode(signature)))
}

/// HMAC-SHA256 token validator
#[derive(Clone)]
pub struct HmacAuthenticator {
    secret: Vec<u8>,
}

impl HmacAuthenticator {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn verify(&self, token: &str) -> Result<String, AuthError> {
        let (user_id, signature) = token
            .trim()
            .rsplit_once('.')
            .ok_or(AuthError::MalformedToken)?;
        if user_id.is_empty() {
            return Err(AuthError::MalformedToken);
        }
        let signature = hex::decode(signature).map_err(|_| AuthError::MalformedToken)?;

        mac_for(&self.secret, user_id)?
            .verify_slice(&signature)
            .map_err(|_| AuthError::InvalidSignature)?;

        Ok(user_id.to_string())
    }
}

#[async_trait]
impl Authenticator for HmacAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<String, AuthError> {
        self.verify(token)
    }
}

impl std::fmt::Debug for HmacAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacAuthenticator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret";

    #[tokio::test]
    async fn test_valid_token() {
        let auth = HmacAuthenticator::new(SECRET);
        let token = sign_token(SECRET, "user-42").unwrap();
        assert_eq!(auth.authenticate(&token).await.unwrap(), "user-42");
    }

    #[tokio::test]
    async fn test_user_id_with_dots() {
        let auth = HmacAuthenticator::new(SECRET);
        let token = sign_token(SECRET, "jane.doe").unwrap();
        assert_eq!(auth.authenticate(&token).await.unwrap(), "jane.doe");
    }

    #[tokio::test]
    async fn test_wrong_secret_is_rejected() {
        let auth = HmacAuthenticator::new(SECRET);
        let token = sign_token(b"other", "user-42").unwrap();
        assert!(matches!(
            auth.authenticate(&token).await,
            Err(AuthError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn test_tampered_user_is_rejected() {
        let auth = HmacAuthenticator::new(SECRET);
        let token = sign_token(SECRET, "user-42").unwrap();
        let forged = token.replacen("user-42", "user-43", 1);
        assert!(matches!(
            auth.authenticate(&forged).await,
            Err(AuthError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn test_malformed_tokens() {
        let auth = HmacAuthenticator::new(SECRET);
        for token in ["", "no-signature", ".abcdef", "user.not-hex"] {
            assert!(
                matches!(auth.authenticate(token).await, Err(AuthError::MalformedToken)),
                "{:?} should be malformed",
                token
            );
        }
    }
}
