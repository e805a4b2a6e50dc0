use crate::auth::{JwtConfig, SignedToken, TokenProvider};
use crate::domain::{DomainError, DomainResult};
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

/// JWT claims for device credentials
#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceClaims {
    pub iat: usize, // issued at timestamp
    pub exp: usize, // expiration timestamp
    pub aud: String,
}

/// RS256 implementation of TokenProvider backed by a PEM key file.
///
/// The key is read at issue time so key rotation on disk takes effect at the
/// next renewal cycle without a restart.
pub struct JwtTokenProvider {
    config: JwtConfig,
}

impl JwtTokenProvider {
    pub fn new(config: JwtConfig) -> Self {
        Self { config }
    }
}

impl TokenProvider for JwtTokenProvider {
    fn issue_token(&self, now: DateTime<Utc>) -> DomainResult<SignedToken> {
        let key_pem = std::fs::read(&self.config.private_key_path).map_err(|e| {
            DomainError::KeyUnavailable(format!("{}: {}", self.config.private_key_path, e))
        })?;
        let encoding_key = EncodingKey::from_rsa_pem(&key_pem)
            .map_err(|e| DomainError::SigningFailure(format!("invalid RSA key material: {}", e)))?;

        let expires_at = now + self.config.token_lifetime();
        let claims = DeviceClaims {
            iat: now.timestamp() as usize,
            exp: expires_at.timestamp() as usize,
            aud: self.config.audience.clone(),
        };

        let jwt = encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
            .map_err(|e| DomainError::SigningFailure(e.to_string()))?;

        Ok(SignedToken {
            issued_at: now,
            expires_at,
            audience: self.config.audience.clone(),
            jwt,
        })
    }
}
