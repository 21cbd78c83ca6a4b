use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Identity;

/// Identity-token claims model.
///
/// The minimal set of claims expected once a token issued by the identity
/// provider has been decoded and its signature verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Subject identifier at the identity provider.
    pub sub: String,

    /// Primary e-mail; ownership checks compare against this.
    pub email: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Raw group memberships.
    #[serde(default)]
    pub groups: Vec<String>,

    /// Issued-at (unix seconds).
    pub iat: i64,

    /// Expiration (unix seconds).
    pub exp: i64,
}

impl IdentityClaims {
    pub fn into_identity(self) -> Identity {
        Identity {
            email: self.email,
            display_name: self.name,
            groups: self.groups,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("token carries no e-mail")]
    MissingEmail,

    #[error("malformed or unverifiable token")]
    Malformed,
}

/// Deterministically validate identity claims.
///
/// Validates the *claims* only; signature verification happens in
/// [`TokenVerifier`] implementations.
pub fn validate_claims(claims: &IdentityClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    let now = now.timestamp();
    if now < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    if claims.email.trim().is_empty() || !claims.email.contains('@') {
        return Err(TokenValidationError::MissingEmail);
    }
    Ok(())
}

/// Verifies a bearer token and yields the identity it asserts.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Identity, TokenValidationError>;
}

/// HS256 shared-secret verifier.
pub struct Hs256TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256TokenVerifier {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Time checks are done by `validate_claims` against the caller's clock.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl TokenVerifier for Hs256TokenVerifier {
    fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Identity, TokenValidationError> {
        let data = jsonwebtoken::decode::<IdentityClaims>(token, &self.key, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "token rejected");
                TokenValidationError::Malformed
            })?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims.into_identity())
    }
}
