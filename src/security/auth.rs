use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Claims carried by a token that passed verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ValidatedClaims {
    pub fn subject(&self) -> &str {
        self.sub.as_deref().unwrap_or("")
    }
}

/// Why a credential was refused. Deliberately coarse: presence vs. rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    #[error("token missing")]
    MissingToken,
    #[error("invalid token")]
    InvalidToken,
}

/// Verifies raw `Authorization` values (no `Bearer ` prefix) against the shared
/// HMAC secret.
#[derive(Clone)]
pub struct TokenValidator {
    key: DecodingKey,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        // exp and nbf are checked when present but not demanded
        validation.required_spec_claims.clear();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.leeway = 0;

        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn validate(&self, credential: Option<&str>) -> Result<ValidatedClaims, AuthFailure> {
        let token = match credential.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return Err(AuthFailure::MissingToken),
        };

        let claims = decode::<ValidatedClaims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "token rejected");
                AuthFailure::InvalidToken
            })?;

        // a token is already dead in the second its exp names
        let now = Utc::now().timestamp().max(0) as u64;
        if claims.exp.is_some_and(|exp| exp <= now) {
            debug!("token rejected: expired");
            return Err(AuthFailure::InvalidToken);
        }
        Ok(claims)
    }
}

impl fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenValidator")
            .field("algorithms", &self.validation.algorithms)
            .finish_non_exhaustive()
    }
}

/// Mint an HS256 token for `subject` valid for `ttl`.
pub fn issue_token(secret: &[u8], subject: &str, ttl: Duration) -> Result<String> {
    let now = Utc::now().timestamp().max(0) as u64;
    let claims = ValidatedClaims {
        sub: Some(subject.to_string()),
        exp: Some(now + ttl.as_secs()),
        iat: Some(now),
        extra: Map::new(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret)).context("encoding token")
}
