//! Signed bearer tokens.
//!
//! Tokens are HS256 JWTs carrying the user's id and email. They are
//! stateless: nothing is stored server-side, and a token stays valid until
//! its `exp` claim passes.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// The claims we put into, and expect back from, every token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// The user's database id.
    pub id: i64,
    pub email: String,
    pub iat: usize,
    pub exp: usize,
}

/// The identity a verified token resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub email: String,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Identity {
            user_id: claims.id,
            email: claims.email,
        }
    }
}

#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiry_secs: i64,
}

impl TokenKeys {
    pub fn new(secret: &str, expiry_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expiry_secs: expiry_hours * 3600,
        }
    }

    pub fn issue(&self, user_id: i64, email: &str) -> Result<String, AppError> {
        let now = chrono::Utc::now().timestamp();
        self.issue_at(user_id, email, now)
    }

    fn issue_at(&self, user_id: i64, email: &str, now: i64) -> Result<String, AppError> {
        let claims = Claims {
            id: user_id,
            email: email.to_string(),
            iat: now.max(0) as usize,
            exp: (now + self.expiry_secs).max(0) as usize,
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Token signing failed: {}", e)))
    }

    /// Validates signature and expiry; any failure is `InvalidToken`.
    pub fn verify(&self, token: &str) -> Result<Identity, AppError> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            tracing::debug!("Token rejected: {}", e);
            AppError::InvalidToken
        })?;

        Ok(data.claims.into())
    }
}
