use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::api::state::AppState;
use crate::crypto::Identity;
use crate::error::AppError;

/// Pull the token out of `Authorization`. Both `Bearer <token>` and a bare
/// token are accepted. `Ok(None)` means no credentials were sent.
fn bearer_token(parts: &Parts) -> Result<Option<&str>, AppError> {
    let Some(value) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };

    let value = value
        .to_str()
        .map_err(|_| AppError::InvalidToken)?
        .trim();

    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    if token.is_empty() {
        return Ok(None);
    }

    Ok(Some(token))
}

/// Required identity for protected routes.
///
/// Missing credentials reject with `Unauthorized`; a bad, tampered or
/// expired token rejects with `InvalidToken`. Both are 401.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

        let identity = state.tokens.verify(token)?;
        tracing::debug!("🔑 Authenticated user {}", identity.user_id);

        Ok(AuthUser(identity))
    }
}

/// Optional identity for public routes. It only enriches responses (the
/// favorite marker), so an unusable token degrades to anonymous.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<Identity>);

impl MaybeAuthUser {
    pub fn user_id(&self) -> Option<i64> {
        self.0.as_ref().map(|identity| identity.user_id)
    }
}

impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let identity = match bearer_token(parts) {
            Ok(Some(token)) => match state.tokens.verify(token) {
                Ok(identity) => Some(identity),
                Err(_) => {
                    tracing::warn!("Ignoring invalid token on public route {}", parts.uri.path());
                    None
                }
            },
            Ok(None) => None,
            Err(_) => {
                tracing::warn!("Ignoring unreadable Authorization header on {}", parts.uri.path());
                None
            }
        };

        Ok(MaybeAuthUser(identity))
    }
}
