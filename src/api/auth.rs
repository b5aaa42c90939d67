use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::api::extract::Json;
use crate::api::middleware::AuthUser;
use crate::api::state::AppState;
use crate::crypto::{hash_password, verify_password};
use crate::db::{User, UserRepository};
use crate::error::AppError;

#[derive(Debug, Deserialize, Serialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

fn validate_name(name: &str) -> Result<String, AppError> {
    let trimmed = name.trim();

    if trimmed.is_empty() || trimmed.chars().count() > 100 {
        return Err(AppError::Validation("Name must be 1-100 characters".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Trim and lower-case; emails are unique case-insensitively.
fn validate_email(email: &str) -> Result<String, AppError> {
    let trimmed = email.trim();

    let valid = match trimmed.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@') && trimmed.len() <= 254
        }
        None => false,
    };
    if !valid || trimmed.chars().any(char::is_whitespace) {
        return Err(AppError::Validation("A valid email is required".to_string()));
    }

    Ok(trimmed.to_lowercase())
}

/// POST /register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let name = validate_name(&req.name)?;
    let email = validate_email(&req.email)?;

    if req.password.is_empty() {
        return Err(AppError::Validation("Password is required".to_string()));
    }

    let password_hash = hash_password(&req.password)?;
    let user = UserRepository::create(&state.db, &name, &email, &password_hash).await?;
    let token = state.tokens.issue(user.id, &user.email)?;

    tracing::info!("👤 Registered user {}", user.id);
    Ok(Json(AuthResponse { token, user }))
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || req.password.is_empty() {
        return Err(AppError::Validation("Email and password are required".to_string()));
    }

    let user = UserRepository::get_by_email(&state.db, &email)
        .await?
        .ok_or(AppError::UnknownEmail)?;

    if !verify_password(&req.password, &user.password_hash)? {
        tracing::debug!("Rejected login for user {}", user.id);
        return Err(AppError::InvalidCredentials);
    }

    let token = state.tokens.issue(user.id, &user.email)?;
    Ok(Json(AuthResponse { token, user }))
}

/// GET /profile (requires auth)
pub async fn profile(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<User>, AppError> {
    let user = UserRepository::get_by_id(&state.db, identity.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

/// PUT /users (requires auth). Omitted fields keep their value.
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    let current = UserRepository::get_by_id(&state.db, identity.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let name = match req.name {
        Some(name) => validate_name(&name)?,
        None => current.name,
    };
    let email = match req.email {
        Some(email) => validate_email(&email)?,
        None => current.email,
    };

    let user = UserRepository::update_profile(&state.db, identity.user_id, &name, &email).await?;
    Ok(Json(user))
}

/// DELETE /users (requires auth)
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let assets = UserRepository::delete(&state.db, identity.user_id).await?;
    state.assets.remove_all(&assets).await;

    tracing::info!("👋 Deleted user {} and {} material(s)", identity.user_id, assets.len());
    Ok(Json(serde_json::json!({"message": "User deleted"})))
}
