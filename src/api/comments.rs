use axum::{extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

use crate::api::extract::{Json, Path};
use crate::api::middleware::AuthUser;
use crate::api::state::AppState;
use crate::db::{CommentRepository, CommentView};
use crate::error::AppError;

const MAX_COMMENT_CHARS: usize = 2000;

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateCommentRequest {
    pub material_id: Option<i64>,
    pub content: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UpdateCommentRequest {
    pub content: Option<String>,
}

fn validate_content(content: Option<&str>) -> Result<&str, AppError> {
    let content = content.map(str::trim).unwrap_or_default();

    if content.is_empty() {
        return Err(AppError::Validation("Comment content must not be empty".to_string()));
    }
    if content.chars().count() > MAX_COMMENT_CHARS {
        return Err(AppError::Validation(format!(
            "Comment must be at most {} characters",
            MAX_COMMENT_CHARS
        )));
    }

    Ok(content)
}

/// POST /comments (requires auth)
pub async fn create(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Json(req): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<CommentView>), AppError> {
    let material_id = req
        .material_id
        .ok_or_else(|| AppError::Validation("material_id is required".to_string()))?;
    let content = validate_content(req.content.as_deref())?;

    let comment = CommentRepository::create(&state.db, material_id, identity.user_id, content).await?;

    Ok((StatusCode::CREATED, Json(comment)))
}

/// GET /comments/{material_id}
pub async fn list(
    State(state): State<AppState>,
    Path(material_id): Path<i64>,
) -> Result<Json<Vec<CommentView>>, AppError> {
    let comments = CommentRepository::list_for_material(&state.db, material_id).await?;
    Ok(Json(comments))
}

/// PUT /comments/{id} (requires auth, author only)
pub async fn update(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateCommentRequest>,
) -> Result<Json<CommentView>, AppError> {
    let content = validate_content(req.content.as_deref())?;

    let comment = CommentRepository::update(&state.db, id, identity.user_id, content).await?;
    Ok(Json(comment))
}

/// DELETE /comments/{id} (requires auth, author only)
pub async fn delete(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    CommentRepository::delete(&state.db, id, identity.user_id).await?;
    Ok(Json(serde_json::json!({"message": "Comment deleted"})))
}
