use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::api::extract::{Json, Path};
use crate::api::middleware::AuthUser;
use crate::api::state::AppState;
use crate::db::{Favorite, FavoriteRepository, MaterialView};
use crate::error::AppError;

#[derive(Debug, Deserialize, Serialize)]
pub struct AddFavoriteRequest {
    pub material_id: Option<i64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AddFavoriteResponse {
    pub message: String,
    pub favorite: Favorite,
}

/// POST /favorites (requires auth)
pub async fn add(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Json(req): Json<AddFavoriteRequest>,
) -> Result<Json<AddFavoriteResponse>, AppError> {
    let material_id = req
        .material_id
        .ok_or_else(|| AppError::Validation("material_id is required".to_string()))?;

    let favorite = FavoriteRepository::create(&state.db, identity.user_id, material_id).await?;

    Ok(Json(AddFavoriteResponse {
        message: "Material added to favorites".to_string(),
        favorite,
    }))
}

/// DELETE /favorites/{material_id} (requires auth)
pub async fn remove(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(material_id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    FavoriteRepository::delete(&state.db, identity.user_id, material_id).await?;
    Ok(Json(serde_json::json!({"message": "Material removed from favorites"})))
}

/// GET /favorites (requires auth)
pub async fn list(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<Vec<MaterialView>>, AppError> {
    let materials = FavoriteRepository::list(&state.db, identity.user_id).await?;
    Ok(Json(materials))
}
