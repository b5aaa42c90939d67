use axum::extract::State;
use axum_extra::extract::{Multipart, WithRejection};
use serde::Deserialize;

use crate::api::extract::{Json, Path, Query};
use crate::api::middleware::{AuthUser, MaybeAuthUser};
use crate::api::state::AppState;
use crate::db::models::{MaterialChanges, NewMaterial, CATEGORIES};
use crate::db::{MaterialRepository, MaterialView};
use crate::error::AppError;
use crate::storage::AssetStore;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
}

struct UploadedFile {
    file_name: Option<String>,
    bytes: Vec<u8>,
}

/// The multipart body shared by create and update.
#[derive(Default)]
struct MaterialForm {
    title: Option<String>,
    description: Option<String>,
    category: Option<String>,
    tags: Option<String>,
    file: Option<UploadedFile>,
    cover: Option<UploadedFile>,
}

impl MaterialForm {
    async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = MaterialForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or("").to_string();

            match name.as_str() {
                "title" => form.title = Some(field.text().await?.trim().to_string()),
                "description" => form.description = Some(field.text().await?),
                "category" => form.category = Some(field.text().await?.trim().to_string()),
                "tags" => form.tags = Some(field.text().await?.trim().to_string()),
                "file" | "cover" => {
                    let file_name = field.file_name().map(str::to_string);
                    let bytes = field.bytes().await?.to_vec();
                    // An empty part means "no file attached"
                    if bytes.is_empty() {
                        continue;
                    }
                    let upload = UploadedFile { file_name, bytes };
                    if name == "file" {
                        form.file = Some(upload);
                    } else {
                        form.cover = Some(upload);
                    }
                }
                other => tracing::debug!("Ignoring unknown multipart field '{}'", other),
            }
        }

        if matches!(form.title.as_deref(), Some("")) {
            return Err(AppError::Validation("Title must not be empty".to_string()));
        }

        Ok(form)
    }
}

/// Files written during a request, removed again if the request fails.
struct StoredAssets<'a> {
    store: &'a AssetStore,
    paths: Vec<String>,
}

impl<'a> StoredAssets<'a> {
    fn new(store: &'a AssetStore) -> Self {
        Self { store, paths: Vec::new() }
    }

    async fn store(&mut self, upload: Option<UploadedFile>) -> Result<Option<String>, AppError> {
        let Some(upload) = upload else {
            return Ok(None);
        };
        let path = self.store.store(upload.file_name.as_deref(), &upload.bytes).await?;
        self.paths.push(path.clone());
        Ok(Some(path))
    }

    /// Stores the file and cover parts; on failure nothing written here survives.
    async fn store_pair(
        &mut self,
        file: Option<UploadedFile>,
        cover: Option<UploadedFile>,
    ) -> Result<(Option<String>, Option<String>), AppError> {
        let stored = match self.store(file).await {
            Ok(file_path) => self.store(cover).await.map(|cover| (file_path, cover)),
            Err(e) => Err(e),
        };
        if stored.is_err() {
            for path in self.paths.drain(..) {
                self.store.remove(&path).await;
            }
        }
        stored
    }

    async fn rollback(self) {
        for path in &self.paths {
            self.store.remove(path).await;
        }
    }
}

async fn fetch_view(
    state: &AppState,
    id: i64,
    requester: Option<i64>,
) -> Result<MaterialView, AppError> {
    MaterialRepository::get_by_id(&state.db, id, requester)
        .await?
        .ok_or_else(|| AppError::NotFound("Material not found".to_string()))
}

/// POST /materials (requires auth, multipart)
pub async fn create(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    WithRejection(multipart, _): WithRejection<Multipart, AppError>,
) -> Result<Json<MaterialView>, AppError> {
    let form = MaterialForm::read(multipart).await?;

    let title = form
        .title
        .ok_or_else(|| AppError::Validation("Title is required".to_string()))?;
    if form.file.is_none() {
        return Err(AppError::Validation("A file is required".to_string()));
    }

    let mut stored = StoredAssets::new(&state.assets);
    let (file_path, cover) = stored.store_pair(form.file, form.cover).await?;
    let Some(file_path) = file_path else {
        stored.rollback().await;
        return Err(AppError::Validation("A file is required".to_string()));
    };

    let material = NewMaterial {
        title,
        description: form.description.unwrap_or_default(),
        category: form.category.unwrap_or_default(),
        tags: form.tags.unwrap_or_default(),
        file_path,
        cover,
    };

    let id = match MaterialRepository::create(&state.db, identity.user_id, material).await {
        Ok(id) => id,
        Err(e) => {
            stored.rollback().await;
            return Err(e);
        }
    };

    tracing::info!("📄 User {} uploaded material {}", identity.user_id, id);
    Ok(Json(fetch_view(&state, id, Some(identity.user_id)).await?))
}

/// PUT /materials/{id} (requires auth, owner only, multipart)
///
/// Field changes and replacement assets land in one statement. Files
/// replaced by the update are deleted afterwards.
pub async fn update(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<i64>,
    WithRejection(multipart, _): WithRejection<Multipart, AppError>,
) -> Result<Json<MaterialView>, AppError> {
    let form = MaterialForm::read(multipart).await?;

    let mut stored = StoredAssets::new(&state.assets);
    let (file_path, cover) = stored.store_pair(form.file, form.cover).await?;

    let changes = MaterialChanges {
        title: form.title,
        description: form.description,
        category: form.category,
        tags: form.tags,
        file_path: file_path.clone(),
        cover: cover.clone(),
    };

    let previous = match MaterialRepository::update(&state.db, id, identity.user_id, changes).await {
        Ok(previous) => previous,
        Err(e) => {
            stored.rollback().await;
            return Err(e);
        }
    };

    if file_path.is_some() {
        state.assets.remove(&previous.file_path).await;
    }
    if let (Some(_), Some(old_cover)) = (&cover, &previous.cover) {
        state.assets.remove(old_cover).await;
    }

    tracing::info!("✏️ User {} updated material {}", identity.user_id, id);
    Ok(Json(fetch_view(&state, id, Some(identity.user_id)).await?))
}

/// DELETE /materials/{id} (requires auth, owner only)
pub async fn delete(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let assets = MaterialRepository::delete(&state.db, id, identity.user_id).await?;
    state.assets.remove_all(std::slice::from_ref(&assets)).await;

    tracing::info!("🗑️ User {} deleted material {}", identity.user_id, id);
    Ok(Json(serde_json::json!({"message": "Material deleted"})))
}

/// GET /materials
pub async fn list(
    State(state): State<AppState>,
    requester: MaybeAuthUser,
) -> Result<Json<Vec<MaterialView>>, AppError> {
    let materials = MaterialRepository::list(&state.db, requester.user_id()).await?;
    Ok(Json(materials))
}

/// GET /materials/{id}
pub async fn get(
    State(state): State<AppState>,
    requester: MaybeAuthUser,
    Path(id): Path<i64>,
) -> Result<Json<MaterialView>, AppError> {
    Ok(Json(fetch_view(&state, id, requester.user_id()).await?))
}

/// GET /my-materials (requires auth)
pub async fn mine(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<Vec<MaterialView>>, AppError> {
    let materials = MaterialRepository::list_by_owner(&state.db, identity.user_id).await?;
    Ok(Json(materials))
}

/// GET /materials/search?query=
pub async fn search(
    State(state): State<AppState>,
    requester: MaybeAuthUser,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<MaterialView>>, AppError> {
    let query = params
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| AppError::Validation("Search term is required".to_string()))?;

    let materials = MaterialRepository::search(&state.db, query, requester.user_id()).await?;
    Ok(Json(materials))
}

/// GET /materials/category/{category}
pub async fn by_category(
    State(state): State<AppState>,
    requester: MaybeAuthUser,
    Path(category): Path<String>,
) -> Result<Json<Vec<MaterialView>>, AppError> {
    let materials =
        MaterialRepository::by_category(&state.db, &category, requester.user_id()).await?;
    Ok(Json(materials))
}

/// GET /materials/tag/{tag}
pub async fn by_tag(
    State(state): State<AppState>,
    requester: MaybeAuthUser,
    Path(tag): Path<String>,
) -> Result<Json<Vec<MaterialView>>, AppError> {
    let tag = tag.trim();
    if tag.is_empty() {
        return Err(AppError::Validation("Tag is required".to_string()));
    }

    let materials = MaterialRepository::by_tag(&state.db, tag, requester.user_id()).await?;
    Ok(Json(materials))
}

/// GET /categories
pub async fn categories() -> Json<&'static [&'static str]> {
    Json(CATEGORIES)
}
