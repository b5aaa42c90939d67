use sqlx::{Pool, Sqlite};

use crate::db::models::{fold_case, MaterialAssets, MaterialChanges, MaterialView, NewMaterial};
use crate::db::{map_missing, now};
use crate::error::AppError;

/// Shared projection: material columns, creator name, and the requester's
/// favorite id. The single bind parameter is the requester id (NULL matches
/// no favorite).
const MATERIAL_VIEW: &str = r#"
SELECT m.id, m.user_id, m.title, m.description, m.cover, m.file_path,
       m.category, m.tags, m.created_at, m.updated_at,
       u.name AS creator_name, f.id AS favorite_id
FROM materials m
JOIN users u ON m.user_id = u.id
LEFT JOIN favorites f ON f.material_id = m.id AND f.user_id = ?
"#;

/// Attempts before an update that keeps losing the race on its asset
/// columns gives up.
const MAX_UPDATE_ATTEMPTS: usize = 5;

pub struct MaterialRepository;

impl MaterialRepository {
    /// Returns the new material's id. Fails with `NotFound` if the owner no
    /// longer exists.
    pub async fn create(
        pool: &Pool<Sqlite>,
        owner_id: i64,
        material: NewMaterial,
    ) -> Result<i64, AppError> {
        let result = sqlx::query(
            r#"
INSERT INTO materials (user_id, title, description, cover, file_path, category, tags, created_at)
VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(owner_id)
        .bind(&material.title)
        .bind(&material.description)
        .bind(&material.cover)
        .bind(&material.file_path)
        .bind(&material.category)
        .bind(&material.tags)
        .bind(now())
        .execute(pool)
        .await
        .map_err(|e| map_missing(e, "User not found"))?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_by_id(
        pool: &Pool<Sqlite>,
        id: i64,
        requester: Option<i64>,
    ) -> Result<Option<MaterialView>, AppError> {
        let sql = format!("{MATERIAL_VIEW} WHERE m.id = ?");
        let material = sqlx::query_as::<_, MaterialView>(&sql)
            .bind(requester)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(material)
    }

    /// Every material in insertion order. No pagination.
    pub async fn list(
        pool: &Pool<Sqlite>,
        requester: Option<i64>,
    ) -> Result<Vec<MaterialView>, AppError> {
        let sql = format!("{MATERIAL_VIEW} ORDER BY m.id");
        let materials = sqlx::query_as::<_, MaterialView>(&sql)
            .bind(requester)
            .fetch_all(pool)
            .await?;

        Ok(materials)
    }

    pub async fn list_by_owner(
        pool: &Pool<Sqlite>,
        owner_id: i64,
    ) -> Result<Vec<MaterialView>, AppError> {
        let sql = format!("{MATERIAL_VIEW} WHERE m.user_id = ? ORDER BY m.id");
        let materials = sqlx::query_as::<_, MaterialView>(&sql)
            .bind(owner_id)
            .bind(owner_id)
            .fetch_all(pool)
            .await?;

        Ok(materials)
    }

    /// Case-insensitive substring match on title or description. Case is
    /// folded with Unicode rules, so "álgebra" finds "ÁLGEBRA LINEAR".
    pub async fn search(
        pool: &Pool<Sqlite>,
        query: &str,
        requester: Option<i64>,
    ) -> Result<Vec<MaterialView>, AppError> {
        let needle = fold_case(query);
        let materials = Self::list(pool, requester)
            .await?
            .into_iter()
            .filter(|m| m.matches_text(&needle))
            .collect();

        Ok(materials)
    }

    /// Exact category match.
    pub async fn by_category(
        pool: &Pool<Sqlite>,
        category: &str,
        requester: Option<i64>,
    ) -> Result<Vec<MaterialView>, AppError> {
        let sql = format!("{MATERIAL_VIEW} WHERE m.category = ? ORDER BY m.id");
        let materials = sqlx::query_as::<_, MaterialView>(&sql)
            .bind(requester)
            .bind(category)
            .fetch_all(pool)
            .await?;

        Ok(materials)
    }

    /// Case-insensitive substring match against the raw tags field.
    pub async fn by_tag(
        pool: &Pool<Sqlite>,
        tag: &str,
        requester: Option<i64>,
    ) -> Result<Vec<MaterialView>, AppError> {
        let needle = fold_case(tag);
        let materials = Self::list(pool, requester)
            .await?
            .into_iter()
            .filter(|m| fold_case(&m.tags).contains(&needle))
            .collect();

        Ok(materials)
    }

    /// Current asset paths of a material `owner_id` owns; `NotFound` or
    /// `Forbidden` otherwise.
    async fn owned_assets(
        pool: &Pool<Sqlite>,
        id: i64,
        owner_id: i64,
        action: &str,
    ) -> Result<MaterialAssets, AppError> {
        let (user_id, file_path, cover) = sqlx::query_as::<_, (i64, String, Option<String>)>(
            "SELECT user_id, file_path, cover FROM materials WHERE id = ?"
        )
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Material not found".to_string()))?;

        if user_id != owner_id {
            return Err(AppError::Forbidden(format!(
                "You do not have permission to {} this material",
                action
            )));
        }

        Ok(MaterialAssets { file_path, cover })
    }

    /// Applies `changes` if `owner_id` owns the material. Returns the asset
    /// paths the row pointed at before the update.
    ///
    /// The write is a single conditional statement that only matches while
    /// the asset paths are still the ones read, so the returned paths are
    /// exactly the ones this update replaced.
    pub async fn update(
        pool: &Pool<Sqlite>,
        id: i64,
        owner_id: i64,
        changes: MaterialChanges,
    ) -> Result<MaterialAssets, AppError> {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let previous = Self::owned_assets(pool, id, owner_id, "edit").await?;

            let result = sqlx::query(
                r#"
UPDATE materials SET
    title = COALESCE(?, title),
    description = COALESCE(?, description),
    category = COALESCE(?, category),
    tags = COALESCE(?, tags),
    file_path = COALESCE(?, file_path),
    cover = COALESCE(?, cover),
    updated_at = ?
WHERE id = ? AND user_id = ? AND file_path = ? AND cover IS ?
                "#,
            )
            .bind(changes.title.as_deref())
            .bind(changes.description.as_deref())
            .bind(changes.category.as_deref())
            .bind(changes.tags.as_deref())
            .bind(changes.file_path.as_deref())
            .bind(changes.cover.as_deref())
            .bind(now())
            .bind(id)
            .bind(owner_id)
            .bind(&previous.file_path)
            .bind(&previous.cover)
            .execute(pool)
            .await?;

            if result.rows_affected() == 1 {
                return Ok(previous);
            }
            tracing::debug!("Material {} changed during update, retrying", id);
        }

        Err(AppError::Internal(format!(
            "Material {} kept changing during update",
            id
        )))
    }

    /// Deletes the material (favorites and comments cascade) if `owner_id`
    /// owns it. Returns its asset paths.
    pub async fn delete(
        pool: &Pool<Sqlite>,
        id: i64,
        owner_id: i64,
    ) -> Result<MaterialAssets, AppError> {
        let deleted = sqlx::query_as::<_, MaterialAssets>(
            "DELETE FROM materials WHERE id = ? AND user_id = ? RETURNING file_path, cover"
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?;

        let Some(assets) = deleted else {
            // Nothing matched: the row is gone or belongs to someone else
            Self::owned_assets(pool, id, owner_id, "delete").await?;
            return Err(AppError::NotFound("Material not found".to_string()));
        };

        Ok(assets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support;
    use crate::db::{CommentRepository, FavoriteRepository};

    #[tokio::test]
    async fn test_create_and_get_includes_creator() {
        let pool = test_support::pool().await;
        let ana = test_support::user(&pool, "Ana").await;
        let id = test_support::material(&pool, ana.id, "Calculus I").await;

        let material = MaterialRepository::get_by_id(&pool, id, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(material.title, "Calculus I");
        assert_eq!(material.creator_name, "Ana");
        assert_eq!(material.user_id, ana.id);
        assert_eq!(material.cover, None);
        assert_eq!(material.updated_at, None);
        assert_eq!(material.favorite_id, None);
    }

    #[tokio::test]
    async fn test_create_for_missing_owner_is_not_found() {
        let pool = test_support::pool().await;
        let err = MaterialRepository::create(
            &pool,
            404,
            NewMaterial {
                title: "Orphan".into(),
                description: String::new(),
                category: String::new(),
                tags: String::new(),
                file_path: "/uploads/x.pdf".into(),
                cover: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_non_owner_cannot_update_or_delete() {
        let pool = test_support::pool().await;
        let ana = test_support::user(&pool, "Ana").await;
        let bia = test_support::user(&pool, "Bia").await;
        let id = test_support::material(&pool, ana.id, "Calculus I").await;

        let changes = MaterialChanges {
            title: Some("Hijacked".into()),
            ..Default::default()
        };
        let err = MaterialRepository::update(&pool, id, bia.id, changes)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = MaterialRepository::delete(&pool, id, bia.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let material = MaterialRepository::get_by_id(&pool, id, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(material.title, "Calculus I");
        assert_eq!(material.updated_at, None);
    }

    #[tokio::test]
    async fn test_missing_material_is_not_found() {
        let pool = test_support::pool().await;
        let ana = test_support::user(&pool, "Ana").await;

        let err = MaterialRepository::update(&pool, 77, ana.id, MaterialChanges::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = MaterialRepository::delete(&pool, 77, ana.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_owner_partial_update() {
        let pool = test_support::pool().await;
        let ana = test_support::user(&pool, "Ana").await;
        let id = test_support::material(&pool, ana.id, "Calculus I").await;

        let previous = MaterialRepository::update(
            &pool,
            id,
            ana.id,
            MaterialChanges {
                title: Some("Calculus II".into()),
                cover: Some("/uploads/cover.png".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(previous.file_path, "/uploads/Calculus_I.pdf");
        assert_eq!(previous.cover, None);

        let material = MaterialRepository::get_by_id(&pool, id, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(material.title, "Calculus II");
        assert_eq!(material.description, "About Calculus I");
        assert_eq!(material.file_path, "/uploads/Calculus_I.pdf");
        assert_eq!(material.cover.as_deref(), Some("/uploads/cover.png"));
        assert!(material.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_delete_cascades_favorites_and_comments() {
        let pool = test_support::pool().await;
        let ana = test_support::user(&pool, "Ana").await;
        let bia = test_support::user(&pool, "Bia").await;
        let id = test_support::material(&pool, ana.id, "Calculus I").await;

        FavoriteRepository::create(&pool, bia.id, id).await.unwrap();
        CommentRepository::create(&pool, id, bia.id, "nice").await.unwrap();

        MaterialRepository::delete(&pool, id, ana.id).await.unwrap();

        assert!(FavoriteRepository::list(&pool, bia.id).await.unwrap().is_empty());
        assert!(CommentRepository::list_for_material(&pool, id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_search_recall_and_precision() {
        let pool = test_support::pool().await;
        let ana = test_support::user(&pool, "Ana").await;
        let titles = ["Calculus I", "Linear Algebra", "Advanced CALCULUS", "Organic Chemistry"];
        let mut ids = Vec::new();
        for title in titles {
            ids.push(test_support::material(&pool, ana.id, title).await);
        }

        let found: Vec<i64> = MaterialRepository::search(&pool, "calculus", None)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(found, vec![ids[0], ids[2]]);

        // Descriptions are "About <title>"
        let found = MaterialRepository::search(&pool, "about", None).await.unwrap();
        assert_eq!(found.len(), 4);

        // Wildcard characters match literally
        let found = MaterialRepository::search(&pool, "%", None).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_search_folds_accented_case() {
        let pool = test_support::pool().await;
        let ana = test_support::user(&pool, "Ana").await;
        let upper = test_support::material(&pool, ana.id, "ÁLGEBRA LINEAR").await;
        let lower = test_support::material(&pool, ana.id, "álgebra básica").await;
        test_support::material(&pool, ana.id, "Geometria").await;

        let found: Vec<i64> = MaterialRepository::search(&pool, "Álgebra", None)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(found, vec![upper, lower]);
    }

    #[tokio::test]
    async fn test_category_and_tag_filters() {
        let pool = test_support::pool().await;
        let ana = test_support::user(&pool, "Ana").await;
        let calc = MaterialRepository::create(
            &pool,
            ana.id,
            NewMaterial {
                title: "Calculus I".into(),
                description: String::new(),
                category: "Matemática".into(),
                tags: "calc derivatives".into(),
                file_path: "/uploads/c.pdf".into(),
                cover: None,
            },
        )
        .await
        .unwrap();
        test_support::material(&pool, ana.id, "Other").await;

        let by_category = MaterialRepository::by_category(&pool, "Matemática", None)
            .await
            .unwrap();
        assert_eq!(by_category.len(), 1);
        assert_eq!(by_category[0].id, calc);

        // Category is an exact match
        assert!(MaterialRepository::by_category(&pool, "Matem", None)
            .await
            .unwrap()
            .is_empty());

        let by_tag = MaterialRepository::by_tag(&pool, "DERIV", None).await.unwrap();
        assert_eq!(by_tag.len(), 1);
        assert_eq!(by_tag[0].tag_list(), vec!["calc", "derivatives"]);
    }

    #[tokio::test]
    async fn test_favorite_marker_is_per_requester() {
        let pool = test_support::pool().await;
        let ana = test_support::user(&pool, "Ana").await;
        let bia = test_support::user(&pool, "Bia").await;
        let id = test_support::material(&pool, ana.id, "Calculus I").await;
        let favorite = FavoriteRepository::create(&pool, bia.id, id).await.unwrap();

        let for_bia = MaterialRepository::list(&pool, Some(bia.id)).await.unwrap();
        assert_eq!(for_bia.len(), 1);
        assert_eq!(for_bia[0].favorite_id, Some(favorite.id));

        let for_ana = MaterialRepository::list(&pool, Some(ana.id)).await.unwrap();
        assert_eq!(for_ana[0].favorite_id, None);

        let anonymous = MaterialRepository::list(&pool, None).await.unwrap();
        assert_eq!(anonymous.len(), 1);
        assert_eq!(anonymous[0].favorite_id, None);
    }

    #[tokio::test]
    async fn test_list_by_owner() {
        let pool = test_support::pool().await;
        let ana = test_support::user(&pool, "Ana").await;
        let bia = test_support::user(&pool, "Bia").await;
        test_support::material(&pool, ana.id, "A1").await;
        test_support::material(&pool, bia.id, "B1").await;
        test_support::material(&pool, ana.id, "A2").await;

        let mine: Vec<String> = MaterialRepository::list_by_owner(&pool, ana.id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.title)
            .collect();
        assert_eq!(mine, vec!["A1", "A2"]);
    }
}
