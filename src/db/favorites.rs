use sqlx::{Pool, Sqlite};

use crate::db::models::{Favorite, MaterialView};
use crate::db::{map_constraint, now};
use crate::error::AppError;

pub struct FavoriteRepository;

impl FavoriteRepository {
    /// A user may favorite a material once; a second attempt fails with
    /// `AlreadyFavorited`. Unknown materials fail with `NotFound`.
    pub async fn create(
        pool: &Pool<Sqlite>,
        user_id: i64,
        material_id: i64,
    ) -> Result<Favorite, AppError> {
        let favorite = sqlx::query_as::<_, Favorite>(
            r#"
INSERT INTO favorites (user_id, material_id, created_at)
VALUES (?, ?, ?)
RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(material_id)
        .bind(now())
        .fetch_one(pool)
        .await
        .map_err(|e| map_constraint(e, AppError::AlreadyFavorited, "Material not found"))?;

        Ok(favorite)
    }

    pub async fn delete(
        pool: &Pool<Sqlite>,
        user_id: i64,
        material_id: i64,
    ) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM favorites WHERE user_id = ? AND material_id = ?")
            .bind(user_id)
            .bind(material_id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(
                "Material not found in favorites".to_string(),
            ));
        }

        Ok(())
    }

    /// The user's favorited materials, oldest favorite first.
    pub async fn list(
        pool: &Pool<Sqlite>,
        user_id: i64,
    ) -> Result<Vec<MaterialView>, AppError> {
        let materials = sqlx::query_as::<_, MaterialView>(
            r#"
SELECT m.id, m.user_id, m.title, m.description, m.cover, m.file_path,
       m.category, m.tags, m.created_at, m.updated_at,
       u.name AS creator_name, f.id AS favorite_id
FROM favorites f
JOIN materials m ON f.material_id = m.id
JOIN users u ON m.user_id = u.id
WHERE f.user_id = ?
ORDER BY f.id
            "#
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(materials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support;

    #[tokio::test]
    async fn test_favorite_round_trip_restores_list() {
        let pool = test_support::pool().await;
        let ana = test_support::user(&pool, "Ana").await;
        let a = test_support::material(&pool, ana.id, "A").await;
        let b = test_support::material(&pool, ana.id, "B").await;

        FavoriteRepository::create(&pool, ana.id, a).await.unwrap();
        let before = FavoriteRepository::list(&pool, ana.id).await.unwrap();

        FavoriteRepository::create(&pool, ana.id, b).await.unwrap();
        assert_eq!(FavoriteRepository::list(&pool, ana.id).await.unwrap().len(), 2);

        FavoriteRepository::delete(&pool, ana.id, b).await.unwrap();
        assert_eq!(FavoriteRepository::list(&pool, ana.id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_duplicate_favorite_rejected() {
        let pool = test_support::pool().await;
        let ana = test_support::user(&pool, "Ana").await;
        let a = test_support::material(&pool, ana.id, "A").await;

        FavoriteRepository::create(&pool, ana.id, a).await.unwrap();
        let err = FavoriteRepository::create(&pool, ana.id, a).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyFavorited));
        assert_eq!(FavoriteRepository::list(&pool, ana.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_material_and_missing_favorite() {
        let pool = test_support::pool().await;
        let ana = test_support::user(&pool, "Ana").await;

        let err = FavoriteRepository::create(&pool, ana.id, 999).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = FavoriteRepository::delete(&pool, ana.id, 999).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_only_own_favorite_is_removed() {
        let pool = test_support::pool().await;
        let ana = test_support::user(&pool, "Ana").await;
        let bia = test_support::user(&pool, "Bia").await;
        let a = test_support::material(&pool, ana.id, "A").await;

        FavoriteRepository::create(&pool, bia.id, a).await.unwrap();
        let err = FavoriteRepository::delete(&pool, ana.id, a).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(FavoriteRepository::list(&pool, bia.id).await.unwrap().len(), 1);
    }
}
