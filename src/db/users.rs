use sqlx::{Pool, Sqlite};

use crate::db::models::{MaterialAssets, User};
use crate::db::{map_constraint, now};
use crate::error::AppError;

pub struct UserRepository;

impl UserRepository {
    /// Fails with `DuplicateEmail` when the email is taken.
    pub async fn create(
        pool: &Pool<Sqlite>,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
INSERT INTO users (name, email, password_hash, created_at)
VALUES (?, ?, ?, ?)
RETURNING *
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(now())
        .fetch_one(pool)
        .await
        .map_err(|e| map_constraint(e, AppError::DuplicateEmail, "User not found"))?;

        Ok(user)
    }

    pub async fn get_by_email(
        pool: &Pool<Sqlite>,
        email: &str,
    ) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE email = ?"
        )
        .bind(email)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    pub async fn get_by_id(
        pool: &Pool<Sqlite>,
        id: i64,
    ) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE id = ?"
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// Only name and email are mutable.
    pub async fn update_profile(
        pool: &Pool<Sqlite>,
        id: i64,
        name: &str,
        email: &str,
    ) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(
            r#"
UPDATE users SET name = ?, email = ?
WHERE id = ?
RETURNING *
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| map_constraint(e, AppError::DuplicateEmail, "User not found"))?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    /// Deletes the account. Materials, favorites and comments go with it
    /// through `ON DELETE CASCADE`; the asset paths of the removed
    /// materials are returned so the caller can clean up the files.
    pub async fn delete(
        pool: &Pool<Sqlite>,
        id: i64,
    ) -> Result<Vec<MaterialAssets>, AppError> {
        let mut tx = pool.begin().await?;

        // The first statement must write. A deferred transaction that reads
        // before writing gets SQLITE_BUSY instead of waiting for the lock.
        let assets = sqlx::query_as::<_, MaterialAssets>(
            "DELETE FROM materials WHERE user_id = ? RETURNING file_path, cover"
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        tx.commit().await?;

        Ok(assets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support;
    use crate::db::MaterialRepository;

    #[tokio::test]
    async fn test_duplicate_email_leaves_existing_account() {
        let pool = test_support::pool().await;
        let first = UserRepository::create(&pool, "Ana", "ana@example.com", "h1")
            .await
            .unwrap();

        let err = UserRepository::create(&pool, "Impostor", "ana@example.com", "h2")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateEmail));

        let stored = UserRepository::get_by_email(&pool, "ana@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, first);
    }

    #[tokio::test]
    async fn test_update_profile() {
        let pool = test_support::pool().await;
        let ana = test_support::user(&pool, "Ana").await;
        let bia = test_support::user(&pool, "Bia").await;

        let updated = UserRepository::update_profile(&pool, ana.id, "Ana Maria", "am@example.com")
            .await
            .unwrap();
        assert_eq!(updated.name, "Ana Maria");
        assert_eq!(updated.email, "am@example.com");
        assert_eq!(updated.password_hash, ana.password_hash);

        let err = UserRepository::update_profile(&pool, ana.id, "Ana", &bia.email)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateEmail));

        let err = UserRepository::update_profile(&pool, 999, "X", "x@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_cascades_materials() {
        let pool = test_support::pool().await;
        let ana = test_support::user(&pool, "Ana").await;
        let material_id = test_support::material(&pool, ana.id, "Algebra").await;

        let assets = UserRepository::delete(&pool, ana.id).await.unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].file_path, "/uploads/Algebra.pdf");

        assert!(UserRepository::get_by_id(&pool, ana.id).await.unwrap().is_none());
        assert!(MaterialRepository::get_by_id(&pool, material_id, None)
            .await
            .unwrap()
            .is_none());

        let err = UserRepository::delete(&pool, ana.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
