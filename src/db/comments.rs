use sqlx::{Pool, Sqlite};

use crate::db::models::CommentView;
use crate::db::{map_missing, now};
use crate::error::AppError;

const COMMENT_VIEW: &str = r#"
SELECT c.id, c.material_id, c.user_id, u.name AS user_name,
       c.content, c.created_at, c.updated_at
FROM comments c
JOIN users u ON c.user_id = u.id
"#;

pub struct CommentRepository;

impl CommentRepository {
    pub async fn create(
        pool: &Pool<Sqlite>,
        material_id: i64,
        user_id: i64,
        content: &str,
    ) -> Result<CommentView, AppError> {
        let result = sqlx::query(
            r#"
INSERT INTO comments (material_id, user_id, content, created_at)
VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(material_id)
        .bind(user_id)
        .bind(content)
        .bind(now())
        .execute(pool)
        .await
        .map_err(|e| map_missing(e, "Material not found"))?;

        // Fetch with user name joined
        Self::get_by_id(pool, result.last_insert_rowid())
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch created comment".to_string()))
    }

    pub async fn get_by_id(
        pool: &Pool<Sqlite>,
        id: i64,
    ) -> Result<Option<CommentView>, AppError> {
        let sql = format!("{COMMENT_VIEW} WHERE c.id = ?");
        let comment = sqlx::query_as::<_, CommentView>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(comment)
    }

    /// Newest first; ties on the timestamp fall back to id.
    pub async fn list_for_material(
        pool: &Pool<Sqlite>,
        material_id: i64,
    ) -> Result<Vec<CommentView>, AppError> {
        let sql = format!("{COMMENT_VIEW} WHERE c.material_id = ? ORDER BY c.created_at DESC, c.id DESC");
        let comments = sqlx::query_as::<_, CommentView>(&sql)
            .bind(material_id)
            .fetch_all(pool)
            .await?;

        Ok(comments)
    }

    /// Explains why a conditional write on `id` by `user_id` matched no row.
    async fn denied(pool: &Pool<Sqlite>, id: i64, action: &str) -> Result<AppError, AppError> {
        let author = sqlx::query_scalar::<_, i64>("SELECT user_id FROM comments WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(match author {
            None => AppError::NotFound("Comment not found".to_string()),
            Some(_) => AppError::Forbidden(format!(
                "You do not have permission to {} this comment",
                action
            )),
        })
    }

    /// Only the author's row matches the update.
    pub async fn update(
        pool: &Pool<Sqlite>,
        id: i64,
        user_id: i64,
        content: &str,
    ) -> Result<CommentView, AppError> {
        let result = sqlx::query(
            "UPDATE comments SET content = ?, updated_at = ? WHERE id = ? AND user_id = ?",
        )
        .bind(content)
        .bind(now())
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::denied(pool, id, "edit").await?);
        }

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))
    }

    pub async fn delete(
        pool: &Pool<Sqlite>,
        id: i64,
        user_id: i64,
    ) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM comments WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Self::denied(pool, id, "delete").await?);
        }

        Ok(())
    }
}
