pub mod comments;
pub mod favorites;
pub mod materials;
pub mod models;
pub mod users;

pub use comments::CommentRepository;
pub use favorites::FavoriteRepository;
pub use materials::MaterialRepository;
pub use models::{CommentView, Favorite, MaterialView, User};
pub use users::UserRepository;

use std::str::FromStr;
use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::config::Config;
use crate::error::AppError;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Open the server pool. Foreign keys are enforced on every connection.
pub async fn connect(config: &Config) -> Result<Pool<Sqlite>, AppError> {
    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        // Writers wait for each other instead of failing with SQLITE_BUSY
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.db_max_connections)
        .min_connections(config.db_min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect_with(options)
        .await?;

    Ok(pool)
}

pub async fn migrate(pool: &Pool<Sqlite>) -> Result<(), AppError> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| AppError::Internal(format!("Migration failed: {}", e)))
}

/// Maps a unique-constraint violation to `on_unique`, a foreign-key
/// violation to `NotFound`, and leaves anything else as a database error.
pub(crate) fn map_constraint(err: sqlx::Error, on_unique: AppError, missing: &str) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return on_unique;
        }
    }
    map_missing(err, missing)
}

/// For tables without unique keys: only a dangling reference is expected.
pub(crate) fn map_missing(err: sqlx::Error, missing: &str) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_foreign_key_violation() {
            return AppError::NotFound(missing.to_string());
        }
    }
    AppError::Database(err)
}

pub(crate) fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
