//! Local replica of materials the user chose to keep offline.
//!
//! A material is either remote only, downloading, or cached. Entries appear
//! only through [`OfflineCache::download`] and disappear only through
//! [`OfflineCache::remove`] or [`OfflineCache::clear`]. Nothing is ever
//! written back to the server.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, Pool, Sqlite};
use uuid::Uuid;

use crate::client::{ApiClient, ClientError};
use crate::db::models::{fold_case, MaterialView};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cached_materials (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    cover TEXT,
    file_path TEXT NOT NULL,
    category TEXT NOT NULL,
    tags TEXT NOT NULL,
    creator_name TEXT NOT NULL,
    favorite_id INTEGER,
    created_at INTEGER NOT NULL,
    cached_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cached_materials_category ON cached_materials(category);
"#;

const CACHED_COLUMNS: &str = "SELECT id, user_id, title, description, cover, file_path, category, \
     tags, creator_name, favorite_id, created_at, cached_at FROM cached_materials";

/// Where material assets come from. [`ApiClient`] fetches them over HTTP.
pub trait AssetSource {
    fn fetch(&self, path: &str) -> impl Future<Output = Result<Vec<u8>, ClientError>> + Send;
}

impl AssetSource for ApiClient {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, ClientError> {
        self.download(path).await
    }
}

/// A cached material. `file_path` and `cover` point at local files.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedMaterial {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub cover: Option<String>,
    pub file_path: String,
    pub category: String,
    pub tags: String,
    pub creator_name: String,
    pub favorite_id: Option<i64>,
    pub created_at: i64,
    pub cached_at: i64,
}

impl CachedMaterial {
    fn local_files(&self) -> impl Iterator<Item = &str> + '_ {
        std::iter::once(self.file_path.as_str()).chain(self.cover.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    RemoteOnly,
    Downloading,
    Cached,
}

/// Result of [`OfflineCache::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Local(CachedMaterial),
    Remote(MaterialView),
}

/// Marks a material as downloading until dropped.
struct DownloadGuard {
    downloading: Arc<Mutex<HashSet<i64>>>,
    id: i64,
}

impl DownloadGuard {
    fn acquire(downloading: &Arc<Mutex<HashSet<i64>>>, id: i64) -> Result<Self, ClientError> {
        let mut set = downloading.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(id) {
            return Err(ClientError::DownloadInProgress(id));
        }
        Ok(Self {
            downloading: downloading.clone(),
            id,
        })
    }
}

impl Drop for DownloadGuard {
    fn drop(&mut self) {
        let mut set = self.downloading.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.id);
    }
}

/// Files fetched for one download, not yet visible in the cache.
struct Staged {
    dir: PathBuf,
    file: PathBuf,
    cover: Option<PathBuf>,
}

impl Staged {
    async fn discard(&self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to discard staging dir {}: {}", self.dir.display(), e);
            }
        }
    }
}

#[derive(Clone)]
pub struct OfflineCache {
    pool: Pool<Sqlite>,
    assets_dir: PathBuf,
    staging_dir: PathBuf,
    downloading: Arc<Mutex<HashSet<i64>>>,
}

impl OfflineCache {
    /// Opens (or creates) the replica under `dir`: `offline.db`, an
    /// `assets/` directory and a scratch `staging/` directory.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, ClientError> {
        let dir = dir.as_ref();
        let assets_dir = dir.join("assets");
        let staging_dir = dir.join("staging");
        tokio::fs::create_dir_all(&assets_dir).await?;
        tokio::fs::create_dir_all(&staging_dir).await?;

        let options = SqliteConnectOptions::new()
            .filename(dir.join("offline.db"))
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;

        // Leftovers from an interrupted download are never referenced.
        let mut entries = tokio::fs::read_dir(&staging_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let _ = tokio::fs::remove_dir_all(entry.path()).await;
        }

        tracing::debug!("📦 Offline cache opened at {}", dir.display());
        Ok(Self {
            pool,
            assets_dir,
            staging_dir,
            downloading: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    /// Fetches the material's file and cover, then records it locally.
    ///
    /// Either every asset is fetched and the entry is written, or nothing
    /// changes. Downloading an already cached material replaces its entry.
    pub async fn download<S: AssetSource + Sync>(
        &self,
        source: &S,
        material: &MaterialView,
    ) -> Result<CachedMaterial, ClientError> {
        let _guard = DownloadGuard::acquire(&self.downloading, material.id)?;
        tracing::info!("⬇️  Downloading material {} ({})", material.id, material.title);

        let result = match self.stage(source, material).await {
            Ok(staged) => {
                let committed = self.commit(&staged, material).await;
                staged.discard().await;
                committed
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(_) => tracing::info!("✅ Material {} available offline", material.id),
            Err(e) => tracing::warn!("❌ Download of material {} failed: {}", material.id, e),
        }
        result
    }

    async fn stage<S: AssetSource + Sync>(
        &self,
        source: &S,
        material: &MaterialView,
    ) -> Result<Staged, ClientError> {
        let dir = self.staging_dir.join(format!("{}-{}", material.id, Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await?;
        let mut staged = Staged {
            file: dir.join(local_name(material.id, &material.file_path)),
            cover: None,
            dir,
        };

        let fetched = async {
            let bytes = source.fetch(&material.file_path).await?;
            tokio::fs::write(&staged.file, bytes).await?;

            if let Some(cover) = &material.cover {
                let path = staged.dir.join(local_name(material.id, cover));
                let bytes = source.fetch(cover).await?;
                tokio::fs::write(&path, bytes).await?;
                staged.cover = Some(path);
            }
            Ok::<_, ClientError>(())
        }
        .await;

        if let Err(e) = fetched {
            staged.discard().await;
            return Err(e);
        }
        Ok(staged)
    }

    async fn commit(&self, staged: &Staged, material: &MaterialView) -> Result<CachedMaterial, ClientError> {
        let previous = self.get(material.id).await?;

        let file = self.assets_dir.join(file_name_of(&staged.file));
        let cover = staged
            .cover
            .as_ref()
            .map(|path| self.assets_dir.join(file_name_of(path)));

        let cached = CachedMaterial {
            id: material.id,
            user_id: material.user_id,
            title: material.title.clone(),
            description: material.description.clone(),
            cover: cover.map(|p| p.to_string_lossy().into_owned()),
            file_path: file.to_string_lossy().into_owned(),
            category: material.category.clone(),
            tags: material.tags.clone(),
            creator_name: material.creator_name.clone(),
            favorite_id: material.favorite_id,
            created_at: material.created_at,
            cached_at: chrono::Utc::now().timestamp(),
        };

        let written = self.move_into_place(staged, &cached).await;
        if let Err(e) = written {
            if previous.is_none() {
                for path in cached.local_files() {
                    remove_local(path).await;
                }
            }
            return Err(e);
        }

        if let Some(previous) = previous {
            let current: HashSet<&str> = cached.local_files().collect();
            for path in previous.local_files().filter(|p| !current.contains(p)) {
                remove_local(path).await;
            }
        }

        Ok(cached)
    }

    /// Moves the staged files to their final names and upserts the row.
    async fn move_into_place(&self, staged: &Staged, cached: &CachedMaterial) -> Result<(), ClientError> {
        tokio::fs::rename(&staged.file, &cached.file_path).await?;
        if let (Some(from), Some(to)) = (&staged.cover, &cached.cover) {
            tokio::fs::rename(from, to).await?;
        }

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO cached_materials
                (id, user_id, title, description, cover, file_path, category, tags,
                 creator_name, favorite_id, created_at, cached_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(cached.id)
        .bind(cached.user_id)
        .bind(&cached.title)
        .bind(&cached.description)
        .bind(&cached.cover)
        .bind(&cached.file_path)
        .bind(&cached.category)
        .bind(&cached.tags)
        .bind(&cached.creator_name)
        .bind(cached.favorite_id)
        .bind(cached.created_at)
        .bind(cached.cached_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<Option<CachedMaterial>, ClientError> {
        let sql = format!("{CACHED_COLUMNS} WHERE id = ?");
        let cached = sqlx::query_as::<_, CachedMaterial>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(cached)
    }

    pub async fn list(&self) -> Result<Vec<CachedMaterial>, ClientError> {
        let sql = format!("{CACHED_COLUMNS} ORDER BY cached_at DESC, id DESC");
        let cached = sqlx::query_as::<_, CachedMaterial>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(cached)
    }

    /// Substring match over title, description, tags, category and creator.
    pub async fn search(&self, query: &str) -> Result<Vec<CachedMaterial>, ClientError> {
        let needle = fold_case(query);
        let sql = format!("{CACHED_COLUMNS} ORDER BY title");
        let cached = sqlx::query_as::<_, CachedMaterial>(&sql)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .filter(|m| {
                [&m.title, &m.description, &m.tags, &m.category, &m.creator_name]
                    .iter()
                    .any(|field| fold_case(field).contains(&needle))
            })
            .collect();
        Ok(cached)
    }

    pub async fn by_category(&self, category: &str) -> Result<Vec<CachedMaterial>, ClientError> {
        let sql = format!("{CACHED_COLUMNS} WHERE category = ? ORDER BY title");
        let cached = sqlx::query_as::<_, CachedMaterial>(&sql)
            .bind(category)
            .fetch_all(&self.pool)
            .await?;
        Ok(cached)
    }

    /// Distinct categories among cached materials.
    pub async fn categories(&self) -> Result<Vec<String>, ClientError> {
        let categories = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT category FROM cached_materials ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    pub async fn count(&self) -> Result<i64, ClientError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM cached_materials")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn state(&self, id: i64) -> Result<CacheState, ClientError> {
        let downloading = self
            .downloading
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&id);
        if downloading {
            return Ok(CacheState::Downloading);
        }

        Ok(match self.get(id).await? {
            Some(_) => CacheState::Cached,
            None => CacheState::RemoteOnly,
        })
    }

    /// Local copy when there is one, otherwise the server's.
    pub async fn resolve(&self, api: &ApiClient, id: i64) -> Result<Resolved, ClientError> {
        if let Some(cached) = self.get(id).await? {
            return Ok(Resolved::Local(cached));
        }
        Ok(Resolved::Remote(api.material(id).await?))
    }

    /// Local annotation only; the server's favorites are not touched.
    pub async fn set_favorite(&self, id: i64, favorite_id: Option<i64>) -> Result<(), ClientError> {
        let result = sqlx::query("UPDATE cached_materials SET favorite_id = ? WHERE id = ?")
            .bind(favorite_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ClientError::NotCached(id));
        }
        Ok(())
    }

    /// Evicts one material. Returns whether it was cached.
    pub async fn remove(&self, id: i64) -> Result<bool, ClientError> {
        let Some(cached) = self.get(id).await? else {
            return Ok(false);
        };

        sqlx::query("DELETE FROM cached_materials WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        for path in cached.local_files() {
            remove_local(path).await;
        }

        tracing::info!("🧹 Material {} removed from offline cache", id);
        Ok(true)
    }

    pub async fn clear(&self) -> Result<(), ClientError> {
        let all = self.list().await?;
        sqlx::query("DELETE FROM cached_materials")
            .execute(&self.pool)
            .await?;
        for cached in &all {
            for path in cached.local_files() {
                remove_local(path).await;
            }
        }

        tracing::info!("🧹 Offline cache cleared ({} materials)", all.len());
        Ok(())
    }
}

/// `<id>_<last path segment>`, falling back to `<id>_asset`.
fn local_name(id: i64, remote_path: &str) -> String {
    let segment = remote_path
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty() && !s.starts_with('.') && !s.contains('\\'))
        .unwrap_or("asset");
    format!("{}_{}", id, segment)
}

fn file_name_of(path: &Path) -> &std::ffi::OsStr {
    path.file_name().unwrap_or_default()
}

async fn remove_local(path: &str) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove cached file {}: {}", path, e),
    }
}
