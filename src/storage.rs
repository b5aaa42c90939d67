//! On-disk storage for uploaded material files and covers.
//!
//! Assets are written under the configured upload directory and referenced
//! by their public path, `/uploads/<uuid>.<ext>`.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::db::models::MaterialAssets;
use crate::error::AppError;

pub const PUBLIC_PREFIX: &str = "/uploads";

#[derive(Clone, Debug)]
pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, AppError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to create upload directory: {}", e)))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `bytes` under a fresh name that keeps the original extension,
    /// returning the public path.
    pub async fn store(&self, original_name: Option<&str>, bytes: &[u8]) -> Result<String, AppError> {
        let file_name = match extension(original_name) {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };

        tokio::fs::write(self.root.join(&file_name), bytes)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to write upload: {}", e)))?;

        tracing::debug!("📁 Stored asset {} ({} bytes)", file_name, bytes.len());
        Ok(format!("{}/{}", PUBLIC_PREFIX, file_name))
    }

    /// Maps a public path back to a file under the root. Anything that is
    /// not a plain file name under `/uploads/` is rejected.
    pub fn resolve(&self, public_path: &str) -> Option<PathBuf> {
        let name = public_path.strip_prefix(PUBLIC_PREFIX)?.strip_prefix('/')?;
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.starts_with('.') {
            return None;
        }
        Some(self.root.join(name))
    }

    /// Best effort; a missing file is not an error.
    pub async fn remove(&self, public_path: &str) {
        let Some(path) = self.resolve(public_path) else {
            tracing::warn!("Refusing to remove asset outside upload root: {}", public_path);
            return;
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::debug!("🧹 Removed asset {}", public_path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove asset {}: {}", public_path, e),
        }
    }

    pub async fn remove_all(&self, assets: &[MaterialAssets]) {
        for asset in assets {
            self.remove(&asset.file_path).await;
            if let Some(cover) = &asset.cover {
                self.remove(cover).await;
            }
        }
    }
}

fn extension(original_name: Option<&str>) -> Option<String> {
    let ext = Path::new(original_name?).extension()?.to_str()?;
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
