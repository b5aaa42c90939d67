//! Client-side collaborators of the service: a typed REST client, the
//! persisted login session, the offline material cache and a liveness monitor.
//!
//! Everything here is plain request/response: callers await results and own
//! whatever display state they derive from them.

pub mod api;
pub mod cache;
pub mod monitor;
pub mod session;

pub use api::{ApiClient, FilePart, MaterialUpdate, MaterialUpload};
pub use cache::{AssetSource, CacheState, CachedMaterial, OfflineCache, Resolved};
pub use monitor::ConnectivityMonitor;
pub use session::{Session, SessionStore};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Server responded {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Local database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Material {0} is already downloading")]
    DownloadInProgress(i64),

    #[error("Material {0} is not cached")]
    NotCached(i64),
}

impl ClientError {
    /// HTTP status for errors the server answered with.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Applied to connect and to the whole request, for every call.
    pub timeout_secs: u64,
    pub data_dir: PathBuf,
    pub check_interval_secs: u64,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs: 30,
            data_dir: data_dir.into(),
            check_interval_secs: 30,
        }
    }

    pub fn from_env() -> Result<Self, ClientError> {
        dotenvy::dotenv().ok();

        let base_url = std::env::var("MATERIALS_HUB_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:3000".to_string());
        let data_dir = std::env::var("MATERIALS_HUB_DATA_DIR")
            .unwrap_or_else(|_| "./materials-hub-data".to_string());

        let mut config = Self::new(base_url, data_dir);
        if let Ok(raw) = std::env::var("MATERIALS_HUB_TIMEOUT_SECS") {
            config.timeout_secs = raw
                .parse()
                .map_err(|e| ClientError::Config(format!("Invalid MATERIALS_HUB_TIMEOUT_SECS: {}", e)))?;
        }
        Ok(config)
    }

    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join("session.json")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("offline")
    }
}
