//! The persisted login: the bearer token and the last user the server
//! returned, kept as a small JSON document on disk.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::client::ClientError;
use crate::db::models::User;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: Option<String>,
    pub user: Option<User>,
}

pub struct SessionStore {
    path: Option<PathBuf>,
    state: RwLock<Session>,
}

impl SessionStore {
    /// Load the session at `path`, starting empty if it is missing or
    /// unreadable.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, ClientError> {
        let path = path.into();

        let session = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!("Discarding unreadable session file {}: {}", path.display(), e);
                Session::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Session::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: Some(path),
            state: RwLock::new(session),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(Session::default()),
        }
    }

    pub async fn snapshot(&self) -> Session {
        self.state.read().await.clone()
    }

    pub async fn token(&self) -> Option<String> {
        self.state.read().await.token.clone()
    }

    pub async fn user(&self) -> Option<User> {
        self.state.read().await.user.clone()
    }

    pub async fn save(&self, token: String, user: User) -> Result<(), ClientError> {
        let mut state = self.state.write().await;
        state.token = Some(token);
        state.user = Some(user);
        self.persist(&state).await
    }

    pub async fn save_user(&self, user: User) -> Result<(), ClientError> {
        let mut state = self.state.write().await;
        state.user = Some(user);
        self.persist(&state).await
    }

    pub async fn clear(&self) -> Result<(), ClientError> {
        let mut state = self.state.write().await;
        *state = Session::default();
        self.persist(&state).await
    }

    /// Write-then-rename so a crash never leaves a half-written file.
    async fn persist(&self, session: &Session) -> Result<(), ClientError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec_pretty(session)
            .map_err(|e| ClientError::Decode(format!("Failed to encode session: {}", e)))?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;

        Ok(())
    }
}
