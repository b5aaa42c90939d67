use std::sync::Arc;

use sqlx::{Pool, Sqlite};

use crate::config::Config;
use crate::crypto::TokenKeys;
use crate::error::AppError;
use crate::storage::AssetStore;

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Sqlite>,
    pub tokens: Arc<TokenKeys>,
    pub assets: AssetStore,
    pub config: Arc<Config>,
}

impl AppState {
    /// Everything a handler needs, built once at startup.
    pub async fn new(db: Pool<Sqlite>, config: Arc<Config>) -> Result<Self, AppError> {
        let tokens = Arc::new(TokenKeys::new(&config.jwt_secret, config.token_expiry_hours));
        let assets = AssetStore::open(&config.upload_dir).await?;

        Ok(AppState {
            db,
            tokens,
            assets,
            config,
        })
    }
}
