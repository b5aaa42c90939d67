//! # Common Test Utilities
//!
//! `TestApp` spawns the real router on a random port, backed by a temporary
//! SQLite file and upload directory, plus a few helpers for seeding accounts
//! and materials through the public API.

// Not every test file uses every helper.
#![allow(unused)]

use anyhow::Result;
use axum::serve;
use materials_hub::{
    api::{create_router, AppState},
    client::{ApiClient, ClientConfig, SessionStore},
    config::Config,
    db,
};
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use serde_json::{json, Value};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tempfile::{tempdir, TempDir};
use tokio::{net::TcpListener, task::JoinHandle};

pub struct TestApp {
    pub address: String,
    pub client: Client,
    pub app_state: AppState,
    pub upload_dir: PathBuf,
    _dir: TempDir,
    _server_handle: JoinHandle<()>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

/// An account registered through `POST /register`.
pub struct TestUser {
    pub id: i64,
    pub token: String,
}

impl TestApp {
    pub async fn spawn() -> Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .compact()
            .try_init();

        let dir = tempdir()?;
        let upload_dir = dir.path().join("uploads");
        let config = Arc::new(Config {
            database_url: format!("sqlite://{}", dir.path().join("hub.db").display()),
            upload_dir: upload_dir.to_string_lossy().into_owned(),
            jwt_secret: "test-secret".to_string(),
            db_max_connections: 5,
            ..Config::default()
        });

        let pool = db::connect(&config).await?;
        db::migrate(&pool).await?;
        let app_state = AppState::new(pool, config).await?;
        let router = create_router(app_state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr: SocketAddr = listener.local_addr()?;
        let address = format!("http://{addr}");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let server_handle = tokio::spawn(async move {
            let server = serve(listener, router).with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            });
            if let Err(e) = server.await {
                tracing::error!("[TestApp] Server error: {}", e);
            }
        });

        Ok(Self {
            address,
            client: Client::new(),
            app_state,
            upload_dir,
            _dir: dir,
            _server_handle: server_handle,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// A client whose session and cache live under `data_dir`.
    pub async fn api_client(&self, data_dir: &std::path::Path) -> Result<ApiClient> {
        let config = ClientConfig::new(&self.address, data_dir);
        let session = Arc::new(SessionStore::open(config.session_path()).await?);
        Ok(ApiClient::new(&config, session)?)
    }

    pub async fn register(&self, name: &str) -> Result<TestUser> {
        let email = format!("{}@example.com", name.to_lowercase());
        let response = self
            .client
            .post(self.url("/register"))
            .json(&json!({ "name": name, "email": email, "password": "secret123" }))
            .send()
            .await?
            .error_for_status()?;
        let body: Value = response.json().await?;

        Ok(TestUser {
            id: body["user"]["id"].as_i64().unwrap(),
            token: body["token"].as_str().unwrap().to_string(),
        })
    }

    pub async fn upload(
        &self,
        user: &TestUser,
        title: &str,
        category: &str,
        tags: &str,
        with_cover: bool,
    ) -> Result<Value> {
        let mut form = Form::new()
            .text("title", title.to_string())
            .text("description", format!("Notes for {}", title))
            .text("category", category.to_string())
            .text("tags", tags.to_string())
            .part("file", Part::bytes(b"%PDF-1.4 test".to_vec()).file_name("notes.pdf"));
        if with_cover {
            form = form.part("cover", Part::bytes(b"\x89PNG".to_vec()).file_name("cover.png"));
        }

        let response = self
            .client
            .post(self.url("/materials"))
            .bearer_auth(&user.token)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
