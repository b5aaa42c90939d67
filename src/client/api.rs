use std::sync::Arc;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::api::auth::AuthResponse;
use crate::api::favorites::AddFavoriteResponse;
use crate::client::session::SessionStore;
use crate::client::{ClientConfig, ClientError};
use crate::db::models::{CommentView, Favorite, MaterialView, User};

/// A file to send in a multipart upload.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl FilePart {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    fn into_part(self) -> Part {
        Part::bytes(self.bytes).file_name(self.file_name)
    }
}

#[derive(Debug, Clone)]
pub struct MaterialUpload {
    pub title: String,
    pub description: String,
    pub category: String,
    pub tags: String,
    pub file: FilePart,
    pub cover: Option<FilePart>,
}

/// Fields left as `None` are not sent and keep their server-side value.
#[derive(Debug, Clone, Default)]
pub struct MaterialUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Option<String>,
    pub file: Option<FilePart>,
    pub cover: Option<FilePart>,
}

fn text_fields(mut form: Form, fields: [(&'static str, Option<String>); 4]) -> Form {
    for (name, value) in fields {
        if let Some(value) = value {
            form = form.text(name, value);
        }
    }
    form
}

/// Typed client for the REST surface. The bearer token comes from the
/// shared [`SessionStore`] and is refreshed by `login`/`register`.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    session: Arc<SessionStore>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, session: Arc<SessionStore>) -> Result<Self, ClientError> {
        let mut base = Url::parse(&config.base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(config.base_url.clone()));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let timeout = Duration::from_secs(config.timeout_secs);
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;

        Ok(Self { http, base, session })
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Joins path segments onto the base URL, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Resolves a server-relative path such as `/uploads/x.pdf`.
    fn asset_url(&self, path: &str) -> Result<Url, ClientError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", path, e)))
    }

    async fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match self.session.token().await {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends the request and turns non-2xx answers into `ClientError::Api`
    /// using the server's `{ "error": ... }` body.
    async fn send_raw(&self, builder: RequestBuilder) -> Result<reqwest::Response, ClientError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or(body);

        tracing::debug!("Request failed with {}: {}", status, message);
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        let bytes = self.send_raw(builder).await?.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn send_unit(&self, builder: RequestBuilder) -> Result<(), ClientError> {
        self.send_raw(builder).await?;
        Ok(())
    }

    // Accounts

    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<User, ClientError> {
        let builder = self
            .request(Method::POST, self.url(&["register"]))
            .await
            .json(&json!({ "name": name, "email": email, "password": password }));
        let auth: AuthResponse = self.send(builder).await?;

        self.session.save(auth.token, auth.user.clone()).await?;
        Ok(auth.user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, ClientError> {
        let builder = self
            .request(Method::POST, self.url(&["login"]))
            .await
            .json(&json!({ "email": email, "password": password }));
        let auth: AuthResponse = self.send(builder).await?;

        self.session.save(auth.token, auth.user.clone()).await?;
        Ok(auth.user)
    }

    /// Tokens are stateless, so logging out only forgets them locally.
    pub async fn logout(&self) -> Result<(), ClientError> {
        self.session.clear().await
    }

    pub async fn profile(&self) -> Result<User, ClientError> {
        let builder = self.request(Method::GET, self.url(&["profile"])).await;
        let user: User = self.send(builder).await?;

        self.session.save_user(user.clone()).await?;
        Ok(user)
    }

    pub async fn update_profile(
        &self,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<User, ClientError> {
        let builder = self
            .request(Method::PUT, self.url(&["users"]))
            .await
            .json(&json!({ "name": name, "email": email }));
        let user: User = self.send(builder).await?;

        self.session.save_user(user.clone()).await?;
        Ok(user)
    }

    pub async fn delete_account(&self) -> Result<(), ClientError> {
        let builder = self.request(Method::DELETE, self.url(&["users"])).await;
        self.send_unit(builder).await?;
        self.session.clear().await
    }

    // Materials

    pub async fn materials(&self) -> Result<Vec<MaterialView>, ClientError> {
        let builder = self.request(Method::GET, self.url(&["materials"])).await;
        self.send(builder).await
    }

    pub async fn my_materials(&self) -> Result<Vec<MaterialView>, ClientError> {
        let builder = self.request(Method::GET, self.url(&["my-materials"])).await;
        self.send(builder).await
    }

    pub async fn material(&self, id: i64) -> Result<MaterialView, ClientError> {
        let builder = self
            .request(Method::GET, self.url(&["materials", &id.to_string()]))
            .await;
        self.send(builder).await
    }

    pub async fn upload_material(&self, upload: MaterialUpload) -> Result<MaterialView, ClientError> {
        let mut form = text_fields(
            Form::new(),
            [
                ("title", Some(upload.title)),
                ("description", Some(upload.description)),
                ("category", Some(upload.category)),
                ("tags", Some(upload.tags)),
            ],
        )
        .part("file", upload.file.into_part());
        if let Some(cover) = upload.cover {
            form = form.part("cover", cover.into_part());
        }

        let builder = self
            .request(Method::POST, self.url(&["materials"]))
            .await
            .multipart(form);
        self.send(builder).await
    }

    pub async fn update_material(
        &self,
        id: i64,
        update: MaterialUpdate,
    ) -> Result<MaterialView, ClientError> {
        let mut form = text_fields(
            Form::new(),
            [
                ("title", update.title),
                ("description", update.description),
                ("category", update.category),
                ("tags", update.tags),
            ],
        );
        if let Some(file) = update.file {
            form = form.part("file", file.into_part());
        }
        if let Some(cover) = update.cover {
            form = form.part("cover", cover.into_part());
        }

        let builder = self
            .request(Method::PUT, self.url(&["materials", &id.to_string()]))
            .await
            .multipart(form);
        self.send(builder).await
    }

    pub async fn delete_material(&self, id: i64) -> Result<(), ClientError> {
        let builder = self
            .request(Method::DELETE, self.url(&["materials", &id.to_string()]))
            .await;
        self.send_unit(builder).await
    }

    pub async fn search(&self, query: &str) -> Result<Vec<MaterialView>, ClientError> {
        let mut url = self.url(&["materials", "search"]);
        url.query_pairs_mut().append_pair("query", query);
        let builder = self.request(Method::GET, url).await;
        self.send(builder).await
    }

    pub async fn by_category(&self, category: &str) -> Result<Vec<MaterialView>, ClientError> {
        let builder = self
            .request(Method::GET, self.url(&["materials", "category", category]))
            .await;
        self.send(builder).await
    }

    pub async fn by_tag(&self, tag: &str) -> Result<Vec<MaterialView>, ClientError> {
        let builder = self
            .request(Method::GET, self.url(&["materials", "tag", tag]))
            .await;
        self.send(builder).await
    }

    pub async fn categories(&self) -> Result<Vec<String>, ClientError> {
        let builder = self.request(Method::GET, self.url(&["categories"])).await;
        self.send(builder).await
    }

    // Favorites

    pub async fn add_favorite(&self, material_id: i64) -> Result<Favorite, ClientError> {
        let builder = self
            .request(Method::POST, self.url(&["favorites"]))
            .await
            .json(&json!({ "material_id": material_id }));
        let response: AddFavoriteResponse = self.send(builder).await?;
        Ok(response.favorite)
    }

    pub async fn remove_favorite(&self, material_id: i64) -> Result<(), ClientError> {
        let builder = self
            .request(Method::DELETE, self.url(&["favorites", &material_id.to_string()]))
            .await;
        self.send_unit(builder).await
    }

    pub async fn favorites(&self) -> Result<Vec<MaterialView>, ClientError> {
        let builder = self.request(Method::GET, self.url(&["favorites"])).await;
        self.send(builder).await
    }

    // Comments

    pub async fn comments(&self, material_id: i64) -> Result<Vec<CommentView>, ClientError> {
        let builder = self
            .request(Method::GET, self.url(&["comments", &material_id.to_string()]))
            .await;
        self.send(builder).await
    }

    pub async fn add_comment(&self, material_id: i64, content: &str) -> Result<CommentView, ClientError> {
        let builder = self
            .request(Method::POST, self.url(&["comments"]))
            .await
            .json(&json!({ "material_id": material_id, "content": content }));
        self.send(builder).await
    }

    pub async fn edit_comment(&self, id: i64, content: &str) -> Result<CommentView, ClientError> {
        let builder = self
            .request(Method::PUT, self.url(&["comments", &id.to_string()]))
            .await
            .json(&json!({ "content": content }));
        self.send(builder).await
    }

    pub async fn delete_comment(&self, id: i64) -> Result<(), ClientError> {
        let builder = self
            .request(Method::DELETE, self.url(&["comments", &id.to_string()]))
            .await;
        self.send_unit(builder).await
    }

    // Misc

    pub async fn ping(&self) -> Result<(), ClientError> {
        let builder = self.http.get(self.url(&["ping"]));
        self.send_unit(builder).await
    }

    /// Fetches an uploaded asset by its server path.
    pub async fn download(&self, path: &str) -> Result<Vec<u8>, ClientError> {
        let url = self.asset_url(path)?;
        let bytes = self.send_raw(self.http.get(url)).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}
