pub mod auth;
pub mod comments;
pub mod extract;
pub mod favorites;
pub mod materials;
pub mod middleware;
pub mod state;

pub use middleware::{AuthUser, MaybeAuthUser};
pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use serde::Serialize;
use std::time::Duration;
use tower_http::{cors::CorsLayer, services::ServeDir, timeout::TimeoutLayer, trace::TraceLayer};

use crate::storage::PUBLIC_PREFIX;

/// Every route the router serves, as `(method, path, summary)`.
pub const ENDPOINTS: &[(&str, &str, &str)] = &[
    ("GET", "/ping", "Liveness check"),
    ("POST", "/register", "Create an account"),
    ("POST", "/login", "Exchange credentials for a token"),
    ("GET", "/profile", "Own profile (requires auth)"),
    ("PUT", "/users", "Update own profile (requires auth)"),
    ("DELETE", "/users", "Delete own account and uploads (requires auth)"),
    ("GET", "/materials", "Browse materials"),
    ("POST", "/materials", "Upload a material (requires auth)"),
    ("GET", "/materials/search", "Search title/description, ?query="),
    ("GET", "/materials/category/{category}", "Materials in a category"),
    ("GET", "/materials/tag/{tag}", "Materials with a tag"),
    ("GET", "/materials/{id}", "One material"),
    ("PUT", "/materials/{id}", "Edit own upload (requires auth)"),
    ("DELETE", "/materials/{id}", "Delete own upload (requires auth)"),
    ("GET", "/my-materials", "Own uploads (requires auth)"),
    ("GET", "/categories", "Suggested categories"),
    ("GET", "/favorites", "Own favorites (requires auth)"),
    ("POST", "/favorites", "Add a favorite (requires auth)"),
    ("DELETE", "/favorites/{material_id}", "Remove a favorite (requires auth)"),
    ("GET", "/comments/{material_id}", "Comments on a material, newest first"),
    ("POST", "/comments", "Comment on a material (requires auth)"),
    ("PUT", "/comments/{id}", "Edit own comment (requires auth)"),
    ("DELETE", "/comments/{id}", "Delete own comment (requires auth)"),
    ("GET", "/uploads/{name}", "Uploaded files"),
];

#[derive(Serialize)]
struct PingResponse {
    message: String,
    version: String,
}

pub fn create_router(state: AppState) -> Router {
    let uploads = ServeDir::new(state.assets.root());
    let body_limit = state.config.max_upload_bytes;
    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    Router::new()
        // Liveness check
        .route("/ping", get(ping))

        // Accounts
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/profile", get(auth::profile))
        .route("/users", put(auth::update_user).delete(auth::delete_user))

        // Materials
        .route("/materials", get(materials::list).post(materials::create))
        .route("/materials/search", get(materials::search))
        .route("/materials/category/{category}", get(materials::by_category))
        .route("/materials/tag/{tag}", get(materials::by_tag))
        .route(
            "/materials/{id}",
            get(materials::get).put(materials::update).delete(materials::delete),
        )
        .route("/my-materials", get(materials::mine))
        .route("/categories", get(materials::categories))

        // Favorites
        .route("/favorites", get(favorites::list).post(favorites::add))
        .route("/favorites/{material_id}", delete(favorites::remove))

        // Comments; GET takes a material id, PUT/DELETE a comment id
        .route("/comments", post(comments::create))
        .route(
            "/comments/{id}",
            get(comments::list).put(comments::update).delete(comments::delete),
        )

        // Uploaded files
        .nest_service(PUBLIC_PREFIX, uploads)

        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::new(timeout))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ping() -> axum::Json<PingResponse> {
    axum::Json(PingResponse {
        message: "pong".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
