pub mod auth;
pub mod error;
pub mod extract;
pub mod info;
pub mod trees;
pub mod updates;
pub mod uploads;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use arbor_db::Database;

use crate::error::{ApiError, ApiResult};
use crate::uploads::Uploads;

/// 10 MB request body limit (covers the multipart image uploads)
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub uploads: Uploads,
}

/// All `/api` routes plus `/info`. Static file serving and the outer
/// layers are added by the server binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/trees", get(trees::list_trees).post(trees::create_tree))
        .route(
            "/api/trees/{id}",
            get(trees::get_tree)
                .put(trees::update_tree)
                .delete(trees::delete_tree),
        )
        .route("/api/trees/{id}/update", post(updates::create_update))
        .route("/api/trees/getupdates/{tree_id}", get(updates::list_updates))
        .route("/api/users/register", post(auth::register))
        .route("/api/users/login", post(auth::login))
        .route("/info", get(info::info))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE))
        .with_state(state)
}

/// Run blocking DB / hashing work off the async runtime.
pub(crate) async fn run_blocking<F, T>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

pub(crate) fn parse_id(raw: &str) -> ApiResult<Uuid> {
    raw.parse::<Uuid>()
        .map_err(|_| ApiError::bad_request("malformatted id"))
}

pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339()
}

/// Parse a stored id, falling back to the nil UUID on corruption.
pub(crate) fn stored_uuid(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::default()
    })
}

/// Parse a stored RFC 3339 timestamp, falling back to the epoch on corruption.
pub(crate) fn stored_timestamp(raw: &str, what: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!("Corrupt {} '{}': {}", what, raw, e);
            DateTime::default()
        })
}
