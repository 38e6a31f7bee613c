//! Route definitions for the versioned asset store.
//!
//! All routes are mounted under `/assets`.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers::assets;
use crate::state::AppState;

/// ```text
/// POST /                     -> create_asset
/// GET  /{parent_id}/{kind}   -> list_versions
/// ```
///
/// `POST /` accepts bodies up to `max_artifact_bytes` instead of axum's
/// 2 MB default.
pub fn router(max_artifact_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(assets::create_asset).layer(DefaultBodyLimit::max(max_artifact_bytes)),
        )
        .route("/{parent_id}/{kind}", get(assets::list_versions))
}
