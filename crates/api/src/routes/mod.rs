pub mod assets;
pub mod health;

use axum::Router;

use crate::config::ServerConfig;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /assets                          store a version (POST)
/// /assets/{parent_id}/{kind}       version history (GET)
/// ```
pub fn api_routes(config: &ServerConfig) -> Router<AppState> {
    Router::new().nest("/assets", assets::router(config.max_artifact_bytes))
}
