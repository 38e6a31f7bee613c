use std::sync::Arc;

use crate::config::ServerConfig;
use crate::store::VersionedAssetStore;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<VersionedAssetStore>,
}
