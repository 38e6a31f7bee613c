//! Handlers for the `/assets` resource.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use scenegen_core::asset::AssetKind;
use scenegen_db::models::asset_version::AssetVersion;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;
use crate::store::{StoreAssetRequest, StoredAsset};

/// POST /api/v1/assets
///
/// Store an artifact as the next version of its `(parent_id, kind)` pair.
/// Bodies over `MAX_ARTIFACT_BYTES` are rejected with 413.
pub async fn create_asset(
    State(state): State<AppState>,
    user: AuthUser,
    body: Result<Json<StoreAssetRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<DataResponse<StoredAsset>>)> {
    let Json(body) = body.map_err(|e| match e.status() {
        StatusCode::PAYLOAD_TOO_LARGE => AppError::PayloadTooLarge(e.body_text()),
        _ => AppError::BadRequest(e.body_text()),
    })?;
    tracing::debug!(
        user_id = user.user_id,
        parent_id = %body.parent_id,
        kind = %body.kind,
        "Storing asset",
    );
    let stored = state.store.store_asset(user.user_id, body).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: stored })))
}

/// GET /api/v1/assets/{parent_id}/{kind}
///
/// Version history, newest first.
pub async fn list_versions(
    State(state): State<AppState>,
    user: AuthUser,
    Path((parent_id, kind)): Path<(String, String)>,
) -> AppResult<Json<DataResponse<Vec<AssetVersion>>>> {
    let kind: AssetKind = kind.parse()?;
    let versions = state
        .store
        .list_versions(user.user_id, &parent_id, kind)
        .await?;
    Ok(Json(DataResponse { data: versions }))
}
