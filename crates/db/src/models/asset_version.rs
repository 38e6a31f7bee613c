//! Asset version entity model and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use scenegen_core::types::{DbId, Timestamp};

/// A row from the `asset_versions` table. Rows are immutable once written.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AssetVersion {
    pub id: DbId,
    pub parent_id: String,
    pub kind: String,
    pub version: i32,
    pub storage_path: String,
    pub storage_url: String,
    pub mime_type: String,
    pub metadata: serde_json::Value,
    pub created_by: DbId,
    pub created_at: Timestamp,
}

/// DTO for inserting an asset version at an explicit version number.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAssetVersion {
    pub parent_id: String,
    pub kind: String,
    pub version: i32,
    pub storage_path: String,
    pub storage_url: String,
    pub mime_type: String,
    pub metadata: serde_json::Value,
    pub created_by: DbId,
}
