//! Repository for the `asset_versions` table.

use sqlx::PgPool;

use crate::models::asset_version::{AssetVersion, CreateAssetVersion};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, parent_id, kind, version, storage_path, storage_url, \
    mime_type, metadata, created_by, created_at";

/// Insert and lookup operations for asset versions.
///
/// Version numbers are chosen by the caller (see [`Self::next_version`]);
/// concurrent writers are serialised by the
/// `uq_asset_versions_parent_kind_version` constraint.
pub struct AssetVersionRepo;

impl AssetVersionRepo {
    /// Next version number for a `(parent_id, kind)` pair (max existing + 1, or 1 if none).
    pub async fn next_version(
        pool: &PgPool,
        parent_id: &str,
        kind: &str,
    ) -> Result<i32, sqlx::Error> {
        let row: (i32,) = sqlx::query_as(
            "SELECT COALESCE(MAX(version), 0) + 1 \
             FROM asset_versions WHERE parent_id = $1 AND kind = $2",
        )
        .bind(parent_id)
        .bind(kind)
        .fetch_one(pool)
        .await?;
        Ok(row.0)
    }

    /// Insert a version row. Fails with a unique violation if the version is taken.
    pub async fn create(
        pool: &PgPool,
        input: &CreateAssetVersion,
    ) -> Result<AssetVersion, sqlx::Error> {
        let query = format!(
            "INSERT INTO asset_versions
                (parent_id, kind, version, storage_path, storage_url, mime_type, metadata, created_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AssetVersion>(&query)
            .bind(&input.parent_id)
            .bind(&input.kind)
            .bind(input.version)
            .bind(&input.storage_path)
            .bind(&input.storage_url)
            .bind(&input.mime_type)
            .bind(&input.metadata)
            .bind(input.created_by)
            .fetch_one(pool)
            .await
    }

    /// All versions for a `(parent_id, kind)` pair, newest first.
    pub async fn list_by_parent_kind(
        pool: &PgPool,
        parent_id: &str,
        kind: &str,
    ) -> Result<Vec<AssetVersion>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM asset_versions
             WHERE parent_id = $1 AND kind = $2
             ORDER BY version DESC"
        );
        sqlx::query_as::<_, AssetVersion>(&query)
            .bind(parent_id)
            .bind(kind)
            .fetch_all(pool)
            .await
    }
}
