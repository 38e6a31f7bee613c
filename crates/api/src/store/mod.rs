//! Versioned asset store.
//!
//! Every stored artifact gets the next version number for its
//! `(parent_id, kind)` pair. Versions are never overwritten: the blob is
//! written with create-new semantics at a version-qualified path and the row
//! is guarded by a unique constraint. Two writers racing for the same
//! version are resolved by recomputing the version and trying exactly once
//! more.

pub mod blob;
pub mod metadata;
pub mod repository;
pub mod source;

use std::sync::Arc;

use scenegen_core::asset::{extension_for_mime, resolve_mime, storage_path, validate_path_segment, AssetKind};
use scenegen_core::error::CoreError;
use scenegen_core::types::DbId;
use scenegen_db::models::asset_version::{AssetVersion, CreateAssetVersion};
use serde::{Deserialize, Serialize};

pub use blob::{BlobError, BlobStore, LocalBlobStore};
pub use repository::{AssetRepository, PgAssetRepository, RepositoryError};
pub use source::{FetchedSource, SourceFetcher};

/// Writes attempted per request: the first plus one retry after a conflict.
pub const MAX_WRITE_ATTEMPTS: i32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum AssetStoreError {
    /// Caller does not own the parent, or the parent does not exist.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    /// The remote artifact could not be downloaded.
    #[error("Failed to fetch artifact: {0}")]
    Fetch(String),

    #[error("Failed to upload artifact: {0}")]
    Upload(String),

    #[error("Failed to record asset version: {0}")]
    Insert(String),

    /// Ownership or history lookup failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Body of `POST /api/v1/assets`.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreAssetRequest {
    pub parent_id: String,
    pub kind: AssetKind,
    pub owner_id: DbId,
    /// `data:` URI or `http(s)` URL.
    pub source: String,
    #[serde(default)]
    pub mime_hint: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// What a successful store returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredAsset {
    pub asset_id: DbId,
    pub parent_id: String,
    pub kind: AssetKind,
    pub version: i32,
    pub storage_url: String,
}

/// An artifact ready to be written, minus its version.
struct PreparedAsset {
    parent_id: String,
    kind: AssetKind,
    owner_id: DbId,
    created_by: DbId,
    bytes: Vec<u8>,
    mime_type: String,
    extension: &'static str,
    metadata: serde_json::Value,
}

pub struct VersionedAssetStore {
    repo: Arc<dyn AssetRepository>,
    blobs: Arc<dyn BlobStore>,
    fetcher: SourceFetcher,
}

impl VersionedAssetStore {
    pub fn new(repo: Arc<dyn AssetRepository>, blobs: Arc<dyn BlobStore>, fetcher: SourceFetcher) -> Self {
        Self { repo, blobs, fetcher }
    }

    pub fn repository(&self) -> &dyn AssetRepository {
        self.repo.as_ref()
    }

    /// Store an artifact as the next version of `(parent_id, kind)`.
    ///
    /// Nothing is fetched or written before the caller is authorized.
    pub async fn store_asset(
        &self,
        caller: DbId,
        request: StoreAssetRequest,
    ) -> Result<StoredAsset, AssetStoreError> {
        validate_path_segment("parent_id", &request.parent_id)?;
        let caller_metadata = metadata::caller_metadata(request.metadata)?;

        if caller != request.owner_id {
            return Err(AssetStoreError::Unauthorized(
                "Caller does not match owner_id".into(),
            ));
        }
        self.ensure_owner(request.owner_id, &request.parent_id).await?;

        let fetched = self.fetcher.fetch(&request.source).await?;
        let mime_type = resolve_mime(
            request.kind,
            request.mime_hint.as_deref(),
            fetched.declared_mime.as_deref(),
        );
        let extension = extension_for_mime(&mime_type).unwrap_or("bin");
        let metadata = metadata::enrich(caller_metadata, &fetched, &mime_type);

        let prepared = PreparedAsset {
            parent_id: request.parent_id,
            kind: request.kind,
            owner_id: request.owner_id,
            created_by: caller,
            bytes: fetched.bytes,
            mime_type,
            extension,
            metadata,
        };

        let mut orphans = Vec::new();
        let written = self.write_version(&prepared, &mut orphans).await;
        self.remove_orphans(&orphans).await;
        let row = written?;

        tracing::info!(
            asset_id = row.id,
            parent_id = %row.parent_id,
            kind = %prepared.kind,
            version = row.version,
            size_bytes = prepared.bytes.len(),
            "Stored asset version",
        );

        Ok(StoredAsset {
            asset_id: row.id,
            parent_id: row.parent_id,
            kind: prepared.kind,
            version: row.version,
            storage_url: row.storage_url,
        })
    }

    /// Version history for `(parent_id, kind)`, newest first.
    pub async fn list_versions(
        &self,
        caller: DbId,
        parent_id: &str,
        kind: AssetKind,
    ) -> Result<Vec<AssetVersion>, AssetStoreError> {
        validate_path_segment("parent_id", parent_id)?;
        self.ensure_owner(caller, parent_id).await?;
        Ok(self.repo.list(parent_id, kind).await?)
    }

    async fn ensure_owner(&self, owner_id: DbId, parent_id: &str) -> Result<(), AssetStoreError> {
        match self.repo.owner_of(parent_id).await? {
            Some(owner) if owner == owner_id => Ok(()),
            Some(_) => Err(AssetStoreError::Unauthorized(format!(
                "Scene {parent_id} is not owned by user {owner_id}"
            ))),
            None => Err(AssetStoreError::Unauthorized(format!(
                "Scene {parent_id} not found"
            ))),
        }
    }

    /// Upload and record `prepared`, retrying once on a version conflict.
    ///
    /// Blobs whose row could not be recorded are pushed onto `orphans`.
    async fn write_version(
        &self,
        prepared: &PreparedAsset,
        orphans: &mut Vec<String>,
    ) -> Result<AssetVersion, AssetStoreError> {
        let parent_id = prepared.parent_id.as_str();
        let mut floor = 1;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            // A version seen as taken stays taken even if its row is not visible yet.
            let version = self
                .repo
                .next_version(parent_id, prepared.kind)
                .await
                .map_err(|e| AssetStoreError::Insert(e.to_string()))?
                .max(floor);
            let path = storage_path(
                prepared.owner_id,
                parent_id,
                prepared.kind,
                version,
                prepared.extension,
            );

            let storage_url = match self
                .blobs
                .put_new(&path, &prepared.bytes, &prepared.mime_type)
                .await
            {
                Ok(url) => url,
                Err(BlobError::AlreadyExists(_)) => {
                    tracing::warn!(parent_id, kind = %prepared.kind, version, attempt, "Blob path taken, recomputing version");
                    floor = version + 1;
                    continue;
                }
                Err(e) => return Err(AssetStoreError::Upload(e.to_string())),
            };

            let row = CreateAssetVersion {
                parent_id: parent_id.to_string(),
                kind: prepared.kind.as_str().to_string(),
                version,
                storage_path: path.clone(),
                storage_url,
                mime_type: prepared.mime_type.clone(),
                metadata: prepared.metadata.clone(),
                created_by: prepared.created_by,
            };

            match self.repo.insert(&row).await {
                Ok(created) => return Ok(created),
                Err(RepositoryError::Conflict { constraint }) => {
                    tracing::warn!(parent_id, kind = %prepared.kind, version, attempt, %constraint, "Version conflict on insert, recomputing version");
                    orphans.push(path);
                    floor = version + 1;
                }
                Err(e) => {
                    orphans.push(path);
                    return Err(AssetStoreError::Insert(e.to_string()));
                }
            }
        }

        Err(AssetStoreError::Insert(format!(
            "version conflict persisted after {MAX_WRITE_ATTEMPTS} attempts"
        )))
    }

    async fn remove_orphans(&self, paths: &[String]) {
        for path in paths {
            match self.blobs.delete(path).await {
                Ok(()) => tracing::info!(path, "Removed orphaned blob"),
                Err(e) => tracing::warn!(path, error = %e, "Failed to remove orphaned blob"),
            }
        }
    }
}
