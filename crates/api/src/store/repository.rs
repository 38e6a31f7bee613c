//! Persistence seam for asset version rows and scene ownership.

use async_trait::async_trait;
use scenegen_core::asset::AssetKind;
use scenegen_core::types::DbId;
use scenegen_db::models::asset_version::{AssetVersion, CreateAssetVersion};
use scenegen_db::repositories::{AssetVersionRepo, SceneRepo};
use scenegen_db::DbPool;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The `(parent_id, kind, version)` triple is already taken.
    #[error("version already recorded (constraint {constraint})")]
    Conflict { constraint: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RepositoryError {
    fn from_insert(err: sqlx::Error) -> Self {
        match scenegen_db::unique_violation(&err) {
            Some(constraint) => Self::Conflict { constraint },
            None => Self::Database(err),
        }
    }
}

#[async_trait]
pub trait AssetRepository: Send + Sync {
    async fn health_check(&self) -> Result<(), RepositoryError>;

    /// Owner of the parent scene, `None` if the scene does not exist.
    async fn owner_of(&self, parent_id: &str) -> Result<Option<DbId>, RepositoryError>;

    /// `1 + max(version)` for the pair, or 1 when nothing is recorded.
    async fn next_version(&self, parent_id: &str, kind: AssetKind) -> Result<i32, RepositoryError>;

    /// Insert at the version given in `input`; a taken version is
    /// [`RepositoryError::Conflict`].
    async fn insert(&self, input: &CreateAssetVersion) -> Result<AssetVersion, RepositoryError>;

    /// Recorded versions, newest first.
    async fn list(&self, parent_id: &str, kind: AssetKind) -> Result<Vec<AssetVersion>, RepositoryError>;
}

/// [`AssetRepository`] over the Postgres pool.
pub struct PgAssetRepository {
    pool: DbPool,
}

impl PgAssetRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssetRepository for PgAssetRepository {
    async fn health_check(&self) -> Result<(), RepositoryError> {
        Ok(scenegen_db::health_check(&self.pool).await?)
    }

    async fn owner_of(&self, parent_id: &str) -> Result<Option<DbId>, RepositoryError> {
        let owner = SceneRepo::find_owner(&self.pool, parent_id).await?;
        Ok(owner.map(|o| o.owner_id))
    }

    async fn next_version(&self, parent_id: &str, kind: AssetKind) -> Result<i32, RepositoryError> {
        Ok(AssetVersionRepo::next_version(&self.pool, parent_id, kind.as_str()).await?)
    }

    async fn insert(&self, input: &CreateAssetVersion) -> Result<AssetVersion, RepositoryError> {
        AssetVersionRepo::create(&self.pool, input)
            .await
            .map_err(RepositoryError::from_insert)
    }

    async fn list(&self, parent_id: &str, kind: AssetKind) -> Result<Vec<AssetVersion>, RepositoryError> {
        Ok(AssetVersionRepo::list_by_parent_kind(&self.pool, parent_id, kind.as_str()).await?)
    }
}
