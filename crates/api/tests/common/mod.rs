#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use scenegen_api::auth::jwt::{generate_access_token, JwtConfig};
use scenegen_api::config::{ServerConfig, StorageConfig};
use scenegen_api::router::build_app_router;
use scenegen_api::state::AppState;
use scenegen_api::store::{
    AssetRepository, BlobError, BlobStore, RepositoryError, SourceFetcher, StoreAssetRequest,
    VersionedAssetStore,
};
use scenegen_core::asset::{encode_data_uri, AssetKind};
use scenegen_core::types::DbId;
use scenegen_db::models::asset_version::{AssetVersion, CreateAssetVersion};

pub const OWNER: DbId = 7;
pub const STRANGER: DbId = 8;
/// `created_by` of rows planted by simulated competing writers.
pub const RIVAL: DbId = 999;

// ---------------------------------------------------------------------------
// In-memory repository
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RepoState {
    owners: HashMap<String, DbId>,
    rows: Vec<AssetVersion>,
    next_id: DbId,
    injected_conflicts: usize,
    unhealthy: bool,
}

/// [`AssetRepository`] enforcing `(parent_id, kind, version)` uniqueness.
///
/// Every call yields once so concurrent writers interleave.
#[derive(Default)]
pub struct MemoryRepository {
    state: Mutex<RepoState>,
}

impl MemoryRepository {
    pub fn with_scene(scene_id: &str, owner: DbId) -> Arc<Self> {
        let repo = Self::default();
        repo.add_scene(scene_id, owner);
        Arc::new(repo)
    }

    pub fn add_scene(&self, scene_id: &str, owner: DbId) {
        self.state
            .lock()
            .unwrap()
            .owners
            .insert(scene_id.to_string(), owner);
    }

    /// The next `n` inserts lose to a rival writer that records the same
    /// version first.
    pub fn inject_conflicts(&self, n: usize) {
        self.state.lock().unwrap().injected_conflicts = n;
    }

    pub fn set_unhealthy(&self) {
        self.state.lock().unwrap().unhealthy = true;
    }

    pub fn rows(&self) -> Vec<AssetVersion> {
        self.state.lock().unwrap().rows.clone()
    }

    pub fn rows_by(&self, created_by: DbId) -> Vec<AssetVersion> {
        self.rows()
            .into_iter()
            .filter(|r| r.created_by == created_by)
            .collect()
    }
}

fn row_from(input: &CreateAssetVersion, id: DbId, created_by: DbId) -> AssetVersion {
    AssetVersion {
        id,
        parent_id: input.parent_id.clone(),
        kind: input.kind.clone(),
        version: input.version,
        storage_path: input.storage_path.clone(),
        storage_url: input.storage_url.clone(),
        mime_type: input.mime_type.clone(),
        metadata: input.metadata.clone(),
        created_by,
        created_at: chrono::Utc::now(),
    }
}

#[async_trait]
impl AssetRepository for MemoryRepository {
    async fn health_check(&self) -> Result<(), RepositoryError> {
        if self.state.lock().unwrap().unhealthy {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    async fn owner_of(&self, parent_id: &str) -> Result<Option<DbId>, RepositoryError> {
        Ok(self.state.lock().unwrap().owners.get(parent_id).copied())
    }

    async fn next_version(&self, parent_id: &str, kind: AssetKind) -> Result<i32, RepositoryError> {
        tokio::task::yield_now().await;
        let state = self.state.lock().unwrap();
        let max = state
            .rows
            .iter()
            .filter(|r| r.parent_id == parent_id && r.kind == kind.as_str())
            .map(|r| r.version)
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }

    async fn insert(&self, input: &CreateAssetVersion) -> Result<AssetVersion, RepositoryError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        let conflict = || RepositoryError::Conflict {
            constraint: "uq_asset_versions_parent_kind_version".into(),
        };

        if state.injected_conflicts > 0 {
            state.injected_conflicts -= 1;
            state.next_id += 1;
            let rival = row_from(input, state.next_id, RIVAL);
            state.rows.push(rival);
            return Err(conflict());
        }

        let taken = state.rows.iter().any(|r| {
            r.parent_id == input.parent_id && r.kind == input.kind && r.version == input.version
        });
        if taken {
            return Err(conflict());
        }

        state.next_id += 1;
        let row = row_from(input, state.next_id, input.created_by);
        state.rows.push(row.clone());
        Ok(row)
    }

    async fn list(&self, parent_id: &str, kind: AssetKind) -> Result<Vec<AssetVersion>, RepositoryError> {
        let mut rows: Vec<_> = self
            .rows()
            .into_iter()
            .filter(|r| r.parent_id == parent_id && r.kind == kind.as_str())
            .collect();
        rows.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// In-memory blob store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    deletes: Mutex<Vec<String>>,
}

impl MemoryBlobStore {
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<_> = self.blobs.lock().unwrap().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn contains(&self, path: &str) -> bool {
        self.blobs.lock().unwrap().contains_key(path)
    }

    /// Paths passed to `delete`, in call order.
    pub fn deletes(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_new(&self, path: &str, bytes: &[u8], _mime_type: &str) -> Result<String, BlobError> {
        tokio::task::yield_now().await;
        let mut blobs = self.blobs.lock().unwrap();
        if blobs.contains_key(path) {
            return Err(BlobError::AlreadyExists(path.to_string()));
        }
        blobs.insert(path.to_string(), bytes.to_vec());
        Ok(format!("mem://{path}"))
    }

    async fn delete(&self, path: &str) -> Result<(), BlobError> {
        self.deletes.lock().unwrap().push(path.to_string());
        self.blobs.lock().unwrap().remove(path);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn test_jwt() -> JwtConfig {
    JwtConfig {
        secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
        access_token_expiry_mins: 15,
    }
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        fetch_timeout_secs: 5,
        max_artifact_bytes: 16 * 1024 * 1024,
        jwt: test_jwt(),
        storage: StorageConfig {
            root: PathBuf::from("unused"),
            public_base_url: "mem://".to_string(),
        },
    }
}

pub fn build_store(repo: Arc<MemoryRepository>, blobs: Arc<MemoryBlobStore>) -> Arc<VersionedAssetStore> {
    let fetcher = SourceFetcher::new(reqwest::Client::new(), Duration::from_secs(5));
    Arc::new(VersionedAssetStore::new(repo, blobs, fetcher))
}

/// Full router with production middleware over in-memory storage.
pub fn build_test_app(repo: Arc<MemoryRepository>, blobs: Arc<MemoryBlobStore>) -> Router {
    build_test_app_with(repo, blobs, test_config())
}

pub fn build_test_app_with(
    repo: Arc<MemoryRepository>,
    blobs: Arc<MemoryBlobStore>,
    config: ServerConfig,
) -> Router {
    let state = AppState {
        config: Arc::new(config.clone()),
        store: build_store(repo, blobs),
    };
    build_app_router(state, &config)
}

pub fn bearer(user_id: DbId) -> String {
    let token = generate_access_token(user_id, "service", &test_jwt()).unwrap();
    format!("Bearer {token}")
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::new_rgb8(width, height)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

pub fn png_data_uri(width: u32, height: u32) -> String {
    encode_data_uri("image/png", &png_bytes(width, height))
}

/// PNG of pseudo-random pixels, which barely compresses.
pub fn noisy_png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut seed: u32 = 0x9e37_79b9;
    let img = image::RgbImage::from_fn(width, height, |_, _| {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        let [r, g, b, _] = seed.to_le_bytes();
        image::Rgb([r, g, b])
    });
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

pub fn image_request(parent_id: &str, owner_id: DbId, source: String) -> StoreAssetRequest {
    StoreAssetRequest {
        parent_id: parent_id.to_string(),
        kind: AssetKind::Image,
        owner_id,
        source,
        mime_hint: None,
        metadata: None,
    }
}

/// Serve `router` on an ephemeral port; returns the base URL.
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}
