pub mod asset_version_repo;
pub mod scene_repo;

pub use asset_version_repo::AssetVersionRepo;
pub use scene_repo::SceneRepo;
