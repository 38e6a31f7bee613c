pub mod asset_version;
pub mod scene;
