//! Scene ownership projection.

use serde::Serialize;
use sqlx::FromRow;
use scenegen_core::types::DbId;

/// A scene joined with the owner of its project.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SceneOwner {
    pub scene_id: String,
    pub project_id: DbId,
    pub owner_id: DbId,
}
