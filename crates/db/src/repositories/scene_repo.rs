//! Ownership lookups over `scenes` and `projects`.

use sqlx::PgPool;

use crate::models::scene::SceneOwner;

pub struct SceneRepo;

impl SceneRepo {
    /// Resolve the owner of a scene through its project. `None` if the scene
    /// does not exist.
    pub async fn find_owner(pool: &PgPool, scene_id: &str) -> Result<Option<SceneOwner>, sqlx::Error> {
        sqlx::query_as::<_, SceneOwner>(
            "SELECT s.id AS scene_id, p.id AS project_id, p.owner_id
             FROM scenes s
             JOIN projects p ON p.id = s.project_id
             WHERE s.id = $1",
        )
        .bind(scene_id)
        .fetch_optional(pool)
        .await
    }
}
