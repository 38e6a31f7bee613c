//! Job manifest: a JSON array of queue entries.
//!
//! ```json
//! [
//!   { "entity_id": "scene-1", "request": { "kind": "image", "prompt": "a red door" } },
//!   { "entity_id": "scene-1", "provider": "reel",
//!     "request": { "kind": "clip", "prompt": "door opens", "reference_url": "https://cdn/door.png" } }
//! ]
//! ```

use std::path::Path;

use scenegen_orchestrator::QueueEntry;

use crate::WorkerError;

pub async fn load_manifest(path: &Path) -> Result<Vec<QueueEntry>, WorkerError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| WorkerError::ManifestRead {
            path: path.display().to_string(),
            source,
        })?;
    parse_manifest(&raw).map_err(|source| WorkerError::ManifestFormat {
        path: path.display().to_string(),
        source,
    })
}

pub fn parse_manifest(raw: &str) -> Result<Vec<QueueEntry>, serde_json::Error> {
    serde_json::from_str(raw)
}
