//! Loads the immutable [`World`] (rooms, mob/item spawns, zone lifespans)
//! from a single JSON content file at startup (spec.md §3 "Zone... loaded at
//! engine startup"). `World` already derives `Deserialize`, so this is a
//! thin read-and-parse step rather than a bespoke format.

use ambonmud_domain::world::World;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorldLoadError {
    #[error("failed to read world file '{path}': {source}")]
    Io { path: String, source: std::io::Error },
    #[error("failed to parse world file '{path}': {source}")]
    Parse { path: String, source: serde_json::Error },
}

pub async fn load(path: impl AsRef<Path>) -> Result<World, WorldLoadError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| WorldLoadError::Io { path: path.display().to_string(), source })?;
    serde_json::from_slice(&bytes)
        .map_err(|source| WorldLoadError::Parse { path: path.display().to_string(), source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let err = load("/nonexistent/path/world.json").await.unwrap_err();
        assert!(matches!(err, WorldLoadError::Io { .. }));
    }

    #[tokio::test]
    async fn malformed_json_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.json");
        tokio::fs::write(&path, b"not json").await.unwrap();
        let err = load(&path).await.unwrap_err();
        assert!(matches!(err, WorldLoadError::Parse { .. }));
    }

    #[tokio::test]
    async fn well_formed_world_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.json");
        let json = serde_json::json!({
            "rooms": {
                "demo:start": {
                    "id": "demo:start",
                    "title": "The Square",
                    "description": "A quiet square.",
                    "exits": {}
                }
            },
            "start_room": "demo:start",
            "mob_spawns": [],
            "item_spawns": [],
            "zone_lifespans_minutes": {}
        });
        tokio::fs::write(&path, serde_json::to_vec(&json).unwrap()).await.unwrap();
        let world = load(&path).await.unwrap();
        assert!(world.room(&ambonmud_domain::ids::RoomId::new("demo", "start")).is_some());
    }
}
