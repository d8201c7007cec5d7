//! The persistence stack (spec.md §4.12): a `PlayerRepository` port,
//! implemented by two durable backends, composed under write-coalescing and
//! an optional cache decorator.

pub mod cache;
pub mod coalescing;
pub mod file_backend;
pub mod sql_backend;

use crate::errors::PersistenceError;
use ambonmud_domain::ids::PlayerId;
use ambonmud_domain::record::PlayerRecord;
use ambonmud_domain::value_objects::{Attributes, Class, Race};
use async_trait::async_trait;

/// Fields needed to create a new account; the backend allocates the id and
/// `created_at`/`last_seen_at` atomically (spec.md §4.12 `create(...)`).
#[derive(Debug, Clone)]
pub struct NewPlayerRecord {
    pub name: String,
    pub password_hash: String,
    pub current_room_id: ambonmud_domain::ids::RoomId,
    pub race: Race,
    pub class: Class,
    pub attributes: Attributes,
    pub hp: i32,
    pub max_hp: i32,
    pub mana: i32,
    pub max_mana: i32,
}

#[async_trait]
pub trait PlayerRepository: Send + Sync {
    async fn find_by_name(&self, name: &str) -> Result<Option<PlayerRecord>, PersistenceError>;
    async fn find_by_id(&self, id: &PlayerId) -> Result<Option<PlayerRecord>, PersistenceError>;
    async fn create(&self, new_record: NewPlayerRecord) -> Result<PlayerRecord, PersistenceError>;
    async fn save(&self, record: PlayerRecord) -> Result<(), PersistenceError>;
    /// Forces any buffered writes to durable storage before returning.
    /// A no-op for backends with no buffering of their own.
    async fn flush(&self) -> Result<(), PersistenceError> {
        Ok(())
    }
}
