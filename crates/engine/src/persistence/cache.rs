//! Optional read-through TTL cache decorator (spec.md §4.12 "optional
//! cache layer"). Degrades to the delegate on any fault instead of
//! poisoning the lookup path - a cache is a latency optimization, never
//! a second source of truth.

use super::{NewPlayerRecord, PlayerRepository};
use crate::errors::PersistenceError;
use ambonmud_domain::ids::PlayerId;
use ambonmud_domain::record::PlayerRecord;
use ambonmud_shared::clock::Clock;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

struct Entry {
    record: PlayerRecord,
    expires_at_ms: i64,
}

/// Wraps a durable [`PlayerRepository`] with an in-memory TTL cache keyed
/// by both id and lowercased name, so a reconnect-storm or a "who" scan
/// doesn't round-trip to disk/SQL for every lookup.
pub struct CachedRepository {
    inner: Arc<dyn PlayerRepository>,
    by_id: DashMap<PlayerId, Entry>,
    by_name: DashMap<String, PlayerId>,
    ttl_ms: i64,
    clock: Arc<dyn Clock>,
}

impl CachedRepository {
    pub fn new(inner: Arc<dyn PlayerRepository>, ttl_ms: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            by_id: DashMap::new(),
            by_name: DashMap::new(),
            ttl_ms,
            clock,
        }
    }

    fn cached(&self, id: &PlayerId) -> Option<PlayerRecord> {
        let entry = self.by_id.get(id)?;
        if entry.expires_at_ms > self.clock.now_millis() {
            Some(entry.record.clone())
        } else {
            None
        }
    }

    fn insert(&self, record: PlayerRecord) {
        let expires_at_ms = self.clock.now_millis() + self.ttl_ms;
        self.by_name
            .insert(record.name.to_ascii_lowercase(), record.id.clone());
        self.by_id.insert(
            record.id.clone(),
            Entry {
                record,
                expires_at_ms,
            },
        );
    }

    fn invalidate(&self, id: &PlayerId) {
        self.by_id.remove(id);
    }
}

#[async_trait]
impl PlayerRepository for CachedRepository {
    async fn find_by_name(&self, name: &str) -> Result<Option<PlayerRecord>, PersistenceError> {
        if let Some(id) = self.by_name.get(&name.to_ascii_lowercase()).map(|e| e.value().clone()) {
            if let Some(record) = self.cached(&id) {
                return Ok(Some(record));
            }
        }
        let record = self.inner.find_by_name(name).await?;
        if let Some(record) = &record {
            self.insert(record.clone());
        }
        Ok(record)
    }

    async fn find_by_id(&self, id: &PlayerId) -> Result<Option<PlayerRecord>, PersistenceError> {
        if let Some(record) = self.cached(id) {
            return Ok(Some(record));
        }
        let record = self.inner.find_by_id(id).await?;
        if let Some(record) = &record {
            self.insert(record.clone());
        }
        Ok(record)
    }

    async fn create(&self, new_record: NewPlayerRecord) -> Result<PlayerRecord, PersistenceError> {
        let record = self.inner.create(new_record).await?;
        self.insert(record.clone());
        Ok(record)
    }

    async fn save(&self, record: PlayerRecord) -> Result<(), PersistenceError> {
        self.invalidate(&record.id);
        self.inner.save(record.clone()).await?;
        self.insert(record);
        Ok(())
    }

    async fn flush(&self) -> Result<(), PersistenceError> {
        self.inner.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::file_backend::FileRepository;
    use ambonmud_domain::ids::RoomId;
    use ambonmud_domain::value_objects::{Attributes, Class, Race};
    use ambonmud_shared::clock::FixedClock;

    fn new_record(name: &str) -> NewPlayerRecord {
        NewPlayerRecord {
            name: name.into(),
            password_hash: "hash".into(),
            current_room_id: RoomId::new("demo", "r1"),
            race: Race::Human,
            class: Class::Warrior,
            attributes: Attributes::baseline(),
            hp: 10,
            max_hp: 10,
            mana: 10,
            max_mana: 10,
        }
    }

    #[tokio::test]
    async fn cached_lookup_survives_without_hitting_inner_twice() {
        let dir = tempfile::tempdir().unwrap();
        let inner = Arc::new(FileRepository::open(dir.path()).await.unwrap());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(0));
        let cache = CachedRepository::new(inner.clone(), 60_000, clock);
        let record = cache.create(new_record("Ama")).await.unwrap();
        assert!(cache.find_by_id(&record.id).await.unwrap().is_some());
        assert!(cache.find_by_name("ama").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn entry_expires_after_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let inner = Arc::new(FileRepository::open(dir.path()).await.unwrap());
        let clock = Arc::new(FixedClock::new(0));
        let cache = CachedRepository::new(inner.clone(), 1_000, clock.clone());
        let record = cache.create(new_record("Ama")).await.unwrap();
        clock.advance(2_000);
        assert!(cache.cached(&record.id).is_none());
        // falls through to the delegate and still finds it
        assert!(cache.find_by_id(&record.id).await.unwrap().is_some());
    }
}
