//! Write-coalescing decorator (spec.md §4.12 "buffers saves in memory and
//! flushes to the durable backend on `flushIntervalMs`, with a forced
//! flush on shutdown"). `save()` only marks a record dirty; a background
//! task drains the dirty map on an interval and retries failed writes
//! with backoff rather than dropping them.

use super::{NewPlayerRecord, PlayerRepository};
use crate::errors::PersistenceError;
use ambonmud_domain::ids::PlayerId;
use ambonmud_domain::record::PlayerRecord;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const MAX_BACKOFF_MS: u64 = 30_000;

pub struct CoalescingRepository {
    inner: Arc<dyn PlayerRepository>,
    dirty: DashMap<PlayerId, PlayerRecord>,
    flush_interval_ms: u64,
    consecutive_failures: AtomicU32,
}

impl CoalescingRepository {
    pub fn new(inner: Arc<dyn PlayerRepository>, flush_interval_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            inner,
            dirty: DashMap::new(),
            flush_interval_ms: flush_interval_ms.max(1),
            consecutive_failures: AtomicU32::new(0),
        })
    }

    /// Spawns the background flusher. The returned handle should be
    /// aborted (after a final [`Self::flush`]) on shutdown.
    pub fn spawn_flusher(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let repo = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(repo.flush_interval_ms)).await;
                if let Err(e) = repo.flush().await {
                    warn!(error = %e, "periodic flush failed, records remain dirty");
                }
            }
        })
    }

    fn backoff_delay(&self) -> Duration {
        let failures = self.consecutive_failures.load(Ordering::Relaxed);
        let ms = (self.flush_interval_ms.saturating_mul(1u64 << failures.min(10))).min(MAX_BACKOFF_MS);
        Duration::from_millis(ms)
    }
}

#[async_trait]
impl PlayerRepository for CoalescingRepository {
    async fn find_by_name(&self, name: &str) -> Result<Option<PlayerRecord>, PersistenceError> {
        let key = name.to_ascii_lowercase();
        if let Some(record) = self
            .dirty
            .iter()
            .find(|entry| entry.value().name.to_ascii_lowercase() == key)
        {
            return Ok(Some(record.value().clone()));
        }
        self.inner.find_by_name(name).await
    }

    async fn find_by_id(&self, id: &PlayerId) -> Result<Option<PlayerRecord>, PersistenceError> {
        if let Some(record) = self.dirty.get(id) {
            return Ok(Some(record.value().clone()));
        }
        self.inner.find_by_id(id).await
    }

    async fn create(&self, new_record: NewPlayerRecord) -> Result<PlayerRecord, PersistenceError> {
        // Account creation must enforce name uniqueness immediately, so it
        // bypasses the buffer and writes straight through.
        self.inner.create(new_record).await
    }

    /// Buffers the write; the background flusher (or an explicit
    /// [`Self::flush`]) is responsible for making it durable.
    async fn save(&self, record: PlayerRecord) -> Result<(), PersistenceError> {
        self.dirty.insert(record.id.clone(), record);
        Ok(())
    }

    /// Drains the dirty map to the durable backend. Records that fail to
    /// persist are put back for the next attempt; repeated failures grow
    /// the retry delay up to [`MAX_BACKOFF_MS`].
    async fn flush(&self) -> Result<(), PersistenceError> {
        let pending: Vec<(PlayerId, PlayerRecord)> = self
            .dirty
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        let mut last_err = None;
        for (id, record) in pending {
            match self.inner.save(record).await {
                Ok(()) => {
                    self.dirty.remove(&id);
                }
                Err(e) => {
                    warn!(player_id = %id.as_str(), error = %e, "flush failed, will retry");
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) => {
                self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(self.backoff_delay()).await;
                Err(e)
            }
            None => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::file_backend::FileRepository;
    use ambonmud_domain::ids::RoomId;
    use ambonmud_domain::value_objects::{Attributes, Class, Race};

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
    async fn save_buffers_until_flush() {
        let dir = tempfile::tempdir().unwrap();
        let inner = Arc::new(FileRepository::open(dir.path()).await.unwrap());
        let record = inner.create(new_record("Ama")).await.unwrap();
        let coalescing = CoalescingRepository::new(inner.clone(), 60_000);

        let mut updated = record.clone();
        updated.gold = 99;
        coalescing.save(updated.clone()).await.unwrap();

        // visible through the coalescing facade immediately
        let seen = coalescing.find_by_id(&record.id).await.unwrap().unwrap();
        assert_eq!(seen.gold, 99);

        // but not yet durable in the backend until flushed
        let on_disk = inner.find_by_id(&record.id).await.unwrap().unwrap();
        assert_eq!(on_disk.gold, 0);

        coalescing.flush().await.unwrap();
        let on_disk = inner.find_by_id(&record.id).await.unwrap().unwrap();
        assert_eq!(on_disk.gold, 99);
    }

    #[tokio::test]
    async fn flush_is_a_no_op_when_nothing_is_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let inner = Arc::new(FileRepository::open(dir.path()).await.unwrap());
        let coalescing = CoalescingRepository::new(inner, 60_000);
        assert!(coalescing.flush().await.is_ok());
    }
}
