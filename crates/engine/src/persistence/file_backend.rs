//! File-per-record durable backend (spec.md §4.12 backend (a)): one JSON
//! file per `PlayerRecord`, atomic temp-file-then-rename writes, and a
//! monotonic id counter file. No crate beyond `std::fs`/`tokio::fs` is
//! needed here (SPEC_FULL.md §B).

use super::{NewPlayerRecord, PlayerRepository};
use crate::errors::PersistenceError;
use ambonmud_domain::ids::PlayerId;
use ambonmud_domain::record::{validate_name, validate_password, PlayerRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

struct Inner {
    /// lowercase name -> id, rebuilt by scanning the directory at startup
    /// and kept current on every create/save.
    name_index: HashMap<String, PlayerId>,
    next_id: u64,
}

pub struct FileRepository {
    dir: PathBuf,
    inner: Mutex<Inner>,
}

impl FileRepository {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| PersistenceError::Io(e.to_string()))?;

        let mut name_index = HashMap::new();
        let mut max_id_seen: u64 = 0;
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| PersistenceError::Io(e.to_string()))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PersistenceError::Io(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| PersistenceError::Io(e.to_string()))?;
            let record: PlayerRecord = serde_json::from_slice(&bytes)
                .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
            if let Ok(n) = record.id.as_str().parse::<u64>() {
                max_id_seen = max_id_seen.max(n);
            }
            name_index.insert(record.name.to_ascii_lowercase(), record.id.clone());
        }

        Ok(Self {
            dir,
            inner: Mutex::new(Inner {
                name_index,
                next_id: max_id_seen + 1,
            }),
        })
    }

    fn path_for(&self, id: &PlayerId) -> PathBuf {
        self.dir.join(format!("{}.json", id.as_str()))
    }

    async fn write_atomic(&self, record: &PlayerRecord) -> Result<(), PersistenceError> {
        let final_path = self.path_for(&record.id);
        let tmp_path = self.dir.join(format!("{}.json.tmp", record.id.as_str()));
        let bytes = serde_json::to_vec_pretty(record)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        tokio::fs::write(&tmp_path, bytes)
            .await
            .map_err(|e| PersistenceError::Io(e.to_string()))?;
        tokio::fs::rename(&tmp_path, &final_path)
            .await
            .map_err(|e| PersistenceError::Io(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl PlayerRepository for FileRepository {
    async fn find_by_name(&self, name: &str) -> Result<Option<PlayerRecord>, PersistenceError> {
        let id = {
            let inner = self.inner.lock().await;
            inner.name_index.get(&name.to_ascii_lowercase()).cloned()
        };
        match id {
            Some(id) => self.find_by_id(&id).await,
            None => Ok(None),
        }
    }

    async fn find_by_id(&self, id: &PlayerId) -> Result<Option<PlayerRecord>, PersistenceError> {
        let path = self.path_for(id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let record = serde_json::from_slice(&bytes)
                    .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
                Ok(Some(record))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistenceError::Io(e.to_string())),
        }
    }

    async fn create(&self, new_record: NewPlayerRecord) -> Result<PlayerRecord, PersistenceError> {
        validate_name(&new_record.name).map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        validate_password(&new_record.password_hash, usize::MAX)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;

        let mut inner = self.inner.lock().await;
        let key = new_record.name.to_ascii_lowercase();
        if inner.name_index.contains_key(&key) {
            return Err(PersistenceError::NameTaken(new_record.name));
        }
        let id = PlayerId::new(inner.next_id.to_string());
        inner.next_id += 1;

        let now = chrono::Utc::now().timestamp_millis();
        let record = PlayerRecord {
            id: id.clone(),
            name: new_record.name,
            password_hash: new_record.password_hash,
            current_room_id: new_record.current_room_id,
            race: new_record.race,
            class: new_record.class,
            attributes: new_record.attributes,
            hp: new_record.hp,
            max_hp: new_record.max_hp,
            mana: new_record.mana,
            max_mana: new_record.max_mana,
            level: 1,
            xp_total: 0,
            gold: 0,
            created_at_ms: now,
            last_seen_at_ms: now,
            ansi_enabled: true,
            is_staff: false,
            inventory: Vec::new(),
            equipped: HashMap::new(),
            achievements: Vec::new(),
            quest_log: HashMap::new(),
        };
        self.write_atomic(&record).await?;
        inner.name_index.insert(key, id);
        Ok(record)
    }

    async fn save(&self, record: PlayerRecord) -> Result<(), PersistenceError> {
        {
            let mut inner = self.inner.lock().await;
            inner
                .name_index
                .insert(record.name.to_ascii_lowercase(), record.id.clone());
        }
        self.write_atomic(&record).await
    }
}

/// Convenience alias used at the composition root when wiring either
/// durable backend behind the same `Arc<dyn PlayerRepository>`.
pub type SharedFileRepository = Arc<FileRepository>;
