//! Relational durable backend (spec.md §4.12 backend (b)): upsert-on-id,
//! a case-insensitive uniqueness index on name, migrated by a small
//! embedded migration runner (teacher's `SqliteSettingsRepo` pattern,
//! generalized from a single table to versioned schema steps).

use super::{NewPlayerRecord, PlayerRepository};
use crate::errors::PersistenceError;
use ambonmud_domain::ids::PlayerId;
use ambonmud_domain::record::{validate_name, validate_password, PlayerRecord};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS players (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        name_lower TEXT NOT NULL,
        record_json TEXT NOT NULL
    );
    CREATE UNIQUE INDEX IF NOT EXISTS players_name_lower_idx ON players(name_lower);
    "#,
];

pub struct SqlRepository {
    pool: SqlitePool,
}

impl SqlRepository {
    pub async fn connect(dsn: &str) -> Result<Self, PersistenceError> {
        let pool = SqlitePool::connect(dsn)
            .await
            .map_err(|e| PersistenceError::Io(e.to_string()))?;
        let repo = Self { pool };
        repo.migrate().await?;
        Ok(repo)
    }

    async fn migrate(&self) -> Result<(), PersistenceError> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::Io(e.to_string()))?;

        let current: i64 = sqlx::query("SELECT COALESCE(MAX(version), 0) AS v FROM schema_version")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PersistenceError::Io(e.to_string()))?
            .try_get("v")
            .unwrap_or(0);

        for (idx, step) in MIGRATIONS.iter().enumerate() {
            let version = (idx + 1) as i64;
            if version <= current {
                continue;
            }
            for statement in step.split(';').map(str::trim).filter(|s| !s.is_empty()) {
                sqlx::query(statement)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| PersistenceError::Io(e.to_string()))?;
            }
            sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
                .bind(version)
                .execute(&self.pool)
                .await
                .map_err(|e| PersistenceError::Io(e.to_string()))?;
        }
        Ok(())
    }

    fn decode_row(row: &sqlx::sqlite::SqliteRow) -> Result<PlayerRecord, PersistenceError> {
        let json: String = row
            .try_get("record_json")
            .map_err(|e| PersistenceError::Io(e.to_string()))?;
        serde_json::from_str(&json).map_err(|e| PersistenceError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl PlayerRepository for SqlRepository {
    async fn find_by_name(&self, name: &str) -> Result<Option<PlayerRecord>, PersistenceError> {
        let row = sqlx::query("SELECT record_json FROM players WHERE name_lower = ?")
            .bind(name.to_ascii_lowercase())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PersistenceError::Io(e.to_string()))?;
        row.as_ref().map(Self::decode_row).transpose()
    }

    async fn find_by_id(&self, id: &PlayerId) -> Result<Option<PlayerRecord>, PersistenceError> {
        let row = sqlx::query("SELECT record_json FROM players WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PersistenceError::Io(e.to_string()))?;
        row.as_ref().map(Self::decode_row).transpose()
    }

    async fn create(&self, new_record: NewPlayerRecord) -> Result<PlayerRecord, PersistenceError> {
        validate_name(&new_record.name).map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        validate_password(&new_record.password_hash, usize::MAX)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;

        let existing = self.find_by_name(&new_record.name).await?;
        if existing.is_some() {
            return Err(PersistenceError::NameTaken(new_record.name));
        }

        let id = PlayerId::new(uuid::Uuid::new_v4().to_string());
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
        self.save(record.clone()).await?;
        Ok(record)
    }

    async fn save(&self, record: PlayerRecord) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(&record).map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        sqlx::query(
            "INSERT INTO players (id, name, name_lower, record_json) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, name_lower = excluded.name_lower, record_json = excluded.record_json",
        )
        .bind(record.id.as_str())
        .bind(&record.name)
        .bind(record.name.to_ascii_lowercase())
        .bind(&json)
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Io(e.to_string()))?;
        Ok(())
    }
}
