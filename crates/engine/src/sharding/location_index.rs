//! Optional distributed `lowercaseName -> {engineId, sessionId}` map (spec.md
//! §4.13 "Player location index"). Enables O(1) cross-engine `tell` routing;
//! an absent or stale entry just means the caller falls back to
//! broadcast-and-collect instead of failing outright.

use ambonmud_domain::ids::{EngineId, SessionId};
use dashmap::DashMap;

struct LocationEntry {
    engine_id: EngineId,
    session_id: SessionId,
    last_seen_at_ms: i64,
}

pub struct PlayerLocationIndex {
    entries: DashMap<String, LocationEntry>,
}

impl PlayerLocationIndex {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    /// Refreshes (or inserts) this player's location, keyed by lowercased
    /// name. Called on login, handoff admission, and on a periodic
    /// heartbeat so entries don't go stale while the player just sits still.
    pub fn update(&self, name: &str, engine_id: EngineId, session_id: SessionId, now_ms: i64) {
        self.entries.insert(
            name.to_ascii_lowercase(),
            LocationEntry { engine_id, session_id, last_seen_at_ms: now_ms },
        );
    }

    pub fn remove(&self, name: &str) {
        self.entries.remove(&name.to_ascii_lowercase());
    }

    /// `Some` only if the entry exists and was refreshed within `ttl_ms`.
    pub fn lookup(&self, name: &str, ttl_ms: i64, now_ms: i64) -> Option<(EngineId, SessionId)> {
        let entry = self.entries.get(&name.to_ascii_lowercase())?;
        if now_ms - entry.last_seen_at_ms > ttl_ms {
            return None;
        }
        Some((entry.engine_id.clone(), entry.session_id))
    }
}

impl Default for PlayerLocationIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entry_resolves() {
        let index = PlayerLocationIndex::new();
        index.update("Ama", EngineId::new("engine-a"), SessionId(1), 1_000);
        assert_eq!(
            index.lookup("ama", 5_000, 2_000),
            Some((EngineId::new("engine-a"), SessionId(1)))
        );
    }

    #[test]
    fn stale_entry_is_not_returned() {
        let index = PlayerLocationIndex::new();
        index.update("Ama", EngineId::new("engine-a"), SessionId(1), 0);
        assert_eq!(index.lookup("ama", 1_000, 5_000), None);
    }

    #[test]
    fn removed_entry_is_not_returned() {
        let index = PlayerLocationIndex::new();
        index.update("Ama", EngineId::new("engine-a"), SessionId(1), 0);
        index.remove("ama");
        assert_eq!(index.lookup("ama", 1_000, 0), None);
    }
}
