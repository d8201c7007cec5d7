use crate::ids::{MobId, PlayerId};
use serde::{Deserialize, Serialize};

/// A single 1v1 engagement (spec.md §4.6). Each player participates in at
/// most one fight and each mob is targeted by at most one player; the
/// combat subsystem enforces that by keying its fight set on both ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fight {
    pub player_id: PlayerId,
    pub mob_id: MobId,
    pub started_at_ms: i64,
    pub next_round_at_ms: i64,
}

impl Fight {
    pub fn is_due(&self, now_ms: i64) -> bool {
        now_ms >= self.next_round_at_ms
    }

    pub fn schedule_next_round(&mut self, now_ms: i64, round_interval_ms: i64) {
        self.next_round_at_ms = now_ms + round_interval_ms;
    }
}
