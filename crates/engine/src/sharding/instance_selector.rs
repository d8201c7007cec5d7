//! Power-of-two-choices instance selection (spec.md §4.13 "Instance
//! selection"). Each engine publishes a periodic [`LoadSnapshot`]; picking
//! among `REPLICATED_ENTRY` candidates (or choosing a login/handoff target
//! for a scaled zone) samples two healthy candidates and keeps the
//! lower-scored one. Missing or stale telemetry falls back to a random pick
//! rather than blocking.

use ambonmud_domain::ids::EngineId;
use ambonmud_domain::random::RandomSource;
use ambonmud_shared::config::ShardingSelectionConfig;
use ambonmud_shared::inter_engine::InterEngineMessage;
use dashmap::DashMap;

#[derive(Debug, Clone, Copy)]
struct Load {
    active_sessions: u32,
    in_transit_handoffs: u32,
    queue_pressure: f64,
}

impl Load {
    /// Lower is "more room". In-transit handoffs count double since a
    /// candidate mid-handoff is about to get busier than its current
    /// session count shows.
    fn score(&self) -> f64 {
        self.active_sessions as f64 + self.in_transit_handoffs as f64 * 2.0 + self.queue_pressure
    }
}

/// Gossiped load telemetry, most recent snapshot per engine.
pub struct LoadSnapshotStore {
    snapshots: DashMap<EngineId, (Load, i64)>,
}

impl LoadSnapshotStore {
    pub fn new() -> Self {
        Self { snapshots: DashMap::new() }
    }

    pub fn record(&self, message: &InterEngineMessage, now_ms: i64) {
        if let InterEngineMessage::LoadSnapshot { engine_id, active_sessions, in_transit_handoffs, queue_pressure, .. } =
            message
        {
            self.snapshots.insert(
                engine_id.clone(),
                (
                    Load {
                        active_sessions: *active_sessions,
                        in_transit_handoffs: *in_transit_handoffs,
                        queue_pressure: *queue_pressure,
                    },
                    now_ms,
                ),
            );
        }
    }

    fn is_fresh(&self, engine_id: &EngineId, ttl_ms: i64, now_ms: i64) -> bool {
        self.snapshots
            .get(engine_id)
            .is_some_and(|entry| now_ms - entry.1 <= ttl_ms)
    }

    fn score_of(&self, engine_id: &EngineId) -> Option<f64> {
        self.snapshots.get(engine_id).map(|entry| entry.0.score())
    }

    /// Picks one candidate. Falls back to a uniform random choice when fewer
    /// than two candidates have fresh telemetry - `health_failure_threshold`
    /// is the number of engines the power-of-two comparison requires to be
    /// live before it trusts the scores over a coin flip.
    pub fn select(
        &self,
        candidates: &[EngineId],
        config: &ShardingSelectionConfig,
        rng: &mut dyn RandomSource,
        now_ms: i64,
    ) -> Option<EngineId> {
        if candidates.is_empty() {
            return None;
        }
        if candidates.len() == 1 {
            return Some(candidates[0].clone());
        }

        let ttl_ms = (config.load_ttl_seconds as i64) * 1000;
        let healthy: Vec<&EngineId> =
            candidates.iter().filter(|id| self.is_fresh(id, ttl_ms, now_ms)).collect();

        if healthy.len() < (config.health_failure_threshold.max(2) as usize).min(candidates.len()) {
            let pick = rng.gen_range(0, candidates.len() as i32 - 1) as usize;
            return Some(candidates[pick].clone());
        }

        let first_idx = rng.gen_range(0, healthy.len() as i32 - 1) as usize;
        let second_idx = rng.gen_range(0, healthy.len() as i32 - 1) as usize;
        let first = healthy[first_idx];
        let second = healthy[second_idx];

        let first_score = self.score_of(first).unwrap_or(f64::MAX);
        let second_score = self.score_of(second).unwrap_or(f64::MAX);
        if first_score <= second_score {
            Some(first.clone())
        } else {
            Some(second.clone())
        }
    }
}

impl Default for LoadSnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambonmud_domain::ids::ZoneId;
    use ambonmud_domain::random::FixedSequenceRandom;

    fn config() -> ShardingSelectionConfig {
        ShardingSelectionConfig {
            strategy: "power-of-two-choices".into(),
            load_ttl_seconds: 10,
            health_failure_threshold: 2,
        }
    }

    #[test]
    fn picks_lower_scored_of_two_fresh_candidates() {
        let store = LoadSnapshotStore::new();
        store.record(
            &InterEngineMessage::LoadSnapshot {
                engine_id: EngineId::new("busy"),
                zone: ZoneId::new("arena"),
                active_sessions: 50,
                in_transit_handoffs: 0,
                queue_pressure: 0.0,
            },
            0,
        );
        store.record(
            &InterEngineMessage::LoadSnapshot {
                engine_id: EngineId::new("quiet"),
                zone: ZoneId::new("arena"),
                active_sessions: 2,
                in_transit_handoffs: 0,
                queue_pressure: 0.0,
            },
            0,
        );
        let candidates = vec![EngineId::new("busy"), EngineId::new("quiet")];
        let mut rng = FixedSequenceRandom::constant(0, 0.0);
        let chosen = store.select(&candidates, &config(), &mut rng, 1_000).unwrap();
        assert_eq!(chosen, EngineId::new("quiet"));
    }

    #[test]
    fn falls_back_to_random_when_telemetry_missing() {
        let store = LoadSnapshotStore::new();
        let candidates = vec![EngineId::new("a"), EngineId::new("b")];
        let mut rng = FixedSequenceRandom::constant(1, 0.0);
        let chosen = store.select(&candidates, &config(), &mut rng, 1_000).unwrap();
        assert_eq!(chosen, EngineId::new("b"));
    }

    #[test]
    fn single_candidate_short_circuits() {
        let store = LoadSnapshotStore::new();
        let candidates = vec![EngineId::new("only")];
        let mut rng = FixedSequenceRandom::constant(0, 0.0);
        assert_eq!(store.select(&candidates, &config(), &mut rng, 0), Some(EngineId::new("only")));
    }
}
