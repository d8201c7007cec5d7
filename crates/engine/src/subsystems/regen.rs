//! Per-player HP/mana regeneration (spec.md §4.8). Each axis has its own
//! due timer per player; constitution speeds HP regen, wisdom speeds mana
//! regen, both clamped to a minimum interval so a stacked attribute bonus
//! can never turn into a tick-starving busy loop.

use crate::registry::PlayerRegistry;
use ambonmud_domain::ids::SessionId;
use ambonmud_shared::config::{RegenAxisConfig, RegenConfig};
use ambonmud_shared::gmcp::GmcpSubscription;
use std::collections::HashMap;

/// Per-session due timers for each regen axis, owned by the engine
/// alongside the player registry rather than inside `PlayerState` itself -
/// regen cadence is a simulation detail, not persisted player data.
#[derive(Debug, Default)]
pub struct RegenTimers {
    next_hp_at_ms: HashMap<SessionId, i64>,
    next_mana_at_ms: HashMap<SessionId, i64>,
}

impl RegenTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear_session(&mut self, session_id: SessionId) {
        self.next_hp_at_ms.remove(&session_id);
        self.next_mana_at_ms.remove(&session_id);
    }
}

/// Interval in millis for one player, modulated by the relevant attribute
/// and clamped to `min_interval_millis` (spec.md §4.8).
fn effective_interval_ms(axis: &RegenAxisConfig, attribute: i32) -> i64 {
    let modifier = 1.0 - (attribute - 10).max(0) as f64 * axis.attribute_modifier;
    let scaled = (axis.base_interval_millis as f64 * modifier.max(0.1)) as i64;
    scaled.max(axis.min_interval_millis)
}

/// Ticks HP and mana regen for every logged-in player. Bounded work per
/// tick: one player is at most two map lookups plus a due check, so this
/// never starves under a large population (spec.md §4.8 "bounded work per
/// tick to avoid starvation under high player counts").
pub fn tick(
    registry: &mut PlayerRegistry,
    timers: &mut RegenTimers,
    config: &RegenConfig,
    subscriptions: &mut HashMap<SessionId, GmcpSubscription>,
    now_ms: i64,
) {
    let session_ids: Vec<SessionId> = registry.all_players().map(|p| p.session_id).collect();
    for session_id in session_ids {
        let Some(player) = registry.player_mut(session_id) else {
            continue;
        };
        let mut dirty = false;

        let hp_due_at = *timers.next_hp_at_ms.entry(session_id).or_insert(now_ms);
        if now_ms >= hp_due_at && player.hp < player.max_hp {
            player.heal(config.hp.regen_amount);
            dirty = true;
        }
        if now_ms >= hp_due_at {
            let interval = effective_interval_ms(&config.hp, player.attributes.constitution);
            timers.next_hp_at_ms.insert(session_id, now_ms + interval);
        }

        let mana_due_at = *timers.next_mana_at_ms.entry(session_id).or_insert(now_ms);
        if now_ms >= mana_due_at && player.mana < player.max_mana {
            player.restore_mana(config.mana.regen_amount);
            dirty = true;
        }
        if now_ms >= mana_due_at {
            let interval = effective_interval_ms(&config.mana, player.attributes.wisdom);
            timers.next_mana_at_ms.insert(session_id, now_ms + interval);
        }

        if dirty {
            if let Some(sub) = subscriptions.get_mut(&session_id) {
                sub.mark_dirty("char.vitals");
            }
        }
    }
}
