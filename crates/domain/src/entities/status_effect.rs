use crate::ids::{ItemId, MobId, PlayerId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusTarget {
    Player(PlayerId),
    Mob(MobId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectKind {
    DamageOverTime,
    HealOverTime,
    StatModifier,
    Stun,
    Root,
    Shield,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StackingRule {
    /// Re-applying from the same source refreshes the remaining duration.
    Refresh,
    /// Stacks up to `max_stacks`, each with its own independent duration.
    Stack { max_stacks: u32 },
    /// A second application from the same source is ignored.
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEffect {
    pub target: StatusTarget,
    pub kind: EffectKind,
    pub magnitude: i32,
    pub duration_ms: i64,
    pub tick_interval_ms: i64,
    pub stacking: StackingRule,
    pub source_ability_id: String,
    pub applied_at_ms: i64,
    pub next_tick_at_ms: i64,
    /// For [`EffectKind::Shield`], the remaining absorption budget.
    pub remaining_shield: i32,
    /// Item used to visually tag the source of a refreshed/stacked effect,
    /// e.g. a thrown potion; unused by core ability casts.
    pub source_item: Option<ItemId>,
}

impl StatusEffect {
    pub fn expires_at_ms(&self) -> i64 {
        self.applied_at_ms + self.duration_ms
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms()
    }

    pub fn is_due(&self, now_ms: i64) -> bool {
        now_ms >= self.next_tick_at_ms
    }

    pub fn advance_tick(&mut self) {
        self.next_tick_at_ms += self.tick_interval_ms;
    }

    /// Refreshes duration from `now_ms`, used by [`StackingRule::Refresh`].
    pub fn refresh(&mut self, now_ms: i64) {
        self.applied_at_ms = now_ms;
    }

    /// Absorbs damage through a shield effect; returns the amount that
    /// still gets through to HP.
    pub fn absorb(&mut self, incoming: i32) -> i32 {
        let absorbed = incoming.min(self.remaining_shield);
        self.remaining_shield -= absorbed;
        incoming - absorbed
    }
}
