use crate::ids::{ItemId, MobId, RoomId};
use crate::loot::LootTable;
use serde::{Deserialize, Serialize};

/// The small template set of mob behaviors (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MobBehavior {
    Stationary,
    Wander,
    PatrolRoute,
    AggroGuard,
    PatrolAggro,
    WanderAggro,
    Coward,
}

impl MobBehavior {
    pub fn wanders(self) -> bool {
        matches!(
            self,
            Self::Wander | Self::PatrolRoute | Self::PatrolAggro | Self::WanderAggro
        )
    }

    pub fn is_aggressive(self) -> bool {
        matches!(self, Self::AggroGuard | Self::PatrolAggro | Self::WanderAggro)
    }

    pub fn is_coward(self) -> bool {
        matches!(self, Self::Coward)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MobState {
    pub id: MobId,
    pub name: String,
    pub room_id: RoomId,
    pub hp: i32,
    pub max_hp: i32,
    pub min_damage: i32,
    pub max_damage: i32,
    pub armor: i32,
    pub xp_reward: u32,
    pub gold_min: u32,
    pub gold_max: u32,
    pub behavior: MobBehavior,
    pub inventory: Vec<ItemId>,
    /// Scheduler token for the respawn callback, if this mob is configured
    /// to respawn rather than wait for a full zone reset.
    pub respawn_seconds: Option<u64>,
    /// Copied from its `MobSpawnDef` at spawn time; rolled once on death
    /// and granted to the killer (spec.md §4.6).
    pub loot_table: Option<LootTable>,
}

impl MobState {
    pub fn is_dead(&self) -> bool {
        self.hp <= 0
    }

    pub fn apply_damage(&mut self, amount: i32) {
        self.hp = (self.hp - amount).max(0);
    }

    /// Coward behavior flees once HP falls below this fraction of max HP
    /// (spec.md §4.7, "coward flees when below an HP-percent threshold").
    pub fn below_flee_threshold(&self, threshold_pct: f64) -> bool {
        if self.max_hp == 0 {
            return false;
        }
        (self.hp as f64 / self.max_hp as f64) < threshold_pct
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coward_flees_below_threshold() {
        let mob = MobState {
            id: MobId::new("demo", "rat"),
            name: "rat".into(),
            room_id: RoomId::new("demo", "r1"),
            hp: 2,
            max_hp: 10,
            min_damage: 1,
            max_damage: 2,
            armor: 0,
            xp_reward: 5,
            gold_min: 0,
            gold_max: 1,
            behavior: MobBehavior::Coward,
            inventory: vec![],
            respawn_seconds: None,
            loot_table: None,
        };
        assert!(mob.below_flee_threshold(0.3));
    }

    #[test]
    fn behavior_classification() {
        assert!(MobBehavior::WanderAggro.wanders());
        assert!(MobBehavior::WanderAggro.is_aggressive());
        assert!(!MobBehavior::Stationary.wanders());
        assert!(MobBehavior::Coward.is_coward());
    }
}
