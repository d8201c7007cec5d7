//! Mutable per-session player state, owned by exactly one engine at a time
//! (spec.md §3, "session ownership").

use crate::ids::{ItemId, PlayerId, RoomId, SessionId};
use crate::value_objects::{Attributes, Class, Race};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EquipSlot {
    Head,
    Chest,
    Legs,
    Feet,
    Hands,
    MainHand,
    OffHand,
    Ring,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerState {
    pub session_id: SessionId,
    pub player_id: PlayerId,
    pub name: String,
    pub current_room_id: RoomId,
    pub race: Race,
    pub class: Class,
    pub attributes: Attributes,
    pub hp: i32,
    pub max_hp: i32,
    pub mana: i32,
    pub max_mana: i32,
    pub level: u32,
    pub xp_total: u64,
    pub gold: u64,
    pub ansi_enabled: bool,
    pub is_staff: bool,
    pub equipped: HashMap<EquipSlot, ItemId>,
    pub inventory: Vec<ItemId>,
    /// Ability ids learned so far, populated on login and level-up from the
    /// progression rules (spec.md §4.11).
    pub known_abilities: Vec<String>,
}

impl PlayerState {
    pub fn apply_damage(&mut self, amount: i32) {
        self.hp = (self.hp - amount).max(0);
    }

    pub fn is_dead(&self) -> bool {
        self.hp <= 0
    }

    pub fn heal(&mut self, amount: i32) {
        self.hp = (self.hp + amount).min(self.max_hp);
    }

    pub fn restore_mana(&mut self, amount: i32) {
        self.mana = (self.mana + amount).min(self.max_mana);
    }

    /// Deducts mana, clamped to >= 0 (spec.md §4.9 step 5).
    pub fn spend_mana(&mut self, amount: i32) {
        self.mana = (self.mana - amount).max(0);
    }

    pub fn full_heal(&mut self) {
        self.hp = self.max_hp;
        self.mana = self.max_mana;
    }
}
