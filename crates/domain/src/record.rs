//! The persistable player record (spec.md §3). Forward-compatible:
//! `#[serde(default)]` on every field added after the first release means
//! unknown/missing fields degrade gracefully instead of failing to load.

use crate::ids::{ItemId, PlayerId, RoomId};
use crate::entities::player_state::EquipSlot;
use crate::value_objects::{Attributes, Class, Race};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub name: String,
    pub password_hash: String,
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
    pub created_at_ms: i64,
    pub last_seen_at_ms: i64,
    #[serde(default = "default_true")]
    pub ansi_enabled: bool,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub inventory: Vec<ItemId>,
    #[serde(default)]
    pub equipped: HashMap<EquipSlot, ItemId>,
    #[serde(default)]
    pub achievements: Vec<String>,
    #[serde(default)]
    pub quest_log: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

/// Validates the name/password rules from spec.md §3 at creation time.
pub fn validate_name(name: &str) -> Result<(), crate::DomainError> {
    let ok_len = (2..=16).contains(&name.len());
    let starts_alpha = name.chars().next().is_some_and(|c| !c.is_ascii_digit());
    let ok_chars = name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok_len && starts_alpha && ok_chars {
        Ok(())
    } else {
        Err(crate::DomainError::InvalidName)
    }
}

pub fn validate_password(password: &str, max_len: usize) -> Result<(), crate::DomainError> {
    if !password.is_empty() && password.len() <= max_len {
        Ok(())
    } else {
        Err(crate::DomainError::InvalidPassword { max: max_len })
    }
}
