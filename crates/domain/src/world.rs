//! The immutable, loaded world. Everything here is consumed as a value by
//! the engine; loading it from YAML content is out of scope for the core
//! (spec.md §1) - construction is just `World { .. }` literal or whatever a
//! future content-loader crate produces.

use crate::ids::{ItemTemplateId, MobSpawnId, RoomId, ZoneId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    South,
    East,
    West,
    Up,
    Down,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Self::North => Self::South,
            Self::South => Self::North,
            Self::East => Self::West,
            Self::West => Self::East,
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }

    pub const ALL: [Direction; 6] = [
        Self::North,
        Self::South,
        Self::East,
        Self::West,
        Self::Up,
        Self::Down,
    ];

    /// Normalizes a parser token (`n`, `north`, `ne` reserved for future
    /// diagonal support) to its canonical enum value. Returns `None` for
    /// anything unrecognized.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "n" | "north" => Some(Self::North),
            "s" | "south" => Some(Self::South),
            "e" | "east" => Some(Self::East),
            "w" | "west" => Some(Self::West),
            "u" | "up" => Some(Self::Up),
            "d" | "down" => Some(Self::Down),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::North => "north",
            Self::South => "south",
            Self::East => "east",
            Self::West => "west",
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub title: String,
    pub description: String,
    pub exits: HashMap<Direction, RoomId>,
}

impl Room {
    pub fn zone(&self) -> &str {
        self.id.zone()
    }

    /// An exit is a cross-zone boundary when its target room's zone differs
    /// from this room's zone (spec.md §3, "zone containment").
    pub fn is_cross_zone_exit(&self, direction: Direction) -> Option<bool> {
        self.exits
            .get(&direction)
            .map(|target| target.zone() != self.zone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MobSpawnDef {
    pub id: MobSpawnId,
    pub template_name: String,
    pub room_id: RoomId,
    pub hp: i32,
    pub min_damage: i32,
    pub max_damage: i32,
    pub armor: i32,
    pub xp_reward: u32,
    pub gold_min: u32,
    pub gold_max: u32,
    pub behavior: crate::entities::mob_state::MobBehavior,
    #[serde(default)]
    pub respawn_seconds: Option<u64>,
    /// Rolled by `handle_mob_death` on a kill and granted to the killer
    /// (spec.md §4.6 "roll loot table"). `None` for mobs that never drop.
    #[serde(default)]
    pub loot_table: Option<crate::loot::LootTable>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSpawnDef {
    pub template_id: ItemTemplateId,
    pub room_id: RoomId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct World {
    pub rooms: HashMap<RoomId, Room>,
    pub start_room: RoomId,
    pub mob_spawns: Vec<MobSpawnDef>,
    pub item_spawns: Vec<ItemSpawnDef>,
    /// Zone name -> lifespan in minutes; `0` or absent means "never resets".
    pub zone_lifespans_minutes: HashMap<ZoneId, u64>,
}

impl World {
    pub fn room(&self, id: &RoomId) -> Option<&Room> {
        self.rooms.get(id)
    }

    /// Every distinct zone prefix present in the room set.
    pub fn zones(&self) -> Vec<ZoneId> {
        let mut zones: Vec<ZoneId> = self
            .rooms
            .keys()
            .map(|id| ZoneId::new(id.zone()))
            .collect();
        zones.sort();
        zones.dedup();
        zones
    }

    pub fn rooms_in_zone<'a>(&'a self, zone: &'a ZoneId) -> impl Iterator<Item = &'a Room> + 'a {
        self.rooms.values().filter(move |r| r.zone() == zone.as_str())
    }
}
