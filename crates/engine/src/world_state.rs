//! The mutable runtime state an engine holds for the zones it owns
//! (spec.md §3 "Mutable runtime state", §4.13 "State partitioning"). The
//! immutable [`ambonmud_domain::world::World`] is loaded once at startup;
//! everything here changes every tick.

use ambonmud_domain::entities::{Cooldowns, Fight, ItemInstance, ItemPlacement, MobState, StatusEffect};
use ambonmud_domain::ids::{ItemId, MobId, MobSpawnId, PlayerId, RoomId, ZoneId};
use ambonmud_domain::scheduler::Scheduler;
use ambonmud_domain::world::World;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Payloads pushed into the generic [`Scheduler`] (spec.md §4.10). Mob
/// respawns, zone resets, and delayed broadcasts all flow through the same
/// due-callback heap rather than each owning a bespoke timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduledTask {
    MobRespawn { spawn_id: MobSpawnId },
    ZoneReset { zone: ZoneId },
    DelayedBroadcast { room_id: RoomId, text: String },
}

/// Everything the tick loop mutates for this engine's owned zones.
pub struct WorldState {
    pub world: Arc<World>,
    pub mobs: HashMap<MobId, MobState>,
    pub items: HashMap<ItemId, ItemInstance>,
    /// `(player_id, mob_id)` pairs; enforced 1:1 in both directions by the
    /// combat subsystem (spec.md §3 "each player... at most one fight...
    /// each mob... at most one player").
    pub fights: HashMap<PlayerId, Fight>,
    pub mobs_in_combat: HashSet<MobId>,
    pub status_effects: Vec<StatusEffect>,
    pub cooldowns: Cooldowns,
    pub scheduler: Scheduler<ScheduledTask>,
    /// Next due reset time per zone this engine owns, seeded at load from
    /// `World::zone_lifespans_minutes`. Absent entry means "never resets".
    pub next_zone_reset_at_ms: HashMap<ZoneId, i64>,
    /// Per-mob wander timer (spec.md §4.7 "on per-mob timer, randomized
    /// within `[minWanderDelay, maxWanderDelay]`"). Absent entry is treated
    /// as immediately due so a freshly spawned mob rolls its first delay on
    /// the next AI tick rather than waiting a full cycle.
    pub next_wander_at_ms: HashMap<MobId, i64>,
    next_mob_seq: u64,
    next_item_seq: u64,
}

impl WorldState {
    pub fn new(world: Arc<World>, now_ms: i64) -> Self {
        let mut next_zone_reset_at_ms = HashMap::new();
        for (zone, lifespan_minutes) in &world.zone_lifespans_minutes {
            if *lifespan_minutes > 0 {
                next_zone_reset_at_ms.insert(zone.clone(), now_ms + (*lifespan_minutes as i64) * 60_000);
            }
        }
        let mut state = Self {
            world,
            mobs: HashMap::new(),
            items: HashMap::new(),
            fights: HashMap::new(),
            mobs_in_combat: HashSet::new(),
            status_effects: Vec::new(),
            cooldowns: Cooldowns::new(),
            scheduler: Scheduler::new(),
            next_zone_reset_at_ms,
            next_wander_at_ms: HashMap::new(),
            next_mob_seq: 0,
            next_item_seq: 0,
        };
        state.spawn_all(now_ms);
        state
    }

    /// Instantiates every mob/item spawn defined by the loaded world. Also
    /// used by zone reset to restock an emptied zone (spec.md §3 "Zone:
    /// loaded at engine startup... if lifespan > 0, periodically reset").
    pub fn spawn_all(&mut self, now_ms: i64) {
        let world = self.world.clone();
        for spawn in &world.mob_spawns {
            self.spawn_mob_from_def(spawn, now_ms);
        }
        for spawn in &world.item_spawns {
            self.spawn_item_from_def(spawn);
        }
    }

    pub fn spawn_item_from_def(&mut self, spawn: &ambonmud_domain::world::ItemSpawnDef) {
        self.next_item_seq += 1;
        let id = ItemId::new(spawn.template_id.zone(), &format!("spawn-{}", self.next_item_seq));
        let mut item = ItemInstance::new(id.clone(), spawn.template_id.clone());
        item.relocate(ItemPlacement::RoomFloor(spawn.room_id.clone()));
        self.items.insert(id, item);
    }

    /// Mints a fresh, unplaced item instance of `template_id` (spec.md
    /// §4.6 loot rolls; also usable by any future drop/spawn source).
    /// Caller is responsible for relocating it.
    pub fn create_item_instance(&mut self, template_id: ambonmud_domain::ids::ItemTemplateId) -> ItemId {
        self.next_item_seq += 1;
        let id = ItemId::new(template_id.zone(), &format!("loot-{}", self.next_item_seq));
        self.items.insert(id.clone(), ItemInstance::new(id.clone(), template_id));
        id
    }

    pub fn spawn_mob_from_def(&mut self, spawn: &ambonmud_domain::world::MobSpawnDef, now_ms: i64) {
        self.next_mob_seq += 1;
        let id = MobId::new(spawn.id.zone(), &format!("{}-{}", spawn.id.local(), self.next_mob_seq));
        let mob = MobState {
            id: id.clone(),
            name: spawn.template_name.clone(),
            room_id: spawn.room_id.clone(),
            hp: spawn.hp,
            max_hp: spawn.hp,
            min_damage: spawn.min_damage,
            max_damage: spawn.max_damage,
            armor: spawn.armor,
            xp_reward: spawn.xp_reward,
            gold_min: spawn.gold_min,
            gold_max: spawn.gold_max,
            behavior: spawn.behavior,
            inventory: Vec::new(),
            respawn_seconds: spawn.respawn_seconds,
            loot_table: spawn.loot_table.clone(),
        };
        self.mobs.insert(id, mob);
        let _ = now_ms;
    }

    pub fn mobs_in_room<'a>(&'a self, room_id: &'a RoomId) -> impl Iterator<Item = &'a MobState> + 'a {
        self.mobs.values().filter(move |m| &m.room_id == room_id)
    }

    pub fn items_on_floor<'a>(&'a self, room_id: &'a RoomId) -> impl Iterator<Item = &'a ItemInstance> + 'a {
        self.items
            .values()
            .filter(move |i| matches!(&i.placement, ItemPlacement::RoomFloor(r) if r == room_id))
    }

    /// Resolves a mob in `room_id` by keyword match against its display
    /// name (spec.md §4.6): case-insensitive substring first, then exact
    /// keyword; ambiguity picks the first match in iteration order.
    pub fn find_mob_in_room(&self, room_id: &RoomId, keyword: &str) -> Option<&MobState> {
        let needle = keyword.to_ascii_lowercase();
        let mut candidates: Vec<&MobState> = self
            .mobs_in_room(room_id)
            .filter(|m| m.name.to_ascii_lowercase().contains(&needle))
            .collect();
        candidates.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        candidates.into_iter().next()
    }

    pub fn is_player_engaged(&self, player_id: &PlayerId) -> bool {
        self.fights.contains_key(player_id)
    }

    pub fn is_mob_engaged(&self, mob_id: &MobId) -> bool {
        self.mobs_in_combat.contains(mob_id)
    }

    pub fn start_fight(&mut self, fight: Fight) {
        self.mobs_in_combat.insert(fight.mob_id.clone());
        self.fights.insert(fight.player_id.clone(), fight);
    }

    pub fn end_fight(&mut self, player_id: &PlayerId) -> Option<Fight> {
        let fight = self.fights.remove(player_id)?;
        self.mobs_in_combat.remove(&fight.mob_id);
        Some(fight)
    }

    pub fn remove_mob(&mut self, mob_id: &MobId) -> Option<MobState> {
        self.mobs_in_combat.remove(mob_id);
        self.next_wander_at_ms.remove(mob_id);
        self.mobs.remove(mob_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambonmud_domain::entities::MobBehavior;
    use ambonmud_domain::world::{MobSpawnDef, Room};
    use std::collections::HashMap as Map;

    fn sample_world() -> Arc<World> {
        let room = Room {
            id: RoomId::new("demo", "r1"),
            title: "Room".into(),
            description: "".into(),
            exits: Map::new(),
        };
        let mut rooms = Map::new();
        rooms.insert(room.id.clone(), room);
        Arc::new(World {
            rooms,
            start_room: RoomId::new("demo", "r1"),
            mob_spawns: vec![MobSpawnDef {
                id: MobSpawnId::new("demo", "rat"),
                template_name: "rat".into(),
                room_id: RoomId::new("demo", "r1"),
                hp: 5,
                min_damage: 1,
                max_damage: 2,
                armor: 0,
                xp_reward: 5,
                gold_min: 0,
                gold_max: 1,
                behavior: MobBehavior::Wander,
                respawn_seconds: Some(30),
                loot_table: None,
            }],
            item_spawns: vec![],
            zone_lifespans_minutes: Map::new(),
        })
    }

    #[test]
    fn spawn_all_instantiates_mobs_from_world() {
        let state = WorldState::new(sample_world(), 0);
        assert_eq!(state.mobs.len(), 1);
        let rat = state.find_mob_in_room(&RoomId::new("demo", "r1"), "rat").unwrap();
        assert_eq!(rat.name, "rat");
    }

    #[test]
    fn fight_lifecycle_tracks_both_participants() {
        let mut state = WorldState::new(sample_world(), 0);
        let mob_id = state.mobs.keys().next().unwrap().clone();
        let player_id = PlayerId::new("p1");
        assert!(!state.is_mob_engaged(&mob_id));
        state.start_fight(Fight {
            player_id: player_id.clone(),
            mob_id: mob_id.clone(),
            started_at_ms: 0,
            next_round_at_ms: 2000,
        });
        assert!(state.is_player_engaged(&player_id));
        assert!(state.is_mob_engaged(&mob_id));
        state.end_fight(&player_id);
        assert!(!state.is_mob_engaged(&mob_id));
    }
}
