//! Zone reset (spec.md §3, §4.3 step 6). A zone with a positive configured
//! lifespan is wiped and restocked from its spawn definitions once that
//! lifespan elapses; players standing in it are told the room has reset
//! rather than watching mobs and items vanish and reappear silently.

use crate::registry::PlayerRegistry;
use crate::world_state::WorldState;
use ambonmud_domain::ids::ZoneId;
use ambonmud_shared::events::OutboundEvent;

/// Resets every zone whose due time has passed, in no particular order -
/// resets are independent of one another and a tick normally sees at most
/// one due at a time given realistic lifespans.
pub fn tick(world: &mut WorldState, registry: &PlayerRegistry, now_ms: i64, out: &mut Vec<OutboundEvent>) {
    let due: Vec<ZoneId> = world
        .next_zone_reset_at_ms
        .iter()
        .filter(|(_, due_at)| **due_at <= now_ms)
        .map(|(zone, _)| zone.clone())
        .collect();

    for zone in due {
        reset_zone(world, registry, &zone, now_ms, out);
    }
}

fn reset_zone(world: &mut WorldState, registry: &PlayerRegistry, zone: &ZoneId, now_ms: i64, out: &mut Vec<OutboundEvent>) {
    let rooms_in_zone: Vec<_> = world.world.rooms_in_zone(zone).map(|r| r.id.clone()).collect();

    world.mobs.retain(|mob_id, _| mob_id.zone() != zone.as_str());
    world.items.retain(|item_id, _| item_id.zone() != zone.as_str());
    world.mobs_in_combat.retain(|mob_id| mob_id.zone() != zone.as_str());
    world.fights.retain(|_, fight| fight.mob_id.zone() != zone.as_str());
    world.next_wander_at_ms.retain(|mob_id, _| mob_id.zone() != zone.as_str());

    let world_data = world.world.clone();
    for spawn in world_data.mob_spawns.iter().filter(|s| s.id.zone() == zone.as_str()) {
        world.spawn_mob_from_def(spawn, now_ms);
    }
    for spawn in world_data.item_spawns.iter().filter(|s| s.template_id.zone() == zone.as_str()) {
        world.spawn_item_from_def(spawn);
    }

    let lifespan_minutes = world_data.zone_lifespans_minutes.get(zone).copied().unwrap_or(0);
    if lifespan_minutes > 0 {
        world
            .next_zone_reset_at_ms
            .insert(zone.clone(), now_ms + (lifespan_minutes as i64) * 60_000);
    } else {
        world.next_zone_reset_at_ms.remove(zone);
    }

    for room_id in &rooms_in_zone {
        for session_id in registry.player_sessions_in_room(room_id) {
            out.push(OutboundEvent::SendInfo {
                session_id,
                text: "The area resets around you.".into(),
            });
            out.push(OutboundEvent::SendPrompt { session_id });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambonmud_domain::entities::{MobBehavior, PlayerState};
    use ambonmud_domain::ids::{MobSpawnId, PlayerId, RoomId, SessionId};
    use ambonmud_domain::progression::XpCurve;
    use ambonmud_domain::value_objects::{Attributes, Class, Race};
    use ambonmud_domain::world::{MobSpawnDef, Room, World};
    use std::collections::HashMap as Map;
    use std::sync::Arc;

    fn world_with_lifespan() -> Arc<World> {
        let room = Room {
            id: RoomId::new("demo", "r1"),
            title: "Room".into(),
            description: "".into(),
            exits: Map::new(),
        };
        let mut rooms = Map::new();
        rooms.insert(room.id.clone(), room);
        let mut lifespans = Map::new();
        lifespans.insert(ZoneId::new("demo"), 10u64);
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
                respawn_seconds: None,
                loot_table: None,
            }],
            item_spawns: vec![],
            zone_lifespans_minutes: lifespans,
        })
    }

    fn registry_with_bystander() -> PlayerRegistry {
        let mut registry = PlayerRegistry::new(
            4,
            XpCurve {
                base_xp: 100.0,
                exponent: 1.5,
                linear_xp: 50.0,
                max_level: 50,
            },
            true,
        );
        registry.admit_player(PlayerState {
            session_id: SessionId(1),
            player_id: PlayerId::new("ama"),
            name: "Ama".into(),
            current_room_id: RoomId::new("demo", "r1"),
            race: Race::Human,
            class: Class::Warrior,
            attributes: Attributes::baseline(),
            hp: 10,
            max_hp: 10,
            mana: 10,
            max_mana: 10,
            level: 1,
            xp_total: 0,
            gold: 0,
            ansi_enabled: true,
            is_staff: false,
            equipped: Map::new(),
            inventory: vec![],
            known_abilities: vec![],
        });
        registry
    }

    #[test]
    fn reset_restocks_and_notifies_bystanders() {
        let mut world = WorldState::new(world_with_lifespan(), 0);
        let registry = registry_with_bystander();
        let mob_id = world.mobs.keys().next().unwrap().clone();
        world.remove_mob(&mob_id);
        assert!(world.mobs.is_empty());

        let mut out = Vec::new();
        tick(&mut world, &registry, 600_000, &mut out);

        assert_eq!(world.mobs.len(), 1);
        assert!(out.iter().any(|e| matches!(e, OutboundEvent::SendInfo { text, .. } if text.contains("resets"))));
        assert_eq!(
            world.next_zone_reset_at_ms.get(&ZoneId::new("demo")).copied(),
            Some(600_000 + 600_000)
        );
    }

    #[test]
    fn not_due_zone_is_untouched() {
        let mut world = WorldState::new(world_with_lifespan(), 0);
        let registry = registry_with_bystander();
        let mut out = Vec::new();
        tick(&mut world, &registry, 1000, &mut out);
        assert!(out.is_empty());
    }
}
