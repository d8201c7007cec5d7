//! Mob AI subsystem (spec.md §4.7): wander timers, aggro engagement, coward
//! flee, all bounded by a per-tick movement cap so one zone's mobs can't
//! starve the tick for every other zone this engine owns.

use crate::registry::PlayerRegistry;
use crate::world_state::WorldState;
use ambonmud_domain::entities::{Fight, MobState};
use ambonmud_domain::ids::{MobId, PlayerId};
use ambonmud_domain::random::RandomSource;
use ambonmud_domain::world::Direction;
use ambonmud_shared::config::{CombatConfig, MobConfig};
use ambonmud_shared::events::OutboundEvent;

/// Coward behavior flees combat below this fraction of max HP. Not exposed
/// as config (spec.md §6 names no such key); mirrors the arbitrary cap
/// `MobState::below_flee_threshold` already takes in its own unit test.
const COWARD_FLEE_THRESHOLD: f64 = 0.25;

/// Runs one AI tick: wander/aggro movement first, then the coward-flee
/// check for mobs already in combat. Order matches spec.md §4.3's per-tick
/// subsystem ordering (mob AI before combat rounds).
pub fn tick(
    world: &mut WorldState,
    registry: &PlayerRegistry,
    mob_config: &MobConfig,
    combat_config: &CombatConfig,
    rng: &mut dyn RandomSource,
    now_ms: i64,
    out: &mut Vec<OutboundEvent>,
) {
    run_wander_and_aggro(world, registry, mob_config, combat_config, rng, now_ms, out);
    run_coward_flee(world, registry, mob_config, rng, now_ms, out);
}

fn run_wander_and_aggro(
    world: &mut WorldState,
    registry: &PlayerRegistry,
    mob_config: &MobConfig,
    combat_config: &CombatConfig,
    rng: &mut dyn RandomSource,
    now_ms: i64,
    out: &mut Vec<OutboundEvent>,
) {
    let due: Vec<MobId> = world
        .mobs
        .values()
        .filter(|m| m.behavior.wanders() && !world.is_mob_engaged(&m.id))
        .filter(|m| world.next_wander_at_ms.get(&m.id).copied().unwrap_or(now_ms) <= now_ms)
        .take(mob_config.max_moves_per_tick)
        .map(|m| m.id.clone())
        .collect();

    for mob_id in due {
        schedule_next_wander(world, &mob_id, mob_config, rng, now_ms);

        let Some(exits) = legal_wander_exits(world, &mob_id) else {
            continue;
        };
        if exits.is_empty() {
            continue;
        }
        let (direction, dest_room_id) = exits[rng.gen_range(0, (exits.len() - 1) as i32) as usize].clone();

        let Some(mob) = world.mobs.get_mut(&mob_id) else { continue };
        let source_room_id = mob.room_id.clone();
        let name = mob.name.clone();
        mob.room_id = dest_room_id.clone();
        let is_aggressive = mob.behavior.is_aggressive();

        for session_id in registry.player_sessions_in_room(&source_room_id) {
            out.push(OutboundEvent::SendText {
                session_id,
                text: format!("{name} leaves {}.", direction.as_str()),
            });
        }
        for session_id in registry.player_sessions_in_room(&dest_room_id) {
            out.push(OutboundEvent::SendText {
                session_id,
                text: format!("{name} enters from {}.", direction.opposite().as_str()),
            });
        }

        if is_aggressive {
            try_aggro(world, registry, &mob_id, &dest_room_id, combat_config, now_ms, out);
        }
    }
}

/// Called by the movement command handler when a player steps into a room
/// (spec.md §4.7 "or on a player entering their room, initiate a fight").
pub fn on_player_entered_room(
    world: &mut WorldState,
    registry: &PlayerRegistry,
    player_id: &PlayerId,
    room_id: &ambonmud_domain::ids::RoomId,
    combat_config: &CombatConfig,
    now_ms: i64,
    out: &mut Vec<OutboundEvent>,
) {
    if world.is_player_engaged(player_id) {
        return;
    }
    let aggressors: Vec<MobId> = world
        .mobs_in_room(room_id)
        .filter(|m| m.behavior.is_aggressive() && !world.is_mob_engaged(&m.id))
        .map(|m| m.id.clone())
        .collect();
    for mob_id in aggressors {
        if try_aggro(world, registry, &mob_id, room_id, combat_config, now_ms, out) {
            return;
        }
    }
}

/// An aggressive mob attacks the first (by session ordinal) unengaged
/// player sharing its room. Returns whether a fight was started.
fn try_aggro(
    world: &mut WorldState,
    registry: &PlayerRegistry,
    mob_id: &MobId,
    room_id: &ambonmud_domain::ids::RoomId,
    combat_config: &CombatConfig,
    now_ms: i64,
    out: &mut Vec<OutboundEvent>,
) -> bool {
    if world.is_mob_engaged(mob_id) {
        return false;
    }
    let mut candidates: Vec<(PlayerId, u64)> = registry
        .player_sessions_in_room(room_id)
        .filter_map(|sid| registry.player(sid))
        .filter(|p| !world.is_player_engaged(&p.player_id))
        .map(|p| (p.player_id.clone(), p.session_id.0))
        .collect();
    candidates.sort_by_key(|(_, session_ordinal)| *session_ordinal);

    let Some((player_id, _)) = candidates.into_iter().next() else {
        return false;
    };

    world.start_fight(Fight {
        player_id: player_id.clone(),
        mob_id: mob_id.clone(),
        started_at_ms: now_ms,
        next_round_at_ms: now_ms + combat_config.round_interval_ms,
    });
    if let Some(mob) = world.mobs.get(mob_id) {
        for session_id in registry.player_sessions_in_room(room_id) {
            out.push(OutboundEvent::SendText {
                session_id,
                text: format!("The {} attacks!", mob.name),
            });
        }
    }
    true
}

fn run_coward_flee(
    world: &mut WorldState,
    registry: &PlayerRegistry,
    mob_config: &MobConfig,
    rng: &mut dyn RandomSource,
    now_ms: i64,
    out: &mut Vec<OutboundEvent>,
) {
    let fleeing: Vec<(PlayerId, MobId)> = world
        .fights
        .iter()
        .filter(|(_, fight)| {
            world
                .mobs
                .get(&fight.mob_id)
                .map(|m| m.behavior.is_coward() && m.below_flee_threshold(COWARD_FLEE_THRESHOLD))
                .unwrap_or(false)
        })
        .map(|(player_id, fight)| (player_id.clone(), fight.mob_id.clone()))
        .collect();

    for (player_id, mob_id) in fleeing {
        world.end_fight(&player_id);
        schedule_next_wander(world, &mob_id, mob_config, rng, now_ms);

        let Some(exits) = legal_wander_exits(world, &mob_id) else { continue };
        if exits.is_empty() {
            continue;
        }
        let (direction, dest_room_id) = exits[rng.gen_range(0, (exits.len() - 1) as i32) as usize].clone();
        let Some(mob) = world.mobs.get_mut(&mob_id) else { continue };
        let source_room_id = mob.room_id.clone();
        let name = mob.name.clone();
        mob.room_id = dest_room_id.clone();

        for session_id in registry.player_sessions_in_room(&source_room_id) {
            out.push(OutboundEvent::SendText {
                session_id,
                text: format!("The {name} flees {}, wounded!", direction.as_str()),
            });
        }
    }
}

fn schedule_next_wander(
    world: &mut WorldState,
    mob_id: &MobId,
    mob_config: &MobConfig,
    rng: &mut dyn RandomSource,
    now_ms: i64,
) {
    let delay = rng.gen_range(
        mob_config.min_wander_delay_ms as i32,
        mob_config.max_wander_delay_ms as i32,
    ) as i64;
    world.next_wander_at_ms.insert(mob_id.clone(), now_ms + delay);
}

/// Exits out of the mob's current room that stay within its own zone
/// (spec.md §4.7 "mobs never traverse cross-zone boundaries"). `None` if
/// the mob or its room no longer exists.
fn legal_wander_exits(world: &WorldState, mob_id: &MobId) -> Option<Vec<(Direction, ambonmud_domain::ids::RoomId)>> {
    let mob: &MobState = world.mobs.get(mob_id)?;
    let room = world.world.room(&mob.room_id)?;
    Some(
        room.exits
            .iter()
            .filter(|(direction, _)| room.is_cross_zone_exit(**direction) != Some(true))
            .map(|(direction, room_id)| (*direction, room_id.clone()))
            .collect(),
    )
}
