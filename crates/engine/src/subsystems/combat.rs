//! 1v1 player-vs-mob combat (spec.md §4.6). `start_fight` handles `kill
//! <target>`; `tick` resolves every fight whose round is due. Dying to a
//! spell and dying to a melee round both end at [`handle_mob_death`] - there
//! is exactly one place a mob death is processed.

use crate::registry::PlayerRegistry;
use crate::subsystems::status_effects::absorb_shield;
use crate::world_state::{ScheduledTask, WorldState};
use ambonmud_domain::entities::status_effect::StatusTarget;
use ambonmud_domain::entities::Fight;
use ambonmud_domain::errors::DomainError;
use ambonmud_domain::ids::{MobId, MobSpawnId, PlayerId, SessionId};
use ambonmud_domain::random::RandomSource;
use ambonmud_shared::config::CombatConfig;
use ambonmud_shared::events::OutboundEvent;

/// Dodge chance cap; spec.md §4.6 names dexterity-derived dodge but leaves
/// the cap to implementation discretion like `Attributes::dodge_chance`
/// already does for its own tests.
const DODGE_CAP: f64 = 0.3;

/// Player death policy hook (spec.md §9 open question: "expose as a policy
/// hook with a configurable default"). `Respawn` is the shipped default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerDeathPolicy {
    RespawnAtStartWithPenalty { gold_penalty_pct: u32 },
    StayDead,
}

impl Default for PlayerDeathPolicy {
    fn default() -> Self {
        Self::RespawnAtStartWithPenalty { gold_penalty_pct: 10 }
    }
}

/// Starts a fight for `kill <target>`. Returns a typed [`DomainError`] for
/// an already-engaged participant or a missing target rather than silently
/// no-opping.
pub fn start_fight(
    world: &mut WorldState,
    registry: &PlayerRegistry,
    session_id: SessionId,
    target_keyword: &str,
    config: &CombatConfig,
    now_ms: i64,
) -> Result<MobId, DomainError> {
    let player = registry
        .player(session_id)
        .ok_or_else(|| DomainError::NoSuchTarget(target_keyword.to_string()))?;
    if world.is_player_engaged(&player.player_id) {
        return Err(DomainError::AlreadyEngaged(player.name.clone()));
    }
    let mob = world
        .find_mob_in_room(&player.current_room_id, target_keyword)
        .ok_or_else(|| DomainError::NoSuchTarget(target_keyword.to_string()))?;
    if world.is_mob_engaged(&mob.id) {
        return Err(DomainError::AlreadyEngaged(mob.name.clone()));
    }
    let mob_id = mob.id.clone();
    world.start_fight(Fight {
        player_id: player.player_id.clone(),
        mob_id: mob_id.clone(),
        started_at_ms: now_ms,
        next_round_at_ms: now_ms + config.round_interval_ms,
    });
    Ok(mob_id)
}

/// Ends a fight with no penalty; the player stays in the room (spec.md
/// §4.6 `flee`).
pub fn flee(world: &mut WorldState, player_id: &ambonmud_domain::ids::PlayerId) -> bool {
    world.end_fight(player_id).is_some()
}

/// Resolves every fight whose round is due, in insertion order (spec.md
/// §5 "combat rounds... ordered by due time then insertion").
#[allow(clippy::too_many_arguments)]
pub fn tick(
    world: &mut WorldState,
    registry: &mut PlayerRegistry,
    config: &CombatConfig,
    death_policy: PlayerDeathPolicy,
    rng: &mut dyn RandomSource,
    now_ms: i64,
    out: &mut Vec<OutboundEvent>,
) {
    let due: Vec<(ambonmud_domain::ids::PlayerId, MobId)> = world
        .fights
        .values()
        .filter(|f| f.is_due(now_ms))
        .take(config.max_combats_per_tick)
        .map(|f| (f.player_id.clone(), f.mob_id.clone()))
        .collect();

    for (player_id, mob_id) in due {
        resolve_round(
            world,
            registry,
            config,
            death_policy,
            rng,
            now_ms,
            &player_id,
            &mob_id,
            out,
        );
    }
}

#[allow(clippy::too_many_arguments)]
fn resolve_round(
    world: &mut WorldState,
    registry: &mut PlayerRegistry,
    config: &CombatConfig,
    death_policy: PlayerDeathPolicy,
    rng: &mut dyn RandomSource,
    now_ms: i64,
    player_id: &PlayerId,
    mob_id: &MobId,
    out: &mut Vec<OutboundEvent>,
) {
    let Some(session_id) = registry.all_players().find(|p| &p.player_id == player_id).map(|p| p.session_id) else {
        world.end_fight(player_id);
        return;
    };

    let strength_bonus = registry
        .player(session_id)
        .map(|p| p.attributes.strength_damage_bonus())
        .unwrap_or(0);
    let mob_armor = world.mobs.get(mob_id).map(|m| m.armor).unwrap_or(0);

    let raw_roll = rng.gen_range(config.min_damage, config.max_damage);
    let player_damage = (raw_roll + strength_bonus - mob_armor).max(1);
    let player_damage = absorb_shield(world, &StatusTarget::Mob(mob_id.clone()), player_damage);

    if let Some(mob) = world.mobs.get_mut(mob_id) {
        mob.apply_damage(player_damage);
    }

    let mob_dead = world.mobs.get(mob_id).map(|m| m.is_dead()).unwrap_or(true);
    if mob_dead {
        handle_mob_death(world, registry, session_id, player_id, mob_id, now_ms, rng, out);
        return;
    }

    let (mob_min, mob_max) = world
        .mobs
        .get(mob_id)
        .map(|m| (m.min_damage, m.max_damage))
        .unwrap_or((0, 0));

    let dodge_chance = registry
        .player(session_id)
        .map(|p| p.attributes.dodge_chance(DODGE_CAP))
        .unwrap_or(0.0);

    if rng.gen_f64() >= dodge_chance {
        let mob_damage = rng.gen_range(mob_min, mob_max).max(0);
        let mob_damage = absorb_shield(world, &StatusTarget::Player(player_id.clone()), mob_damage);
        if let Some(player) = registry.player_mut(session_id) {
            player.apply_damage(mob_damage);
            if mob_damage > 0 {
                out.push(OutboundEvent::SendText {
                    session_id,
                    text: format!("You take {mob_damage} damage."),
                });
            }
            if player.is_dead() {
                handle_player_death(world, registry, session_id, player_id, death_policy, out);
                return;
            }
        }
    }

    if let Some(fight) = world.fights.get_mut(player_id) {
        fight.schedule_next_round(now_ms, config.round_interval_ms);
    }
}

/// The single routine for a mob's death, reached from a melee round or a
/// direct-damage spell cast alike (spec.md §4.6: "share a single
/// `handleMobDeath` routine - do not duplicate").
#[allow(clippy::too_many_arguments)]
pub fn handle_mob_death(
    world: &mut WorldState,
    registry: &mut PlayerRegistry,
    session_id: SessionId,
    player_id: &PlayerId,
    mob_id: &MobId,
    now_ms: i64,
    rng: &mut dyn RandomSource,
    out: &mut Vec<OutboundEvent>,
) {
    let Some(mob) = world.remove_mob(mob_id) else {
        return;
    };
    world.end_fight(player_id);

    for item_id in &mob.inventory {
        if let Some(item) = world.items.get_mut(item_id) {
            item.relocate(ambonmud_domain::entities::ItemPlacement::RoomFloor(mob.room_id.clone()));
        }
    }

    for sid in registry.player_sessions_in_room(&mob.room_id).collect::<Vec<_>>() {
        out.push(OutboundEvent::SendText {
            session_id: sid,
            text: format!("The {} dies.", mob.name),
        });
    }

    if let Some(respawn_secs) = mob.respawn_seconds {
        world.scheduler.push(
            now_ms + (respawn_secs as i64) * 1000,
            ScheduledTask::MobRespawn {
                spawn_id: MobSpawnId::new(mob_id.zone(), mob_id.local()),
            },
        );
    }

    if let Some(loot_table) = &mob.loot_table {
        if let Some((template_id, quantity)) = loot_table.roll(rng) {
            let mut granted_ids = Vec::new();
            for _ in 0..quantity {
                let item_id = world.create_item_instance(template_id.clone());
                if let Some(item) = world.items.get_mut(&item_id) {
                    item.relocate(ambonmud_domain::entities::ItemPlacement::PlayerInventory(player_id.clone()));
                }
                granted_ids.push(item_id);
            }
            if let Some(player) = registry.player_mut(session_id) {
                player.inventory.extend(granted_ids);
            }
            out.push(OutboundEvent::SendInfo {
                session_id,
                text: format!("You loot {quantity} x {} from the {}.", template_id.local(), mob.name),
            });
        }
    }

    if let Some(level_up) = registry.grant_xp(session_id, mob.xp_reward as u64) {
        out.push(OutboundEvent::SendInfo {
            session_id,
            text: format!("You reach level {level_up}!"),
        });
    }
    if let Some(player) = registry.player_mut(session_id) {
        player.gold += ((mob.gold_min + mob.gold_max) / 2) as u64;
    }
    out.push(OutboundEvent::SendPrompt { session_id });
}

fn handle_player_death(
    world: &mut WorldState,
    registry: &mut PlayerRegistry,
    session_id: SessionId,
    player_id: &PlayerId,
    policy: PlayerDeathPolicy,
    out: &mut Vec<OutboundEvent>,
) {
    world.end_fight(player_id);
    match policy {
        PlayerDeathPolicy::RespawnAtStartWithPenalty { gold_penalty_pct } => {
            let start_room = world.world.start_room.clone();
            if let Some(player) = registry.player_mut(session_id) {
                player.current_room_id = start_room;
                player.hp = (player.max_hp / 2).max(1);
                player.gold -= player.gold * gold_penalty_pct as u64 / 100;
            }
            out.push(OutboundEvent::SendInfo {
                session_id,
                text: "You die and awaken elsewhere, lighter in the pocket.".into(),
            });
        }
        PlayerDeathPolicy::StayDead => {
            out.push(OutboundEvent::SendError {
                session_id,
                text: "You have died.".into(),
            });
        }
    }
    out.push(OutboundEvent::SendPrompt { session_id });
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambonmud_domain::entities::MobBehavior;
    use ambonmud_domain::ids::{PlayerId, RoomId};
    use ambonmud_domain::progression::XpCurve;
    use ambonmud_domain::random::FixedSequenceRandom;
    use ambonmud_domain::value_objects::{Attributes, Class, Race};
    use ambonmud_domain::world::{MobSpawnDef, Room, World};
    use std::collections::HashMap as Map;
    use std::sync::Arc;

    fn config() -> CombatConfig {
        CombatConfig {
            min_damage: 2,
            max_damage: 4,
            round_interval_ms: 2000,
            max_combats_per_tick: 100,
        }
    }

    fn sample_world() -> WorldState {
        let room = Room {
            id: RoomId::new("demo", "r1"),
            title: "Room".into(),
            description: "".into(),
            exits: Map::new(),
        };
        let mut rooms = Map::new();
        rooms.insert(room.id.clone(), room);
        let world = Arc::new(World {
            rooms,
            start_room: RoomId::new("demo", "r1"),
            mob_spawns: vec![MobSpawnDef {
                id: ambonmud_domain::ids::MobSpawnId::new("demo", "rat"),
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
            zone_lifespans_minutes: Map::new(),
        });
        WorldState::new(world, 0)
    }

    fn sample_world_with_loot(loot_table: ambonmud_domain::loot::LootTable) -> WorldState {
        let room = Room {
            id: RoomId::new("demo", "r1"),
            title: "Room".into(),
            description: "".into(),
            exits: Map::new(),
        };
        let mut rooms = Map::new();
        rooms.insert(room.id.clone(), room);
        let world = Arc::new(World {
            rooms,
            start_room: RoomId::new("demo", "r1"),
            mob_spawns: vec![MobSpawnDef {
                id: ambonmud_domain::ids::MobSpawnId::new("demo", "rat"),
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
                loot_table: Some(loot_table),
            }],
            item_spawns: vec![],
            zone_lifespans_minutes: Map::new(),
        });
        WorldState::new(world, 0)
    }

    fn sample_registry() -> PlayerRegistry {
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
        registry.admit_player(ambonmud_domain::entities::PlayerState {
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
    fn kill_rejects_already_engaged() {
        let mut world = sample_world();
        let registry = sample_registry();
        let config = config();
        start_fight(&mut world, &registry, SessionId(1), "rat", &config, 0).unwrap();
        let err = start_fight(&mut world, &registry, SessionId(1), "rat", &config, 0).unwrap_err();
        assert!(matches!(err, DomainError::AlreadyEngaged(_)));
    }

    #[test]
    fn flee_ends_fight_with_no_penalty() {
        let mut world = sample_world();
        let registry = sample_registry();
        let config = config();
        start_fight(&mut world, &registry, SessionId(1), "rat", &config, 0).unwrap();
        let player_id = PlayerId::new("ama");
        assert!(flee(&mut world, &player_id));
        assert!(!world.is_player_engaged(&player_id));
    }

    #[test]
    fn solo_combat_kills_rat_and_grants_xp() {
        let mut world = sample_world();
        let mut registry = sample_registry();
        let config = config();
        start_fight(&mut world, &registry, SessionId(1), "rat", &config, 0).unwrap();
        let mut rng = FixedSequenceRandom::new(vec![10], vec![1.0]);
        let mut out = Vec::new();
        tick(&mut world, &mut registry, &config, PlayerDeathPolicy::default(), &mut rng, 2000, &mut out);
        assert!(world.mobs.is_empty());
        assert!(out.iter().any(|e| matches!(e, OutboundEvent::SendText { text, .. } if text.contains("dies"))));
        assert_eq!(registry.player(SessionId(1)).unwrap().xp_total, 5);
    }

    #[test]
    fn mob_death_grants_rolled_loot_to_killer() {
        let loot = ambonmud_domain::loot::LootTable::new(vec![(
            ambonmud_domain::ids::ItemTemplateId::new("demo", "bone"),
            1.0,
            2..=2,
        )]);
        let mut world = sample_world_with_loot(loot);
        let mut registry = sample_registry();
        let mob_id = world.mobs.keys().next().cloned().unwrap();
        let player_id = PlayerId::new("ama");
        let mut rng = FixedSequenceRandom::new(vec![0], vec![0.0]);
        let mut out = Vec::new();
        handle_mob_death(&mut world, &mut registry, SessionId(1), &player_id, &mob_id, 0, &mut rng, &mut out);

        let player = registry.player(SessionId(1)).unwrap();
        assert_eq!(player.inventory.len(), 2);
        assert!(out
            .iter()
            .any(|e| matches!(e, OutboundEvent::SendInfo { text, .. } if text.contains("bone"))));
    }

    #[test]
    fn mob_death_without_loot_table_grants_nothing() {
        let mut world = sample_world();
        let mut registry = sample_registry();
        let mob_id = world.mobs.keys().next().cloned().unwrap();
        let player_id = PlayerId::new("ama");
        let mut rng = FixedSequenceRandom::new(vec![0], vec![0.0]);
        let mut out = Vec::new();
        handle_mob_death(&mut world, &mut registry, SessionId(1), &player_id, &mob_id, 0, &mut rng, &mut out);

        assert!(registry.player(SessionId(1)).unwrap().inventory.is_empty());
    }
}
