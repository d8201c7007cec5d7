//! Layers cross-engine routing on top of [`command_dispatch::dispatch`]
//! (spec.md §4.13). `move`/`goto`/`transfer`/`staffkick` are the only verbs
//! that can name a zone this engine doesn't own; everything else is fully
//! local and passes straight through unchanged.

use crate::command_dispatch::{self, DispatchContext};
use crate::errors::PersistenceError;
use crate::persistence::PlayerRepository;
use crate::sharding::global_commands::GlobalCommandState;
use crate::sharding::handoff::{self, PendingHandoffs};
use crate::sharding::inter_engine_bus::InterEngineBus;
use crate::sharding::location_index::PlayerLocationIndex;
use crate::sharding::zone_registry::ZoneRegistry;
use ambonmud_domain::command::Command;
use ambonmud_domain::ids::{EngineId, RoomId, SessionId, ZoneId};
use ambonmud_domain::world::Direction;
use ambonmud_shared::events::OutboundEvent;
use ambonmud_shared::inter_engine::InterEngineMessage;

/// The sharding-aware handles a router needs on top of a `DispatchContext`.
/// Absent in a single-engine deployment, where every command falls straight
/// through to `command_dispatch::dispatch`.
pub struct ShardingHandles<'a> {
    pub zone_registry: &'a dyn ZoneRegistry,
    pub bus: &'a InterEngineBus,
    pub repo: &'a dyn PlayerRepository,
    pub pending_handoffs: &'a mut PendingHandoffs,
    pub global: &'a mut GlobalCommandState,
    pub location_index: Option<&'a PlayerLocationIndex>,
    pub self_engine_id: &'a EngineId,
}

/// Routes one already-logged-in session's command, consulting the sharding
/// layer only for the handful of verbs that can cross an engine boundary.
pub async fn route(
    ctx: &mut DispatchContext<'_>,
    sharding: Option<&mut ShardingHandles<'_>>,
    session_id: SessionId,
    command: Command,
    out: &mut Vec<OutboundEvent>,
) -> Result<(), PersistenceError> {
    let Some(sharding) = sharding else {
        command_dispatch::dispatch(ctx, session_id, command, out);
        return Ok(());
    };

    match command {
        Command::Move(direction) => route_move(ctx, sharding, session_id, direction, out).await,
        Command::Goto(token) => route_goto(ctx, sharding, session_id, &token, out).await,
        Command::Transfer { target, destination } => {
            route_transfer(ctx, sharding, session_id, &target, &destination, out).await
        }
        Command::StaffKick(target) => {
            route_staff_kick(ctx, sharding, session_id, &target, out);
            Ok(())
        }
        Command::Who => {
            crate::sharding::global_commands::who(sharding.global, ctx.registry, sharding.bus, ctx.rng, session_id, ctx.now_ms);
            Ok(())
        }
        Command::Tell { target, message } => {
            if ctx.registry.session_for_name(&target).is_none() {
                crate::sharding::global_commands::tell(
                    sharding.global,
                    ctx.registry,
                    sharding.location_index,
                    sharding.bus,
                    session_id,
                    &target,
                    &message,
                    ctx.now_ms,
                    out,
                );
                return Ok(());
            }
            command_dispatch::dispatch(ctx, session_id, Command::Tell { target, message }, out);
            Ok(())
        }
        Command::Gossip(message) => {
            crate::sharding::global_commands::gossip(ctx.registry, sharding.bus, session_id, &message, out);
            Ok(())
        }
        Command::Shutdown => {
            if !is_staff(ctx, session_id) {
                out.push(OutboundEvent::SendError { session_id, text: "You don't have the authority to do that.".into() });
                out.push(OutboundEvent::SendPrompt { session_id });
                return Ok(());
            }
            crate::sharding::global_commands::shutdown(ctx.registry, sharding.bus, session_id, out);
            Ok(())
        }
        other => {
            command_dispatch::dispatch(ctx, session_id, other, out);
            Ok(())
        }
    }
}

async fn route_move(
    ctx: &mut DispatchContext<'_>,
    sharding: &mut ShardingHandles<'_>,
    session_id: SessionId,
    direction: Direction,
    out: &mut Vec<OutboundEvent>,
) -> Result<(), PersistenceError> {
    let Some(player) = ctx.registry.player(session_id) else { return Ok(()) };
    let current_room_id = player.current_room_id.clone();
    let player_id = player.player_id.clone();

    let dest = ctx
        .world
        .world
        .room(&current_room_id)
        .and_then(|room| room.exits.get(&direction).cloned());
    let Some(dest) = dest else {
        command_dispatch::dispatch(ctx, session_id, Command::Move(direction), out);
        return Ok(());
    };

    // A destination this engine has loaded is local by definition - no need
    // to consult the zone registry at all.
    if ctx.world.world.room(&dest).is_some() {
        command_dispatch::dispatch(ctx, session_id, Command::Move(direction), out);
        return Ok(());
    }

    let zone = ZoneId::new(dest.zone());
    let Some(owner) = sharding.zone_registry.owner_of(&zone) else {
        out.push(OutboundEvent::SendError { session_id, text: "That path is sealed for now.".into() });
        out.push(OutboundEvent::SendPrompt { session_id });
        return Ok(());
    };
    if owner == *sharding.self_engine_id {
        // Zone registry disagrees with the loaded world; nothing sensible to
        // hand off to. Fall back to the ordinary "can't go that way" path.
        command_dispatch::dispatch(ctx, session_id, Command::Move(direction), out);
        return Ok(());
    }

    if ctx.world.is_player_engaged(&player_id) {
        out.push(OutboundEvent::SendError { session_id, text: "You can't leave while fighting.".into() });
        out.push(OutboundEvent::SendPrompt { session_id });
        return Ok(());
    }

    handoff::initiate(
        ctx.registry,
        sharding.repo,
        sharding.bus,
        sharding.pending_handoffs,
        sharding.self_engine_id,
        session_id,
        dest,
        owner,
        ctx.now_ms,
        out,
    )
    .await
}

/// `goto <room-id>`: staff-only relocation, local or cross-engine.
async fn route_goto(
    ctx: &mut DispatchContext<'_>,
    sharding: &mut ShardingHandles<'_>,
    session_id: SessionId,
    token: &str,
    out: &mut Vec<OutboundEvent>,
) -> Result<(), PersistenceError> {
    if !is_staff(ctx, session_id) {
        out.push(OutboundEvent::SendError { session_id, text: "You don't have the authority to do that.".into() });
        out.push(OutboundEvent::SendPrompt { session_id });
        return Ok(());
    }
    let Ok(dest) = RoomId::parse(token.to_string()) else {
        out.push(OutboundEvent::SendError { session_id, text: "Unrecognized room id.".into() });
        out.push(OutboundEvent::SendPrompt { session_id });
        return Ok(());
    };

    if ctx.world.world.room(&dest).is_some() {
        if let Some(player) = ctx.registry.player_mut(session_id) {
            player.current_room_id = dest.clone();
        }
        command_dispatch::look_self(ctx, session_id, out);
        return Ok(());
    }

    let zone = ZoneId::new(dest.zone());
    let Some(owner) = sharding.zone_registry.owner_of(&zone) else {
        out.push(OutboundEvent::SendError { session_id, text: "That room doesn't exist anywhere in the cluster.".into() });
        out.push(OutboundEvent::SendPrompt { session_id });
        return Ok(());
    };
    if owner == *sharding.self_engine_id {
        out.push(OutboundEvent::SendError { session_id, text: "That room doesn't exist.".into() });
        out.push(OutboundEvent::SendPrompt { session_id });
        return Ok(());
    }

    handoff::initiate(
        ctx.registry,
        sharding.repo,
        sharding.bus,
        sharding.pending_handoffs,
        sharding.self_engine_id,
        session_id,
        dest,
        owner,
        ctx.now_ms,
        out,
    )
    .await
}

/// `transfer <player> <room-id>`: staff-only relocation of someone else.
/// When the target isn't on this engine, ships a `TransferRequest` to
/// whichever engine the location index last saw them on.
async fn route_transfer(
    ctx: &mut DispatchContext<'_>,
    sharding: &mut ShardingHandles<'_>,
    session_id: SessionId,
    target: &str,
    destination: &str,
    out: &mut Vec<OutboundEvent>,
) -> Result<(), PersistenceError> {
    if !is_staff(ctx, session_id) {
        out.push(OutboundEvent::SendError { session_id, text: "You don't have the authority to do that.".into() });
        out.push(OutboundEvent::SendPrompt { session_id });
        return Ok(());
    }
    let Ok(dest) = RoomId::parse(destination.to_string()) else {
        out.push(OutboundEvent::SendError { session_id, text: "Unrecognized room id.".into() });
        out.push(OutboundEvent::SendPrompt { session_id });
        return Ok(());
    };

    if let Some(target_session) = ctx.registry.session_for_name(target) {
        if ctx.world.world.room(&dest).is_some() {
            if let Some(player) = ctx.registry.player_mut(target_session) {
                player.current_room_id = dest.clone();
            }
            command_dispatch::look_self(ctx, target_session, out);
        } else {
            let zone = ZoneId::new(dest.zone());
            if let Some(owner) = sharding.zone_registry.owner_of(&zone) {
                if owner != *sharding.self_engine_id {
                    handoff::initiate(
                        ctx.registry,
                        sharding.repo,
                        sharding.bus,
                        sharding.pending_handoffs,
                        sharding.self_engine_id,
                        target_session,
                        dest,
                        owner,
                        ctx.now_ms,
                        out,
                    )
                    .await?;
                }
            }
        }
        out.push(OutboundEvent::SendInfo { session_id, text: format!("{target} transferred.") });
        out.push(OutboundEvent::SendPrompt { session_id });
        return Ok(());
    }

    sharding.bus.broadcast(InterEngineMessage::TransferRequest {
        player_name: target.to_string(),
        destination_room_id: dest,
    });
    out.push(OutboundEvent::SendInfo { session_id, text: format!("Transfer request sent for {target}.") });
    out.push(OutboundEvent::SendPrompt { session_id });
    Ok(())
}

/// `staffkick <player>`: disconnects a player, local or remote.
fn route_staff_kick(
    ctx: &mut DispatchContext<'_>,
    sharding: &mut ShardingHandles<'_>,
    session_id: SessionId,
    target: &str,
    out: &mut Vec<OutboundEvent>,
) {
    if !is_staff(ctx, session_id) {
        out.push(OutboundEvent::SendError { session_id, text: "You don't have the authority to do that.".into() });
        out.push(OutboundEvent::SendPrompt { session_id });
        return;
    }

    if let Some(target_session) = ctx.registry.session_for_name(target) {
        out.push(OutboundEvent::SendError { session_id: target_session, text: "You have been disconnected by staff.".into() });
        out.push(OutboundEvent::Close { session_id: target_session, reason: "staffkick".into() });
    } else {
        sharding.bus.broadcast(InterEngineMessage::KickRequest {
            player_name: target.to_string(),
            reason: "staffkick".into(),
        });
    }
    out.push(OutboundEvent::SendInfo { session_id, text: format!("{target} kicked.") });
    out.push(OutboundEvent::SendPrompt { session_id });
}

fn is_staff(ctx: &DispatchContext, session_id: SessionId) -> bool {
    ctx.registry.player(session_id).map(|p| p.is_staff).unwrap_or(false)
}

/// Dispatches a `KickRequest`/`TransferRequest` this engine received for one
/// of its own local players (spec.md §4.13 "staff goto/transfer/kick").
pub fn handle_remote_request(ctx: &mut DispatchContext<'_>, message: &InterEngineMessage, out: &mut Vec<OutboundEvent>) {
    match message {
        InterEngineMessage::KickRequest { player_name, .. } => {
            if let Some(session_id) = ctx.registry.session_for_name(player_name) {
                out.push(OutboundEvent::SendError { session_id, text: "You have been disconnected by staff.".into() });
                out.push(OutboundEvent::Close { session_id, reason: "staffkick".into() });
            }
        }
        InterEngineMessage::TransferRequest { player_name, destination_room_id } => {
            if let Some(session_id) = ctx.registry.session_for_name(player_name) {
                if ctx.world.world.room(destination_room_id).is_some() {
                    if let Some(player) = ctx.registry.player_mut(session_id) {
                        player.current_room_id = destination_room_id.clone();
                    }
                    command_dispatch::look_self(ctx, session_id, out);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PlayerRegistry;
    use crate::sharding::zone_registry::StaticZoneRegistry;
    use crate::world_state::WorldState;
    use ambonmud_domain::entities::PlayerState;
    use ambonmud_domain::ids::PlayerId;
    use ambonmud_domain::progression::XpCurve;
    use ambonmud_domain::random::FixedSequenceRandom;
    use ambonmud_domain::value_objects::{Attributes, Class, Race};
    use ambonmud_domain::world::{Room, World};
    use ambonmud_shared::config::{CombatConfig, ShardingConfig, ShardingSelectionConfig};
    use std::collections::HashMap as Map;
    use std::sync::Arc;

    fn two_engine_world() -> Arc<World> {
        let mut exits = Map::new();
        exits.insert(Direction::North, RoomId::new("far", "gate"));
        let room_a = Room { id: RoomId::new("home", "a"), title: "Home".into(), description: "".into(), exits };
        let mut rooms = Map::new();
        rooms.insert(room_a.id.clone(), room_a);
        Arc::new(World {
            rooms,
            start_room: RoomId::new("home", "a"),
            mob_spawns: vec![],
            item_spawns: vec![],
            zone_lifespans_minutes: Map::new(),
        })
    }

    fn sample_player() -> PlayerState {
        PlayerState {
            session_id: SessionId(1),
            player_id: PlayerId::new("ama"),
            name: "Ama".into(),
            current_room_id: RoomId::new("home", "a"),
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
        }
    }

    #[tokio::test]
    async fn move_into_unowned_foreign_zone_reports_sealed_path() {
        let mut world = WorldState::new(two_engine_world(), 0);
        let mut registry = PlayerRegistry::new(4, XpCurve { base_xp: 100.0, exponent: 1.5, linear_xp: 50.0, max_level: 50 }, true);
        registry.admit_player(sample_player());
        let combat_config = CombatConfig { min_damage: 1, max_damage: 2, round_interval_ms: 2000, max_combats_per_tick: 10 };
        let mut rng = FixedSequenceRandom::constant(0, 0.0);
        let abilities = Map::new();
        let status = Map::new();
        let mut ctx = DispatchContext {
            world: &mut world,
            registry: &mut registry,
            abilities: &abilities,
            status_effects: &status,
            combat_config: &combat_config,
            rng: &mut rng,
            now_ms: 0,
        };

        let zone_registry = StaticZoneRegistry::from_config(&ShardingConfig {
            replicated_zones: vec![],
            static_zones: Map::new(),
            selection: ShardingSelectionConfig { strategy: "power-of-two-choices".into(), load_ttl_seconds: 10, health_failure_threshold: 3 },
        });
        let bus = InterEngineBus::new(
            Arc::new(ambonmud_shared::bus::LocalBus::new(8)),
            EngineId::new("engine-a"),
        );
        let repo = crate::persistence::file_backend::FileRepository::open(tempfile::tempdir().unwrap().path().to_path_buf())
            .await
            .unwrap();
        let mut pending = PendingHandoffs::new();
        let mut global = GlobalCommandState::new();
        let self_engine_id = EngineId::new("engine-a");
        let mut handles = ShardingHandles {
            zone_registry: &zone_registry,
            bus: &bus,
            repo: &repo,
            pending_handoffs: &mut pending,
            global: &mut global,
            location_index: None,
            self_engine_id: &self_engine_id,
        };

        let mut out = Vec::new();
        route(&mut ctx, Some(&mut handles), SessionId(1), Command::Move(Direction::North), &mut out).await.unwrap();
        assert!(out.iter().any(|e| matches!(e, OutboundEvent::SendError { text, .. } if text.contains("sealed"))));
    }
}
