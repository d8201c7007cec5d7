//! Routes a parsed [`Command`] to its handler (spec.md §4.5). Every handler
//! ends in exactly one `SendPrompt` unless it closes the session - callers
//! never need to remember to add one themselves.

use crate::registry::PlayerRegistry;
use crate::subsystems::{combat, mob_ai, status_effects};
use crate::world_state::WorldState;
use ambonmud_domain::abilities::{AbilityDefinition, StatusEffectDefinition};
use ambonmud_domain::command::Command;
use ambonmud_domain::entities::ItemPlacement;
use ambonmud_domain::ids::SessionId;
use ambonmud_domain::random::RandomSource;
use ambonmud_domain::world::Direction;
use ambonmud_shared::config::CombatConfig;
use ambonmud_shared::events::OutboundEvent;
use std::collections::HashMap;

pub struct DispatchContext<'a> {
    pub world: &'a mut WorldState,
    pub registry: &'a mut PlayerRegistry,
    pub abilities: &'a HashMap<String, AbilityDefinition>,
    pub status_effects: &'a HashMap<String, StatusEffectDefinition>,
    pub combat_config: &'a CombatConfig,
    pub rng: &'a mut dyn RandomSource,
    pub now_ms: i64,
}

/// Dispatches one already-logged-in session's command. `out` accumulates
/// every event the handler produces, in order.
pub fn dispatch(ctx: &mut DispatchContext, session_id: SessionId, command: Command, out: &mut Vec<OutboundEvent>) {
    let Some(player_id) = ctx.registry.player(session_id).map(|p| p.player_id.clone()) else {
        return;
    };

    if status_effects::is_action_gated(ctx.world, &player_id, matches!(command, Command::Move(_))) {
        out.push(OutboundEvent::SendError {
            session_id,
            text: "You can't do that right now.".into(),
        });
        out.push(OutboundEvent::SendPrompt { session_id });
        return;
    }

    match command {
        Command::Move(direction) => handle_move(ctx, session_id, direction, out),
        Command::Look(target) => handle_look(ctx, session_id, target, out),

        Command::Say(message) => broadcast_room(ctx, session_id, |name| format!("{name} says, \"{message}\""), out),
        Command::Emote(action) => broadcast_room(ctx, session_id, |name| format!("{name} {action}"), out),
        Command::Ooc(message) => broadcast_everyone(ctx, session_id, |name| format!("[OOC] {name}: {message}"), out),
        Command::Gossip(message) => broadcast_everyone(ctx, session_id, |name| format!("[Gossip] {name}: {message}"), out),
        Command::Shout(message) => broadcast_everyone(ctx, session_id, |name| format!("{name} shouts, \"{message}\""), out),
        Command::Tell { target, message } => handle_tell(ctx, session_id, &target, &message, out),
        Command::Whisper { target, message } => handle_whisper(ctx, session_id, &target, &message, out),

        Command::Get(item) => handle_get(ctx, session_id, &item, out),
        Command::Drop(item) => handle_drop(ctx, session_id, &item, out),
        Command::Inventory => handle_inventory(ctx, session_id, out),
        Command::Equipment => handle_equipment(ctx, session_id, out),

        Command::Kill(target) => handle_kill(ctx, session_id, &target, out),
        Command::Flee => handle_flee(ctx, session_id, &player_id, out),
        Command::Cast { spell, target } => handle_cast(ctx, session_id, &spell, target.as_deref(), out),

        Command::Score => handle_score(ctx, session_id, out),
        Command::Who => handle_who(ctx, session_id, out),
        Command::Ansi(toggle) => handle_ansi(ctx, session_id, toggle, out),

        Command::Help(_) | Command::Clear | Command::Colors => {
            out.push(OutboundEvent::SendInfo {
                session_id,
                text: "Type 'look' to get your bearings.".into(),
            });
            out.push(OutboundEvent::SendPrompt { session_id });
        }

        Command::Invalid { usage } => {
            out.push(OutboundEvent::SendError {
                session_id,
                text: format!("Usage: {usage}"),
            });
            out.push(OutboundEvent::SendPrompt { session_id });
        }
        Command::Unknown(verb) => {
            out.push(OutboundEvent::SendError {
                session_id,
                text: format!("Unknown command '{verb}'."),
            });
            out.push(OutboundEvent::SendPrompt { session_id });
        }
        Command::Noop => {
            out.push(OutboundEvent::SendPrompt { session_id });
        }

        // Group, shop, quest, staff and phased-tutorial commands parse
        // successfully (spec.md §4.5 grammar) but have no backing subsystem
        // in this deployment - they surface a clear "not available" message
        // rather than silently no-opping.
        _ => {
            out.push(OutboundEvent::SendInfo {
                session_id,
                text: "That isn't available here.".into(),
            });
            out.push(OutboundEvent::SendPrompt { session_id });
        }
    }
}

fn handle_move(ctx: &mut DispatchContext, session_id: SessionId, direction: Direction, out: &mut Vec<OutboundEvent>) {
    let Some(player) = ctx.registry.player(session_id) else { return };
    let player_id = player.player_id.clone();
    if ctx.world.is_player_engaged(&player_id) {
        out.push(OutboundEvent::SendError {
            session_id,
            text: "You can't leave while fighting.".into(),
        });
        out.push(OutboundEvent::SendPrompt { session_id });
        return;
    }

    let current_room_id = player.current_room_id.clone();
    let Some(room) = ctx.world.world.room(&current_room_id) else { return };
    let Some(dest) = room.exits.get(&direction).cloned() else {
        out.push(OutboundEvent::SendError {
            session_id,
            text: "You can't go that way.".into(),
        });
        out.push(OutboundEvent::SendPrompt { session_id });
        return;
    };

    for sid in ctx.registry.player_sessions_in_room(&current_room_id).collect::<Vec<_>>() {
        if sid != session_id {
            out.push(OutboundEvent::SendText {
                session_id: sid,
                text: format!("{} leaves {}.", player_name(ctx, session_id), direction.as_str()),
            });
        }
    }

    if let Some(player) = ctx.registry.player_mut(session_id) {
        player.current_room_id = dest.clone();
    }

    for sid in ctx.registry.player_sessions_in_room(&dest).collect::<Vec<_>>() {
        if sid != session_id {
            out.push(OutboundEvent::SendText {
                session_id: sid,
                text: format!("{} arrives from {}.", player_name(ctx, session_id), direction.opposite().as_str()),
            });
        }
    }

    mob_ai::on_player_entered_room(ctx.world, ctx.registry, &player_id, &dest, ctx.combat_config, ctx.now_ms, out);
    handle_look(ctx, session_id, None, out);
}

/// Renders `session_id`'s current room to themself, exactly as `look` would.
/// Used by the command router after a local `goto`/`transfer` relocation.
pub(crate) fn look_self(ctx: &mut DispatchContext, session_id: SessionId, out: &mut Vec<OutboundEvent>) {
    handle_look(ctx, session_id, None, out);
}

fn handle_look(ctx: &mut DispatchContext, session_id: SessionId, _target: Option<String>, out: &mut Vec<OutboundEvent>) {
    let Some(player) = ctx.registry.player(session_id) else { return };
    let room_id = player.current_room_id.clone();
    let Some(text) = describe_room(ctx.world, ctx.registry, &room_id, session_id) else { return };
    out.push(OutboundEvent::SendText { session_id, text });
    out.push(OutboundEvent::SendPrompt { session_id });
}

/// Renders a room from `viewer_session_id`'s point of view: title,
/// description, mobs present, and other players present. Shared with the
/// login flow (first look on entering the world) and handoff admission
/// (first look after arriving from another engine).
pub(crate) fn describe_room(
    world: &WorldState,
    registry: &PlayerRegistry,
    room_id: &ambonmud_domain::ids::RoomId,
    viewer_session_id: SessionId,
) -> Option<String> {
    let room = world.world.room(room_id)?;
    let mut text = format!("{}\n{}", room.title, room.description);
    for mob in world.mobs_in_room(room_id) {
        text.push_str(&format!("\n{} is here.", mob.name));
    }
    for sid in registry.player_sessions_in_room(room_id) {
        if sid != viewer_session_id {
            if let Some(other) = registry.player(sid) {
                text.push_str(&format!("\n{} is here.", other.name));
            }
        }
    }
    Some(text)
}

fn broadcast_room(ctx: &mut DispatchContext, session_id: SessionId, render: impl Fn(&str) -> String, out: &mut Vec<OutboundEvent>) {
    let Some(player) = ctx.registry.player(session_id) else { return };
    let room_id = player.current_room_id.clone();
    let text = render(&player.name);
    for sid in ctx.registry.player_sessions_in_room(&room_id) {
        out.push(OutboundEvent::SendText { session_id: sid, text: text.clone() });
    }
    out.push(OutboundEvent::SendPrompt { session_id });
}

fn broadcast_everyone(ctx: &mut DispatchContext, session_id: SessionId, render: impl Fn(&str) -> String, out: &mut Vec<OutboundEvent>) {
    let Some(player) = ctx.registry.player(session_id) else { return };
    let text = render(&player.name);
    for other in ctx.registry.all_players() {
        out.push(OutboundEvent::SendText {
            session_id: other.session_id,
            text: text.clone(),
        });
    }
    out.push(OutboundEvent::SendPrompt { session_id });
}

fn handle_tell(ctx: &mut DispatchContext, session_id: SessionId, target: &str, message: &str, out: &mut Vec<OutboundEvent>) {
    let Some(sender) = ctx.registry.player(session_id) else { return };
    let text = format!("{} tells you, \"{message}\"", sender.name);
    match ctx.registry.session_for_name(target) {
        Some(target_session) => {
            out.push(OutboundEvent::SendText { session_id: target_session, text });
        }
        None => {
            out.push(OutboundEvent::SendError {
                session_id,
                text: format!("{target} is not online."),
            });
        }
    }
    out.push(OutboundEvent::SendPrompt { session_id });
}

fn handle_whisper(ctx: &mut DispatchContext, session_id: SessionId, target: &str, message: &str, out: &mut Vec<OutboundEvent>) {
    let Some(sender) = ctx.registry.player(session_id) else { return };
    let room_id = sender.current_room_id.clone();
    let sender_name = sender.name.clone();
    match ctx
        .registry
        .player_sessions_in_room(&room_id)
        .find(|sid| ctx.registry.player(*sid).map(|p| p.name.eq_ignore_ascii_case(target)).unwrap_or(false))
    {
        Some(target_session) => {
            out.push(OutboundEvent::SendText {
                session_id: target_session,
                text: format!("{sender_name} whispers, \"{message}\""),
            });
        }
        None => {
            out.push(OutboundEvent::SendError {
                session_id,
                text: format!("{target} is not here."),
            });
        }
    }
    out.push(OutboundEvent::SendPrompt { session_id });
}

fn handle_get(ctx: &mut DispatchContext, session_id: SessionId, keyword: &str, out: &mut Vec<OutboundEvent>) {
    let Some(player) = ctx.registry.player(session_id) else { return };
    let room_id = player.current_room_id.clone();
    let player_id = player.player_id.clone();
    let needle = keyword.to_ascii_lowercase();

    let found = ctx
        .world
        .items_on_floor(&room_id)
        .find(|i| i.template_id.local().to_ascii_lowercase().contains(&needle))
        .map(|i| i.id.clone());

    match found {
        Some(item_id) => {
            if let Some(item) = ctx.world.items.get_mut(&item_id) {
                item.relocate(ItemPlacement::PlayerInventory(player_id));
            }
            if let Some(player) = ctx.registry.player_mut(session_id) {
                player.inventory.push(item_id);
            }
            out.push(OutboundEvent::SendInfo {
                session_id,
                text: format!("You pick up the {keyword}."),
            });
        }
        None => {
            out.push(OutboundEvent::SendError {
                session_id,
                text: format!("You don't see '{keyword}' here."),
            });
        }
    }
    out.push(OutboundEvent::SendPrompt { session_id });
}

fn handle_drop(ctx: &mut DispatchContext, session_id: SessionId, keyword: &str, out: &mut Vec<OutboundEvent>) {
    let Some(player) = ctx.registry.player(session_id) else { return };
    let room_id = player.current_room_id.clone();
    let needle = keyword.to_ascii_lowercase();

    let held = player
        .inventory
        .iter()
        .find(|id| id.local().to_ascii_lowercase().contains(&needle))
        .cloned();

    match held {
        Some(item_id) => {
            if let Some(item) = ctx.world.items.get_mut(&item_id) {
                item.relocate(ItemPlacement::RoomFloor(room_id));
            }
            if let Some(player) = ctx.registry.player_mut(session_id) {
                player.inventory.retain(|id| id != &item_id);
            }
            out.push(OutboundEvent::SendInfo {
                session_id,
                text: format!("You drop the {keyword}."),
            });
        }
        None => {
            out.push(OutboundEvent::SendError {
                session_id,
                text: format!("You aren't carrying '{keyword}'."),
            });
        }
    }
    out.push(OutboundEvent::SendPrompt { session_id });
}

fn handle_inventory(ctx: &mut DispatchContext, session_id: SessionId, out: &mut Vec<OutboundEvent>) {
    let Some(player) = ctx.registry.player(session_id) else { return };
    let text = if player.inventory.is_empty() {
        "You are carrying nothing.".to_string()
    } else {
        let items: Vec<&str> = player.inventory.iter().map(|id| id.local()).collect();
        format!("You are carrying: {}", items.join(", "))
    };
    out.push(OutboundEvent::SendText { session_id, text });
    out.push(OutboundEvent::SendPrompt { session_id });
}

fn handle_equipment(ctx: &mut DispatchContext, session_id: SessionId, out: &mut Vec<OutboundEvent>) {
    let Some(player) = ctx.registry.player(session_id) else { return };
    let text = if player.equipped.is_empty() {
        "You have nothing equipped.".to_string()
    } else {
        let items: Vec<String> = player
            .equipped
            .iter()
            .map(|(slot, id)| format!("{slot:?}: {}", id.local()))
            .collect();
        format!("You are wearing: {}", items.join(", "))
    };
    out.push(OutboundEvent::SendText { session_id, text });
    out.push(OutboundEvent::SendPrompt { session_id });
}

fn handle_kill(ctx: &mut DispatchContext, session_id: SessionId, target: &str, out: &mut Vec<OutboundEvent>) {
    match combat::start_fight(ctx.world, ctx.registry, session_id, target, ctx.combat_config, ctx.now_ms) {
        Ok(_) => out.push(OutboundEvent::SendInfo {
            session_id,
            text: format!("You attack {target}!"),
        }),
        Err(err) => out.push(OutboundEvent::SendError {
            session_id,
            text: err.to_string(),
        }),
    }
    out.push(OutboundEvent::SendPrompt { session_id });
}

fn handle_flee(ctx: &mut DispatchContext, session_id: SessionId, player_id: &ambonmud_domain::ids::PlayerId, out: &mut Vec<OutboundEvent>) {
    let text = if combat::flee(ctx.world, player_id) {
        "You flee from combat!"
    } else {
        "You aren't fighting anything."
    };
    out.push(OutboundEvent::SendInfo {
        session_id,
        text: text.to_string(),
    });
    out.push(OutboundEvent::SendPrompt { session_id });
}

fn handle_cast(ctx: &mut DispatchContext, session_id: SessionId, spell: &str, target: Option<&str>, out: &mut Vec<OutboundEvent>) {
    let result = status_effects::cast(
        ctx.world,
        ctx.registry,
        ctx.abilities,
        ctx.status_effects,
        session_id,
        spell,
        target,
        ctx.rng,
        ctx.now_ms,
        out,
    );
    if let Err(err) = result {
        out.push(OutboundEvent::SendError {
            session_id,
            text: err.to_string(),
        });
        out.push(OutboundEvent::SendPrompt { session_id });
    }
}

fn handle_score(ctx: &mut DispatchContext, session_id: SessionId, out: &mut Vec<OutboundEvent>) {
    let Some(player) = ctx.registry.player(session_id) else { return };
    let text = format!(
        "{} - level {} {:?} {:?} - HP {}/{} - mana {}/{} - gold {}",
        player.name, player.level, player.race, player.class, player.hp, player.max_hp, player.mana, player.max_mana, player.gold
    );
    out.push(OutboundEvent::SendText { session_id, text });
    out.push(OutboundEvent::SendPrompt { session_id });
}

/// Local-engine fallback for `who`: lists players resident on this engine.
/// In a sharded deployment `command_router` intercepts `Command::Who` before
/// it reaches here and answers with the cross-engine roster instead.
fn handle_who(ctx: &mut DispatchContext, session_id: SessionId, out: &mut Vec<OutboundEvent>) {
    let mut names: Vec<String> = ctx
        .registry
        .all_players()
        .map(|p| format!("{} - level {} {:?}", p.name, p.level, p.class))
        .collect();
    names.sort();
    let mut text = format!("Players online ({}):", names.len());
    for line in names.drain(..) {
        text.push('\n');
        text.push_str(&line);
    }
    out.push(OutboundEvent::SendText { session_id, text });
    out.push(OutboundEvent::SendPrompt { session_id });
}

fn handle_ansi(ctx: &mut DispatchContext, session_id: SessionId, toggle: Option<bool>, out: &mut Vec<OutboundEvent>) {
    let Some(player) = ctx.registry.player_mut(session_id) else { return };
    let enabled = match toggle {
        Some(value) => {
            player.ansi_enabled = value;
            value
        }
        None => player.ansi_enabled,
    };
    out.push(OutboundEvent::SetAnsi { session_id, enabled });
    out.push(OutboundEvent::SendInfo {
        session_id,
        text: format!("ANSI color is {}.", if enabled { "on" } else { "off" }),
    });
    out.push(OutboundEvent::SendPrompt { session_id });
}

fn player_name(ctx: &DispatchContext, session_id: SessionId) -> String {
    ctx.registry.player(session_id).map(|p| p.name.clone()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambonmud_domain::entities::PlayerState;
    use ambonmud_domain::ids::{MobSpawnId, PlayerId, RoomId};
    use ambonmud_domain::progression::XpCurve;
    use ambonmud_domain::random::FixedSequenceRandom;
    use ambonmud_domain::value_objects::{Attributes, Class, Race};
    use ambonmud_domain::world::{Direction, MobSpawnDef, Room, World};
    use std::collections::HashMap as Map;
    use std::sync::Arc;

    fn two_room_world() -> Arc<World> {
        let mut exits_a = Map::new();
        exits_a.insert(Direction::North, RoomId::new("demo", "b"));
        let room_a = Room {
            id: RoomId::new("demo", "a"),
            title: "Room A".into(),
            description: "A quiet clearing.".into(),
            exits: exits_a,
        };
        let room_b = Room {
            id: RoomId::new("demo", "b"),
            title: "Room B".into(),
            description: "A dim cave.".into(),
            exits: Map::new(),
        };
        let mut rooms = Map::new();
        rooms.insert(room_a.id.clone(), room_a);
        rooms.insert(room_b.id.clone(), room_b);
        Arc::new(World {
            rooms,
            start_room: RoomId::new("demo", "a"),
            mob_spawns: vec![],
            item_spawns: vec![],
            zone_lifespans_minutes: Map::new(),
        })
    }

    fn sample_player(session_id: u64, room_id: RoomId) -> PlayerState {
        PlayerState {
            session_id: SessionId(session_id),
            player_id: PlayerId::new(format!("p{session_id}")),
            name: format!("Hero{session_id}"),
            current_room_id: room_id,
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

    fn registry() -> PlayerRegistry {
        PlayerRegistry::new(
            4,
            XpCurve {
                base_xp: 100.0,
                exponent: 1.5,
                linear_xp: 50.0,
                max_level: 50,
            },
            true,
        )
    }

    #[test]
    fn move_relocates_player_and_describes_new_room() {
        let mut world = WorldState::new(two_room_world(), 0);
        let mut registry = registry();
        registry.admit_player(sample_player(1, RoomId::new("demo", "a")));
        let combat_config = CombatConfig {
            min_damage: 1,
            max_damage: 2,
            round_interval_ms: 2000,
            max_combats_per_tick: 10,
        };
        let mut rng = FixedSequenceRandom::constant(0, 0.0);
        let abilities = HashMap::new();
        let status = HashMap::new();
        let mut ctx = DispatchContext {
            world: &mut world,
            registry: &mut registry,
            abilities: &abilities,
            status_effects: &status,
            combat_config: &combat_config,
            rng: &mut rng,
            now_ms: 0,
        };
        let mut out = Vec::new();
        dispatch(&mut ctx, SessionId(1), Command::Move(Direction::North), &mut out);
        assert_eq!(ctx.registry.player(SessionId(1)).unwrap().current_room_id, RoomId::new("demo", "b"));
        assert!(out.iter().any(|e| matches!(e, OutboundEvent::SendText { text, .. } if text.contains("Room B"))));
    }

    #[test]
    fn move_rejects_missing_exit() {
        let mut world = WorldState::new(two_room_world(), 0);
        let mut registry = registry();
        registry.admit_player(sample_player(1, RoomId::new("demo", "b")));
        let combat_config = CombatConfig {
            min_damage: 1,
            max_damage: 2,
            round_interval_ms: 2000,
            max_combats_per_tick: 10,
        };
        let mut rng = FixedSequenceRandom::constant(0, 0.0);
        let abilities = HashMap::new();
        let status = HashMap::new();
        let mut ctx = DispatchContext {
            world: &mut world,
            registry: &mut registry,
            abilities: &abilities,
            status_effects: &status,
            combat_config: &combat_config,
            rng: &mut rng,
            now_ms: 0,
        };
        let mut out = Vec::new();
        dispatch(&mut ctx, SessionId(1), Command::Move(Direction::South), &mut out);
        assert!(out.iter().any(|e| matches!(e, OutboundEvent::SendError { text, .. } if text.contains("can't go"))));
    }

    #[test]
    fn kill_missing_target_sends_error() {
        let mut world = WorldState::new(two_room_world(), 0);
        let mut registry = registry();
        registry.admit_player(sample_player(1, RoomId::new("demo", "a")));
        let combat_config = CombatConfig {
            min_damage: 1,
            max_damage: 2,
            round_interval_ms: 2000,
            max_combats_per_tick: 10,
        };
        let mut rng = FixedSequenceRandom::constant(0, 0.0);
        let abilities = HashMap::new();
        let status = HashMap::new();
        let mut ctx = DispatchContext {
            world: &mut world,
            registry: &mut registry,
            abilities: &abilities,
            status_effects: &status,
            combat_config: &combat_config,
            rng: &mut rng,
            now_ms: 0,
        };
        let mut out = Vec::new();
        dispatch(&mut ctx, SessionId(1), Command::Kill("nothing".into()), &mut out);
        assert!(out.iter().any(|e| matches!(e, OutboundEvent::SendError { .. })));
    }

    #[test]
    fn unknown_verb_reports_error_and_prompts() {
        let mut world = WorldState::new(two_room_world(), 0);
        let mut registry = registry();
        registry.admit_player(sample_player(1, RoomId::new("demo", "a")));
        let combat_config = CombatConfig {
            min_damage: 1,
            max_damage: 2,
            round_interval_ms: 2000,
            max_combats_per_tick: 10,
        };
        let mut rng = FixedSequenceRandom::constant(0, 0.0);
        let abilities = HashMap::new();
        let status = HashMap::new();
        let mut ctx = DispatchContext {
            world: &mut world,
            registry: &mut registry,
            abilities: &abilities,
            status_effects: &status,
            combat_config: &combat_config,
            rng: &mut rng,
            now_ms: 0,
        };
        let mut out = Vec::new();
        dispatch(&mut ctx, SessionId(1), Command::Unknown("frobnicate".into()), &mut out);
        assert!(matches!(out[0], OutboundEvent::SendError { .. }));
        assert!(matches!(out[1], OutboundEvent::SendPrompt { .. }));
    }

    #[test]
    fn stunned_player_is_gated_from_acting() {
        let mut world = WorldState::new(two_room_world(), 0);
        let mut registry = registry();
        registry.admit_player(sample_player(1, RoomId::new("demo", "a")));
        world.status_effects.push(ambonmud_domain::entities::StatusEffect {
            target: ambonmud_domain::entities::status_effect::StatusTarget::Player(PlayerId::new("p1")),
            kind: ambonmud_domain::entities::EffectKind::Stun,
            magnitude: 0,
            duration_ms: 5000,
            tick_interval_ms: 5000,
            stacking: ambonmud_domain::entities::StackingRule::Refresh,
            source_ability_id: "stunner".into(),
            applied_at_ms: 0,
            next_tick_at_ms: 5000,
            remaining_shield: 0,
            source_item: None,
        });
        let combat_config = CombatConfig {
            min_damage: 1,
            max_damage: 2,
            round_interval_ms: 2000,
            max_combats_per_tick: 10,
        };
        let mut rng = FixedSequenceRandom::constant(0, 0.0);
        let abilities = HashMap::new();
        let status = HashMap::new();
        let mut ctx = DispatchContext {
            world: &mut world,
            registry: &mut registry,
            abilities: &abilities,
            status_effects: &status,
            combat_config: &combat_config,
            rng: &mut rng,
            now_ms: 0,
        };
        let mut out = Vec::new();
        dispatch(&mut ctx, SessionId(1), Command::Look(None), &mut out);
        assert!(out.iter().any(|e| matches!(e, OutboundEvent::SendError { text, .. } if text.contains("can't do that"))));
    }
}
