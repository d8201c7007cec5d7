//! Cluster-wide commands that don't fit in a single engine's local state
//! (spec.md §4.13 "Global commands"): `tell` (location index, else
//! broadcast-and-wait), `who` (broadcast, merge, note unreachable), `gossip`
//! (best-effort fan-out, no ordering guarantee), and the staff
//! `goto`/`transfer`/`kick`/`shutdown` family, which translate into a typed
//! request routed to the owning engine when the target isn't local.

use crate::registry::PlayerRegistry;
use crate::sharding::inter_engine_bus::InterEngineBus;
use crate::sharding::location_index::PlayerLocationIndex;
use ambonmud_domain::ids::SessionId;
use ambonmud_domain::random::RandomSource;
use ambonmud_shared::events::OutboundEvent;
use ambonmud_shared::inter_engine::InterEngineMessage;
use std::collections::HashMap;

/// How long an asker waits for a `tell` to land before hearing "not online".
pub const TELL_TIMEOUT_MS: i64 = 3_000;
/// How long `who` keeps collecting `WhoResponse`s before printing what it has.
pub const WHO_TIMEOUT_MS: i64 = 2_000;

struct PendingTell {
    target_name: String,
    deadline_ms: i64,
}

struct PendingWho {
    requester: SessionId,
    deadline_ms: i64,
    collected: Vec<String>,
    replied_engines: std::collections::HashSet<String>,
}

#[derive(Default)]
pub struct GlobalCommandState {
    pending_tells: HashMap<SessionId, PendingTell>,
    pending_who: HashMap<String, PendingWho>,
    pub shutdown_requested: bool,
}

impl GlobalCommandState {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sender_name(registry: &PlayerRegistry, session_id: SessionId) -> String {
    registry.player(session_id).map(|p| p.name.clone()).unwrap_or_default()
}

/// `tell <target> <message>` when `target` isn't a session on this engine.
/// Consults the location index first; if that's unknown or stale, broadcasts
/// and waits out `TELL_TIMEOUT_MS` for the remote side to have delivered it.
pub fn tell(
    state: &mut GlobalCommandState,
    registry: &PlayerRegistry,
    location_index: Option<&PlayerLocationIndex>,
    bus: &InterEngineBus,
    session_id: SessionId,
    target: &str,
    message: &str,
    now_ms: i64,
    out: &mut Vec<OutboundEvent>,
) {
    if let Some(index) = location_index {
        if index.lookup(target, 30_000, now_ms).is_none() {
            out.push(OutboundEvent::SendError { session_id, text: format!("{target} is not online.") });
            out.push(OutboundEvent::SendPrompt { session_id });
            return;
        }
    }

    let from_name = sender_name(registry, session_id);
    bus.broadcast(InterEngineMessage::TellMessage {
        from_name,
        to_name: target.to_string(),
        message: message.to_string(),
        reply_to_session: session_id,
    });
    state
        .pending_tells
        .insert(session_id, PendingTell { target_name: target.to_string(), deadline_ms: now_ms + TELL_TIMEOUT_MS });
    out.push(OutboundEvent::SendPrompt { session_id });
}

/// `who`: snapshots local players, broadcasts a request, and waits out
/// `WHO_TIMEOUT_MS` for every other engine's `WhoResponse` before printing
/// the merged roster.
pub fn who(
    state: &mut GlobalCommandState,
    registry: &PlayerRegistry,
    bus: &InterEngineBus,
    rng: &mut dyn RandomSource,
    session_id: SessionId,
    now_ms: i64,
) {
    let mut local_names: Vec<String> = registry.all_players().map(|p| p.name.clone()).collect();
    local_names.sort();
    let request_id = rng.gen_uuid().to_string();
    bus.broadcast(InterEngineMessage::WhoRequest { request_id: request_id.clone() });
    state.pending_who.insert(
        request_id,
        PendingWho {
            requester: session_id,
            deadline_ms: now_ms + WHO_TIMEOUT_MS,
            collected: local_names,
            replied_engines: std::collections::HashSet::new(),
        },
    );
}

/// `gossip`: every engine renders the line to its own players, best-effort,
/// with no total ordering across the cluster (spec.md §4.13).
pub fn gossip(registry: &PlayerRegistry, bus: &InterEngineBus, session_id: SessionId, message: &str, out: &mut Vec<OutboundEvent>) {
    let name = sender_name(registry, session_id);
    let text = format!("[Gossip] {name}: {message}");
    for player in registry.all_players() {
        out.push(OutboundEvent::SendText { session_id: player.session_id, text: text.clone() });
    }
    out.push(OutboundEvent::SendPrompt { session_id });
    bus.broadcast(InterEngineMessage::GlobalBroadcast { text });
}

/// `shutdown`: broadcasts the notice; every engine (including this one) runs
/// its own graceful stop on receipt.
pub fn shutdown(registry: &PlayerRegistry, bus: &InterEngineBus, session_id: SessionId, out: &mut Vec<OutboundEvent>) {
    out.push(OutboundEvent::SendInfo { session_id, text: "Shutting down the cluster...".into() });
    out.push(OutboundEvent::SendPrompt { session_id });
    for player in registry.all_players() {
        out.push(OutboundEvent::SendInfo {
            session_id: player.session_id,
            text: "The world is shutting down.".into(),
        });
    }
    bus.broadcast(InterEngineMessage::GlobalBroadcast { text: "__shutdown__".into() });
}

/// Dispatches everything this engine's inter-engine bus drained this tick
/// that isn't a handoff message (handoffs are handled by `sharding::handoff`
/// directly from the tick loop).
pub fn handle_incoming(
    state: &mut GlobalCommandState,
    registry: &PlayerRegistry,
    bus: &InterEngineBus,
    message: InterEngineMessage,
    out: &mut Vec<OutboundEvent>,
) {
    match message {
        InterEngineMessage::TellMessage { from_name, to_name, message, reply_to_session } => {
            if message == "(delivered)" {
                // This is a delivery confirmation bouncing back to the asker's
                // engine; clear the timeout so "not found" doesn't fire.
                if registry.player(reply_to_session).is_some() {
                    state.pending_tells.remove(&reply_to_session);
                }
                return;
            }
            if let Some(target_session) = registry.session_for_name(&to_name) {
                out.push(OutboundEvent::SendText {
                    session_id: target_session,
                    text: format!("{from_name} tells you, \"{message}\""),
                });
                out.push(OutboundEvent::SendPrompt { session_id: target_session });
                bus.broadcast(InterEngineMessage::TellMessage {
                    from_name: to_name,
                    to_name: from_name,
                    message: "(delivered)".into(),
                    reply_to_session,
                });
            }
        }
        InterEngineMessage::WhoRequest { request_id } => {
            let mut names: Vec<String> = registry.all_players().map(|p| p.name.clone()).collect();
            names.sort();
            bus.broadcast(InterEngineMessage::WhoResponse { request_id, names });
        }
        InterEngineMessage::WhoResponse { request_id, names } => {
            if let Some(pending) = state.pending_who.get_mut(&request_id) {
                for name in names {
                    if !pending.collected.contains(&name) {
                        pending.collected.push(name);
                    }
                }
                pending.replied_engines.insert(bus.self_engine_id().as_str().to_string());
            }
        }
        InterEngineMessage::GlobalBroadcast { text } => {
            if text == "__shutdown__" {
                state.shutdown_requested = true;
                return;
            }
            for player in registry.all_players() {
                out.push(OutboundEvent::SendText { session_id: player.session_id, text: text.clone() });
                out.push(OutboundEvent::SendPrompt { session_id: player.session_id });
            }
        }
        // PlayerHandoff/HandoffAck/SessionRedirect/TransferRequest/KickRequest/
        // LoadSnapshot are handled by sharding::handoff and the tick loop's
        // own routing, not here.
        _ => {}
    }
}

/// Flushes any `tell`/`who` whose deadline has passed, emitting the
/// player-visible result.
pub fn check_timeouts(state: &mut GlobalCommandState, now_ms: i64, out: &mut Vec<OutboundEvent>) {
    let expired_tells: Vec<(SessionId, String)> = state
        .pending_tells
        .iter()
        .filter(|(_, pending)| now_ms >= pending.deadline_ms)
        .map(|(session_id, pending)| (*session_id, pending.target_name.clone()))
        .collect();
    for (session_id, target_name) in expired_tells {
        state.pending_tells.remove(&session_id);
        out.push(OutboundEvent::SendError { session_id, text: format!("{target_name} is not online.") });
        out.push(OutboundEvent::SendPrompt { session_id });
    }

    let expired_who: Vec<String> = state
        .pending_who
        .iter()
        .filter(|(_, pending)| now_ms >= pending.deadline_ms)
        .map(|(request_id, _)| request_id.clone())
        .collect();
    for request_id in expired_who {
        let Some(pending) = state.pending_who.remove(&request_id) else { continue };
        let mut names = pending.collected;
        names.sort();
        names.dedup();
        let mut text = format!("Online ({}): {}", names.len(), names.join(", "));
        if pending.replied_engines.is_empty() {
            text.push_str(" (some servers unreachable)");
        }
        out.push(OutboundEvent::SendText { session_id: pending.requester, text });
        out.push(OutboundEvent::SendPrompt { session_id: pending.requester });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_tell_reports_not_online() {
        let mut state = GlobalCommandState::new();
        state
            .pending_tells
            .insert(SessionId(1), PendingTell { target_name: "Bob".into(), deadline_ms: 1_000 });
        let mut out = Vec::new();
        check_timeouts(&mut state, 2_000, &mut out);
        assert!(out.iter().any(|e| matches!(e, OutboundEvent::SendError { text, .. } if text.contains("not online"))));
        assert!(state.pending_tells.is_empty());
    }

    #[test]
    fn delivered_confirmation_clears_pending_tell() {
        use ambonmud_domain::entities::PlayerState;
        use ambonmud_domain::ids::PlayerId;
        use ambonmud_domain::ids::RoomId;
        use ambonmud_domain::progression::XpCurve;
        use ambonmud_domain::value_objects::{Attributes, Class, Race};
        use std::collections::HashMap as Map;
        use std::sync::Arc;

        let mut registry = PlayerRegistry::new(
            4,
            XpCurve { base_xp: 100.0, exponent: 1.5, linear_xp: 50.0, max_level: 50 },
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

        let mut state = GlobalCommandState::new();
        state
            .pending_tells
            .insert(SessionId(1), PendingTell { target_name: "Bob".into(), deadline_ms: 10_000 });

        let bus = InterEngineBus::new(
            Arc::new(ambonmud_shared::bus::LocalBus::new(8)),
            ambonmud_domain::ids::EngineId::new("engine-a"),
        );
        let mut out = Vec::new();
        handle_incoming(
            &mut state,
            &registry,
            &bus,
            InterEngineMessage::TellMessage {
                from_name: "Bob".into(),
                to_name: "Ama".into(),
                message: "(delivered)".into(),
                reply_to_session: SessionId(1),
            },
            &mut out,
        );
        assert!(state.pending_tells.is_empty());
    }
}
