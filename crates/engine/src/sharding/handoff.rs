//! Cross-engine player handoff (spec.md §4.13, steps 1-7 and §8 scenarios).
//! Moving a player into a zone this engine doesn't own flushes their record,
//! ships the runtime fields the record doesn't carry, removes them locally,
//! and waits for an ack - with a timeout that restores them if the target
//! never answers.

use crate::command_dispatch::describe_room;
use crate::errors::PersistenceError;
use crate::persistence::PlayerRepository;
use crate::registry::PlayerRegistry;
use crate::sharding::inter_engine_bus::InterEngineBus;
use crate::world_state::WorldState;
use ambonmud_domain::entities::PlayerState;
use ambonmud_domain::ids::{EngineId, PlayerId, RoomId, SessionId};
use ambonmud_domain::record::PlayerRecord;
use ambonmud_shared::events::OutboundEvent;
use ambonmud_shared::inter_engine::{HandoffRuntimeState, InterEngineMessage};
use std::collections::HashMap;

/// An in-flight handoff this engine originated, keyed by the session that
/// left. Carries the removed `PlayerState` so a timeout can restore it
/// without a round trip to storage.
pub struct PendingHandoff {
    pub removed_player: PlayerState,
    pub target_room_id: RoomId,
    pub target_engine_id: EngineId,
    pub started_at_ms: i64,
}

#[derive(Default)]
pub struct PendingHandoffs {
    inner: HashMap<SessionId, PendingHandoff>,
}

impl PendingHandoffs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Removes and returns the pending entry for `session_id`, if any. Used
    /// both on `HandoffAck` and on timeout - either way the entry is
    /// resolved exactly once, so a duplicate ack after the first is ignored.
    pub fn take(&mut self, session_id: SessionId) -> Option<PendingHandoff> {
        self.inner.remove(&session_id)
    }

    /// Entries whose `handoffTimeoutMs` has elapsed, removed from the
    /// pending set.
    pub fn drain_timed_out(&mut self, timeout_ms: i64, now_ms: i64) -> Vec<(SessionId, PendingHandoff)> {
        let expired: Vec<SessionId> = self
            .inner
            .iter()
            .filter(|(_, pending)| now_ms - pending.started_at_ms >= timeout_ms)
            .map(|(session_id, _)| *session_id)
            .collect();
        expired
            .into_iter()
            .filter_map(|session_id| self.inner.remove(&session_id).map(|p| (session_id, p)))
            .collect()
    }
}

fn slot_to_token(slot: ambonmud_domain::entities::EquipSlot) -> &'static str {
    use ambonmud_domain::entities::EquipSlot::*;
    match slot {
        Head => "head",
        Chest => "chest",
        Legs => "legs",
        Feet => "feet",
        Hands => "hands",
        MainHand => "main_hand",
        OffHand => "off_hand",
        Ring => "ring",
    }
}

fn token_to_slot(token: &str) -> Option<ambonmud_domain::entities::EquipSlot> {
    use ambonmud_domain::entities::EquipSlot::*;
    Some(match token {
        "head" => Head,
        "chest" => Chest,
        "legs" => Legs,
        "feet" => Feet,
        "hands" => Hands,
        "main_hand" => MainHand,
        "off_hand" => OffHand,
        "ring" => Ring,
        _ => return None,
    })
}

/// Steps 1-7 of spec.md §4.13, run once the caller has already resolved
/// that `target_room_id`'s zone is owned by `target_engine_id` (a different
/// engine than this one). No combat state transfers - the caller is
/// expected to have already ended any fight before calling this.
pub async fn initiate(
    registry: &mut PlayerRegistry,
    repo: &dyn PlayerRepository,
    bus: &InterEngineBus,
    pending: &mut PendingHandoffs,
    self_engine_id: &EngineId,
    session_id: SessionId,
    target_room_id: RoomId,
    target_engine_id: EngineId,
    now_ms: i64,
    out: &mut Vec<OutboundEvent>,
) -> Result<(), PersistenceError> {
    let Some(player) = registry.player(session_id).cloned() else {
        return Ok(());
    };

    let mut record = repo.find_by_id(&player.player_id).await?.ok_or(PersistenceError::NotFound)?;
    record.current_room_id = target_room_id.clone();
    record.hp = player.hp;
    record.mana = player.mana;
    record.level = player.level;
    record.xp_total = player.xp_total;
    record.gold = player.gold;
    record.ansi_enabled = player.ansi_enabled;
    record.is_staff = player.is_staff;
    record.inventory = player.inventory.clone();
    record.equipped = player.equipped.clone();
    record.last_seen_at_ms = now_ms;
    repo.save(record.clone()).await?;

    let runtime = HandoffRuntimeState {
        hp: player.hp,
        mana: player.mana,
        level: player.level,
        xp_total: player.xp_total,
        ansi_enabled: player.ansi_enabled,
        is_staff: player.is_staff,
        inventory_item_ids: player.inventory.iter().map(|id| id.as_str().to_string()).collect(),
        equipped: player
            .equipped
            .iter()
            .map(|(slot, item)| (slot_to_token(*slot).to_string(), item.as_str().to_string()))
            .collect(),
    };

    registry.remove_player(session_id);

    bus.broadcast(InterEngineMessage::PlayerHandoff {
        player_id: player.player_id.clone(),
        session_id,
        record,
        runtime,
        target_room_id: target_room_id.clone(),
        origin_engine_id: self_engine_id.clone(),
    });
    out.push(OutboundEvent::SessionRedirect { session_id, target_engine_id: target_engine_id.clone() });

    pending.inner.insert(
        session_id,
        PendingHandoff { removed_player: player, target_room_id, target_engine_id, started_at_ms: now_ms },
    );
    Ok(())
}

/// Reconstructs a `PlayerState` from a received handoff and admits it into
/// this engine's registry, placing the player in the target room. Returns
/// the ack to send back over the bus.
pub fn admit(
    world: &WorldState,
    registry: &mut PlayerRegistry,
    player_id: PlayerId,
    session_id: SessionId,
    record: &PlayerRecord,
    runtime: &HandoffRuntimeState,
    target_room_id: RoomId,
    out: &mut Vec<OutboundEvent>,
) -> InterEngineMessage {
    let equipped = runtime
        .equipped
        .iter()
        .filter_map(|(slot_token, item_raw)| {
            let slot = token_to_slot(slot_token)?;
            let item = ambonmud_domain::ids::ItemId::parse(item_raw.clone()).ok()?;
            Some((slot, item))
        })
        .collect();
    let inventory = runtime
        .inventory_item_ids
        .iter()
        .filter_map(|raw| ambonmud_domain::ids::ItemId::parse(raw.clone()).ok())
        .collect();

    let player = PlayerState {
        session_id,
        player_id,
        name: record.name.clone(),
        current_room_id: target_room_id.clone(),
        race: record.race,
        class: record.class,
        attributes: record.attributes,
        hp: runtime.hp,
        max_hp: record.max_hp,
        mana: runtime.mana,
        max_mana: record.max_mana,
        level: runtime.level,
        xp_total: runtime.xp_total,
        gold: record.gold,
        ansi_enabled: runtime.ansi_enabled,
        is_staff: runtime.is_staff,
        equipped,
        inventory,
        known_abilities: Vec::new(),
    };
    let name = player.name.clone();
    registry.admit_player(player);

    for sid in registry.player_sessions_in_room(&target_room_id).collect::<Vec<_>>() {
        if sid != session_id {
            out.push(OutboundEvent::SendText { session_id: sid, text: format!("{name} arrives.") });
        }
    }
    if let Some(text) = describe_room(world, registry, &target_room_id, session_id) {
        out.push(OutboundEvent::SendText { session_id, text });
    }
    out.push(OutboundEvent::SendPrompt { session_id });

    InterEngineMessage::HandoffAck { session_id, accepted: true }
}

/// Undoes an in-progress handoff whose ack never arrived within
/// `handoffTimeoutMs` (spec.md §4.13 "On timeout"). Restores the player
/// locally and cancels the redirect so the gateway routes back here.
pub fn restore_after_timeout(
    registry: &mut PlayerRegistry,
    self_engine_id: &EngineId,
    session_id: SessionId,
    pending: PendingHandoff,
    out: &mut Vec<OutboundEvent>,
) {
    registry.admit_player(pending.removed_player);
    out.push(OutboundEvent::SendError {
        session_id,
        text: "Your journey falters and you are pulled back.".into(),
    });
    out.push(OutboundEvent::SendPrompt { session_id });
    out.push(OutboundEvent::SessionRedirect { session_id, target_engine_id: self_engine_id.clone() });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_out_entries_are_drained_once() {
        let mut pending = PendingHandoffs::new();
        pending.inner.insert(
            SessionId(1),
            PendingHandoff {
                removed_player: sample_player(),
                target_room_id: RoomId::new("demo", "b"),
                target_engine_id: EngineId::new("engine-b"),
                started_at_ms: 0,
            },
        );
        let expired = pending.drain_timed_out(1_000, 2_000);
        assert_eq!(expired.len(), 1);
        assert!(pending.is_empty());
        assert!(pending.drain_timed_out(1_000, 3_000).is_empty());
    }

    #[test]
    fn fresh_entry_is_not_timed_out() {
        let mut pending = PendingHandoffs::new();
        pending.inner.insert(
            SessionId(1),
            PendingHandoff {
                removed_player: sample_player(),
                target_room_id: RoomId::new("demo", "b"),
                target_engine_id: EngineId::new("engine-b"),
                started_at_ms: 1_000,
            },
        );
        assert!(pending.drain_timed_out(5_000, 2_000).is_empty());
    }

    fn sample_player() -> PlayerState {
        use ambonmud_domain::ids::PlayerId;
        use ambonmud_domain::value_objects::{Attributes, Class, Race};
        use std::collections::HashMap;
        PlayerState {
            session_id: SessionId(1),
            player_id: PlayerId::new("ama"),
            name: "Ama".into(),
            current_room_id: RoomId::new("demo", "a"),
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
            equipped: HashMap::new(),
            inventory: vec![],
            known_abilities: vec![],
        }
    }
}
