//! Emits `GmcpData` events at tick boundaries from each session's dirty
//! package set (spec.md §4.14). Composition is by package name: today only
//! `char.vitals` has a composer, but the match is the extension point for
//! whatever the content catalog eventually subscribes to.

use crate::registry::PlayerRegistry;
use ambonmud_domain::ids::SessionId;
use ambonmud_shared::events::OutboundEvent;
use ambonmud_shared::gmcp::{GmcpSubscription, VitalsSnapshot};
use std::collections::HashMap;

/// Drains every session's dirty set and emits one `GmcpData` per dirty
/// package whose snapshot this engine knows how to compose. An unknown
/// package name is drained and silently dropped - the subscription layer
/// already guarantees it was subscribed to, but no composer existing for it
/// just means nothing is sent this tick.
pub fn tick(
    registry: &PlayerRegistry,
    subscriptions: &mut HashMap<SessionId, GmcpSubscription>,
    out: &mut Vec<OutboundEvent>,
) {
    for (session_id, subscription) in subscriptions.iter_mut() {
        for package in subscription.drain_dirty() {
            if let Some(json) = compose(registry, *session_id, &package) {
                out.push(OutboundEvent::GmcpData {
                    session_id: *session_id,
                    package,
                    json,
                });
            }
        }
    }
}

fn compose(registry: &PlayerRegistry, session_id: SessionId, package: &str) -> Option<serde_json::Value> {
    match package {
        "char.vitals" => {
            let player = registry.player(session_id)?;
            let snapshot = VitalsSnapshot {
                hp: player.hp,
                max_hp: player.max_hp,
                mana: player.mana,
                max_mana: player.max_mana,
            };
            serde_json::to_value(snapshot).ok()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambonmud_domain::entities::PlayerState;
    use ambonmud_domain::ids::{PlayerId, RoomId};
    use ambonmud_domain::progression::XpCurve;
    use ambonmud_domain::value_objects::{Attributes, Class, Race};
    use std::collections::HashMap as Map;

    fn registry_with_player() -> PlayerRegistry {
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
            hp: 7,
            max_hp: 10,
            mana: 3,
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
    fn dirty_vitals_emits_composed_snapshot() {
        let registry = registry_with_player();
        let mut subs = HashMap::new();
        let mut sub = GmcpSubscription::with_core_packages(["char.vitals".to_string()]);
        sub.mark_dirty("char.vitals");
        subs.insert(SessionId(1), sub);

        let mut out = Vec::new();
        tick(&registry, &mut subs, &mut out);

        assert_eq!(out.len(), 1);
        match &out[0] {
            OutboundEvent::GmcpData { package, json, .. } => {
                assert_eq!(package, "char.vitals");
                assert_eq!(json["hp"], 7);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn nothing_dirty_emits_nothing() {
        let registry = registry_with_player();
        let mut subs = HashMap::new();
        subs.insert(SessionId(1), GmcpSubscription::with_core_packages(["char.vitals".to_string()]));
        let mut out = Vec::new();
        tick(&registry, &mut subs, &mut out);
        assert!(out.is_empty());
    }
}
