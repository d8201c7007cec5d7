//! Ability casting and status-effect ticking (spec.md §4.9). `cast` is the
//! `cast <spell> [target]` handler; `tick` advances every active
//! `StatusEffect` whose next tick is due and expires the ones that have run
//! their course. `STUN`/`ROOT` gating happens at the command-handler
//! boundary (`is_action_gated`), not here - this module only owns the
//! effects themselves.

use crate::registry::PlayerRegistry;
use crate::subsystems::combat;
use crate::world_state::WorldState;
use ambonmud_domain::abilities::{AbilityDefinition, AbilityEffect, TargetType};
use ambonmud_domain::entities::status_effect::{EffectKind, StackingRule, StatusTarget};
use ambonmud_domain::entities::StatusEffect;
use ambonmud_domain::errors::DomainError;
use ambonmud_domain::ids::{MobId, PlayerId, SessionId};
use ambonmud_domain::random::RandomSource;
use ambonmud_shared::events::OutboundEvent;
use std::collections::HashMap;

/// Resolves and applies `cast <spell> [target]` for one session (spec.md
/// §4.9 steps 1-7). Returns the typed error for any rejection; the command
/// handler turns that into a `SendError`.
#[allow(clippy::too_many_arguments)]
pub fn cast(
    world: &mut WorldState,
    registry: &mut PlayerRegistry,
    catalog: &HashMap<String, AbilityDefinition>,
    status_catalog: &HashMap<String, ambonmud_domain::abilities::StatusEffectDefinition>,
    session_id: SessionId,
    ability_id: &str,
    target_keyword: Option<&str>,
    rng: &mut dyn RandomSource,
    now_ms: i64,
    out: &mut Vec<OutboundEvent>,
) -> Result<(), DomainError> {
    let player = registry
        .player(session_id)
        .ok_or_else(|| DomainError::UnknownAbility(ability_id.to_string()))?;

    if !player.known_abilities.iter().any(|a| a == ability_id) {
        return Err(DomainError::UnknownAbility(ability_id.to_string()));
    }
    let def = catalog
        .get(ability_id)
        .ok_or_else(|| DomainError::UnknownAbility(ability_id.to_string()))?;

    if player.mana < def.mana_cost {
        return Err(DomainError::InsufficientMana {
            have: player.mana,
            need: def.mana_cost,
        });
    }
    if let Some(remaining) = world.cooldowns.remaining_ms(session_id, ability_id, now_ms) {
        return Err(DomainError::OnCooldown { remaining_ms: remaining });
    }

    let player_id = player.player_id.clone();
    let room_id = player.current_room_id.clone();

    let mob_target: Option<MobId> = match def.target_type {
        TargetType::Enemy => {
            let keyword = target_keyword.ok_or_else(|| DomainError::NoSuchTarget("".into()))?;
            let mob = world
                .find_mob_in_room(&room_id, keyword)
                .ok_or_else(|| DomainError::NoSuchTarget(keyword.to_string()))?;
            Some(mob.id.clone())
        }
        TargetType::SelfTarget | TargetType::Ally | TargetType::Area => None,
    };

    if let Some(player) = registry.player_mut(session_id) {
        player.spend_mana(def.mana_cost);
    }
    world.cooldowns.set_ready_at(session_id, ability_id, now_ms + def.cooldown_ms);

    match &def.effect {
        AbilityEffect::DirectDamage { min, max } => {
            let mob_id = mob_target.ok_or_else(|| DomainError::NoSuchTarget("".into()))?;
            apply_direct_damage(world, registry, &player_id, &mob_id, session_id, *min, *max, rng, now_ms, out);
        }
        AbilityEffect::AreaDamage { min, max, .. } => {
            let mob_ids: Vec<MobId> = world.mobs_in_room(&room_id).map(|m| m.id.clone()).collect();
            for mob_id in mob_ids {
                apply_direct_damage(world, registry, &player_id, &mob_id, session_id, *min, *max, rng, now_ms, out);
            }
        }
        AbilityEffect::DirectHeal { min, max } => {
            let amount = rng.gen_range(*min, *max);
            if let Some(player) = registry.player_mut(session_id) {
                player.heal(amount);
                out.push(OutboundEvent::SendInfo {
                    session_id,
                    text: format!("You are healed for {amount}."),
                });
            }
        }
        AbilityEffect::ApplyStatus { effect_id } => {
            let status_def = status_catalog
                .get(effect_id)
                .ok_or_else(|| DomainError::UnknownAbility(effect_id.clone()))?;
            let target = match mob_target {
                Some(mob_id) => StatusTarget::Mob(mob_id),
                None => StatusTarget::Player(player_id.clone()),
            };
            apply_status(world, target, status_def, ability_id, now_ms);
        }
        AbilityEffect::Taunt => {
            if let Some(mob_id) = mob_target {
                if !world.is_mob_engaged(&mob_id) {
                    world.start_fight(ambonmud_domain::entities::Fight {
                        player_id: player_id.clone(),
                        mob_id,
                        started_at_ms: now_ms,
                        next_round_at_ms: now_ms,
                    });
                }
            }
        }
    }

    out.push(OutboundEvent::SendPrompt { session_id });
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn apply_direct_damage(
    world: &mut WorldState,
    registry: &mut PlayerRegistry,
    player_id: &PlayerId,
    mob_id: &MobId,
    session_id: SessionId,
    min: i32,
    max: i32,
    rng: &mut dyn RandomSource,
    now_ms: i64,
    out: &mut Vec<OutboundEvent>,
) {
    // Direct damage bypasses mob armor entirely (spec.md §4.9 step 6),
    // unlike the melee roll in `combat::resolve_round`.
    let damage = rng.gen_range(min, max).max(1);
    let damage = absorb_shield(world, &StatusTarget::Mob(mob_id.clone()), damage);
    if let Some(mob) = world.mobs.get_mut(mob_id) {
        mob.apply_damage(damage);
    }
    out.push(OutboundEvent::SendText {
        session_id,
        text: format!("Your spell hits for {damage} damage."),
    });
    let mob_dead = world.mobs.get(mob_id).map(|m| m.is_dead()).unwrap_or(false);
    if mob_dead {
        combat::handle_mob_death(world, registry, session_id, player_id, mob_id, now_ms, rng, out);
    }
}

fn apply_status(
    world: &mut WorldState,
    target: StatusTarget,
    def: &ambonmud_domain::abilities::StatusEffectDefinition,
    ability_id: &str,
    now_ms: i64,
) {
    let existing_idx = world.status_effects.iter().position(|e| {
        e.target == target && e.source_ability_id == ability_id
    });

    match (def.stacking, existing_idx) {
        (StackingRule::Refresh, Some(idx)) => {
            world.status_effects[idx].refresh(now_ms);
        }
        (StackingRule::None, Some(_)) => {
            // A second application from the same source is ignored.
        }
        (StackingRule::Stack { max_stacks }, Some(_)) => {
            let count = world
                .status_effects
                .iter()
                .filter(|e| e.target == target && e.source_ability_id == ability_id)
                .count();
            if (count as u32) < max_stacks {
                push_new(world, target, def, ability_id, now_ms);
            }
        }
        (_, None) => push_new(world, target, def, ability_id, now_ms),
    }
}

fn push_new(
    world: &mut WorldState,
    target: StatusTarget,
    def: &ambonmud_domain::abilities::StatusEffectDefinition,
    ability_id: &str,
    now_ms: i64,
) {
    world.status_effects.push(StatusEffect {
        target,
        kind: def.kind,
        magnitude: def.magnitude,
        duration_ms: def.duration_ms,
        tick_interval_ms: def.tick_interval_ms,
        stacking: def.stacking,
        source_ability_id: ability_id.to_string(),
        applied_at_ms: now_ms,
        next_tick_at_ms: now_ms + def.tick_interval_ms,
        remaining_shield: if def.kind == EffectKind::Shield { def.magnitude } else { 0 },
        source_item: None,
    });
}

/// Advances every active effect whose next tick is due; removes and
/// reverts anything expired (spec.md §4.9 "status effect ticking").
pub fn tick(
    world: &mut WorldState,
    registry: &mut PlayerRegistry,
    now_ms: i64,
    out: &mut Vec<OutboundEvent>,
) {
    let mut i = 0;
    while i < world.status_effects.len() {
        let is_due = world.status_effects[i].is_due(now_ms);
        let is_expired = world.status_effects[i].is_expired(now_ms);

        if is_expired {
            let effect = world.status_effects.remove(i);
            notify_expiry(registry, &effect, out);
            continue;
        }

        if is_due {
            apply_periodic(world, registry, i, out);
            world.status_effects[i].advance_tick();
        }
        i += 1;
    }
}

fn apply_periodic(world: &mut WorldState, registry: &mut PlayerRegistry, idx: usize, out: &mut Vec<OutboundEvent>) {
    let (target, kind, magnitude) = {
        let effect = &world.status_effects[idx];
        (effect.target.clone(), effect.kind, effect.magnitude)
    };
    match (kind, target) {
        (EffectKind::DamageOverTime, StatusTarget::Player(player_id)) => {
            let amount = absorb_shield(world, &StatusTarget::Player(player_id.clone()), magnitude);
            if let Some(sid) = registry.all_players().find(|p| p.player_id == player_id).map(|p| p.session_id) {
                if let Some(player) = registry.player_mut(sid) {
                    player.apply_damage(amount);
                    if amount > 0 {
                        out.push(OutboundEvent::SendText {
                            session_id: sid,
                            text: format!("You suffer {amount} damage from a lingering effect."),
                        });
                    }
                }
            }
        }
        (EffectKind::DamageOverTime, StatusTarget::Mob(mob_id)) => {
            let amount = absorb_shield(world, &StatusTarget::Mob(mob_id.clone()), magnitude);
            if let Some(mob) = world.mobs.get_mut(&mob_id) {
                mob.apply_damage(amount);
            }
        }
        (EffectKind::HealOverTime, StatusTarget::Player(player_id)) => {
            if let Some(sid) = registry.all_players().find(|p| p.player_id == player_id).map(|p| p.session_id) {
                if let Some(player) = registry.player_mut(sid) {
                    player.heal(magnitude);
                }
            }
        }
        (EffectKind::HealOverTime, StatusTarget::Mob(mob_id)) => {
            if let Some(mob) = world.mobs.get_mut(&mob_id) {
                mob.hp = (mob.hp + magnitude).min(mob.max_hp);
            }
        }
        // StatModifier/Stun/Root/Shield carry no periodic tick contribution
        // of their own; Stun/Root gate action at the command boundary and
        // Shield's contribution happens at damage-application time via
        // `StatusEffect::absorb`.
        _ => {}
    }
}

/// Runs `incoming` through the target's active `Shield` effect, if any,
/// before it reaches HP (spec.md §4.9: "SHIELD absorbs incoming damage
/// before HP reduction"). Every production damage path goes through this
/// rather than calling `apply_damage` directly.
pub fn absorb_shield(world: &mut WorldState, target: &StatusTarget, incoming: i32) -> i32 {
    world
        .status_effects
        .iter_mut()
        .find(|e| e.kind == EffectKind::Shield && &e.target == target && e.remaining_shield > 0)
        .map(|effect| effect.absorb(incoming))
        .unwrap_or(incoming)
}

fn notify_expiry(registry: &PlayerRegistry, effect: &StatusEffect, out: &mut Vec<OutboundEvent>) {
    if let StatusTarget::Player(player_id) = &effect.target {
        if let Some(sid) = registry.all_players().find(|p| &p.player_id == player_id).map(|p| p.session_id) {
            out.push(OutboundEvent::SendInfo {
                session_id: sid,
                text: "An effect fades.".into(),
            });
        }
    }
}

/// Whether `player_id` is currently gated from acting by `STUN` or `ROOT`
/// (spec.md §4.9: "gate player actions at command-handler boundaries").
/// `ROOT` only gates movement; `movement_only` distinguishes the two call
/// sites (general command dispatch vs. the `move` handler specifically).
pub fn is_action_gated(world: &WorldState, player_id: &PlayerId, movement_only: bool) -> bool {
    world.status_effects.iter().any(|e| match e.kind {
        EffectKind::Stun => e.target == StatusTarget::Player(player_id.clone()),
        EffectKind::Root => movement_only && e.target == StatusTarget::Player(player_id.clone()),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambonmud_domain::ids::RoomId;
    use ambonmud_domain::progression::XpCurve;
    use ambonmud_domain::random::FixedSequenceRandom;
    use ambonmud_domain::value_objects::{Attributes, Class, Race};
    use ambonmud_domain::world::{Room, World};
    use std::collections::HashMap as Map;
    use std::sync::Arc;

    fn empty_world() -> WorldState {
        let room = Room {
            id: RoomId::new("demo", "r1"),
            title: "Room".into(),
            description: "".into(),
            exits: Map::new(),
        };
        let mut rooms = Map::new();
        rooms.insert(room.id.clone(), room);
        WorldState::new(
            Arc::new(World {
                rooms,
                start_room: RoomId::new("demo", "r1"),
                mob_spawns: vec![],
                item_spawns: vec![],
                zone_lifespans_minutes: Map::new(),
            }),
            0,
        )
    }

    fn registry_with_caster() -> PlayerRegistry {
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
            class: Class::Mage,
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
            known_abilities: vec!["heal".into()],
        });
        registry
    }

    fn heal_def() -> AbilityDefinition {
        AbilityDefinition {
            id: "heal".into(),
            display_name: "Heal".into(),
            description: "".into(),
            mana_cost: 8,
            cooldown_ms: 3000,
            level_required: 1,
            target_type: TargetType::SelfTarget,
            class_restriction: None,
            effect: AbilityEffect::DirectHeal { min: 4, max: 4 },
        }
    }

    #[test]
    fn cast_rejects_insufficient_mana() {
        let mut world = empty_world();
        let mut registry = registry_with_caster();
        if let Some(p) = registry.player_mut(SessionId(1)) {
            p.mana = 2;
        }
        let catalog = HashMap::from([("heal".to_string(), heal_def())]);
        let status_catalog = HashMap::new();
        let mut rng = FixedSequenceRandom::constant(4, 0.0);
        let mut out = Vec::new();
        let err = cast(&mut world, &mut registry, &catalog, &status_catalog, SessionId(1), "heal", None, &mut rng, 0, &mut out)
            .unwrap_err();
        assert!(matches!(err, DomainError::InsufficientMana { .. }));
    }

    #[test]
    fn cast_rejects_on_cooldown() {
        let mut world = empty_world();
        let mut registry = registry_with_caster();
        let catalog = HashMap::from([("heal".to_string(), heal_def())]);
        let status_catalog = HashMap::new();
        let mut rng = FixedSequenceRandom::constant(4, 0.0);
        let mut out = Vec::new();
        cast(&mut world, &mut registry, &catalog, &status_catalog, SessionId(1), "heal", None, &mut rng, 0, &mut out).unwrap();
        let err = cast(&mut world, &mut registry, &catalog, &status_catalog, SessionId(1), "heal", None, &mut rng, 500, &mut out)
            .unwrap_err();
        assert!(matches!(err, DomainError::OnCooldown { remaining_ms: 2500 }));
    }

    #[test]
    fn status_effect_ticks_then_expires() {
        let mut world = empty_world();
        let mut registry = registry_with_caster();
        world.status_effects.push(StatusEffect {
            target: StatusTarget::Player(PlayerId::new("ama")),
            kind: EffectKind::DamageOverTime,
            magnitude: 2,
            duration_ms: 4000,
            tick_interval_ms: 2000,
            stacking: StackingRule::Refresh,
            source_ability_id: "poison".into(),
            applied_at_ms: 0,
            next_tick_at_ms: 2000,
            remaining_shield: 0,
            source_item: None,
        });
        let mut out = Vec::new();
        tick(&mut world, &mut registry, 2000, &mut out);
        assert_eq!(registry.player(SessionId(1)).unwrap().hp, 8);
        assert_eq!(world.status_effects.len(), 1);

        tick(&mut world, &mut registry, 4000, &mut out);
        assert!(world.status_effects.is_empty());
    }

    #[test]
    fn shield_absorbs_periodic_damage_before_hp() {
        let mut world = empty_world();
        let mut registry = registry_with_caster();
        world.status_effects.push(StatusEffect {
            target: StatusTarget::Player(PlayerId::new("ama")),
            kind: EffectKind::Shield,
            magnitude: 5,
            duration_ms: 10_000,
            tick_interval_ms: 10_000,
            stacking: StackingRule::Refresh,
            source_ability_id: "ward".into(),
            applied_at_ms: 0,
            next_tick_at_ms: 10_000,
            remaining_shield: 5,
            source_item: None,
        });
        world.status_effects.push(StatusEffect {
            target: StatusTarget::Player(PlayerId::new("ama")),
            kind: EffectKind::DamageOverTime,
            magnitude: 3,
            duration_ms: 4000,
            tick_interval_ms: 2000,
            stacking: StackingRule::Refresh,
            source_ability_id: "poison".into(),
            applied_at_ms: 0,
            next_tick_at_ms: 2000,
            remaining_shield: 0,
            source_item: None,
        });

        let mut out = Vec::new();
        tick(&mut world, &mut registry, 2000, &mut out);

        assert_eq!(registry.player(SessionId(1)).unwrap().hp, 10);
        let shield = world
            .status_effects
            .iter()
            .find(|e| e.kind == EffectKind::Shield)
            .unwrap();
        assert_eq!(shield.remaining_shield, 2);
        assert!(!out.iter().any(|e| matches!(e, OutboundEvent::SendText { text, .. } if text.contains("lingering"))));
    }

    #[test]
    fn absorb_shield_passes_through_overflow_once_depleted() {
        let mut world = empty_world();
        world.status_effects.push(StatusEffect {
            target: StatusTarget::Player(PlayerId::new("ama")),
            kind: EffectKind::Shield,
            magnitude: 2,
            duration_ms: 10_000,
            tick_interval_ms: 10_000,
            stacking: StackingRule::Refresh,
            source_ability_id: "ward".into(),
            applied_at_ms: 0,
            next_tick_at_ms: 10_000,
            remaining_shield: 2,
            source_item: None,
        });

        let target = StatusTarget::Player(PlayerId::new("ama"));
        assert_eq!(absorb_shield(&mut world, &target, 5), 3);
        assert_eq!(absorb_shield(&mut world, &target, 5), 5);
    }
}
