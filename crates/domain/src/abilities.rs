//! Ability and status-effect definitions (spec.md §4.9). These are external
//! data in production - loaded from configuration - but validated once at
//! load time: unknown target types or effect kinds are a hard load-time
//! error, never silently skipped.

use crate::entities::status_effect::StackingRule;
use crate::value_objects::Class;
use crate::DomainError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetType {
    Enemy,
    SelfTarget,
    Ally,
    Area,
}

impl TargetType {
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "ENEMY" => Some(Self::Enemy),
            "SELF" => Some(Self::SelfTarget),
            "ALLY" => Some(Self::Ally),
            "AREA" => Some(Self::Area),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AbilityEffect {
    DirectDamage { min: i32, max: i32 },
    DirectHeal { min: i32, max: i32 },
    ApplyStatus { effect_id: String },
    AreaDamage { min: i32, max: i32, radius: u32 },
    Taunt,
}

impl AbilityEffect {
    pub fn from_tagged(kind: &str, raw: &serde_json::Value) -> Result<Self, DomainError> {
        match kind {
            "DirectDamage" | "DirectHeal" | "AreaDamage" | "ApplyStatus" | "Taunt" => {
                let mut wrapper = serde_json::Map::new();
                wrapper.insert(kind.to_string(), raw.clone());
                serde_json::from_value(serde_json::Value::Object(wrapper))
                    .map_err(|_| DomainError::UnknownEffectKind(kind.to_string()))
            }
            other => Err(DomainError::UnknownEffectKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbilityDefinition {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub mana_cost: i32,
    pub cooldown_ms: i64,
    pub level_required: u32,
    pub target_type: TargetType,
    pub class_restriction: Option<Class>,
    pub effect: AbilityEffect,
}

impl AbilityDefinition {
    pub fn is_known_by(&self, level: u32, class: Class) -> bool {
        self.level_required <= level
            && self.class_restriction.is_none_or(|c| c == class)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEffectDefinition {
    pub id: String,
    pub display_name: String,
    pub kind: crate::entities::status_effect::EffectKind,
    pub magnitude: i32,
    pub duration_ms: i64,
    pub tick_interval_ms: i64,
    pub stacking: StackingRule,
}

/// Validates a whole catalog at load time, rejecting unknown enum tokens
/// with a hard error rather than silently dropping the entry
/// (spec.md §4.9: "fail validation at load time (hard error, not silent
/// skip)").
pub fn validate_ability_catalog(defs: &[AbilityDefinition]) -> Result<(), DomainError> {
    for def in defs {
        if def.mana_cost < 0 {
            return Err(DomainError::InvalidAbilityDefinition(
                def.id.clone(),
                "mana_cost must be >= 0".into(),
            ));
        }
        if def.cooldown_ms < 0 {
            return Err(DomainError::InvalidAbilityDefinition(
                def.id.clone(),
                "cooldown_ms must be >= 0".into(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_type_tokens() {
        assert_eq!(TargetType::from_token("enemy"), Some(TargetType::Enemy));
        assert_eq!(TargetType::from_token("SELF"), Some(TargetType::SelfTarget));
        assert_eq!(TargetType::from_token("bogus"), None);
    }

    #[test]
    fn ability_known_respects_level_and_class() {
        let def = AbilityDefinition {
            id: "missile".into(),
            display_name: "Magic Missile".into(),
            description: "".into(),
            mana_cost: 8,
            cooldown_ms: 3000,
            level_required: 2,
            target_type: TargetType::Enemy,
            class_restriction: Some(Class::Mage),
            effect: AbilityEffect::DirectDamage { min: 4, max: 8 },
        };
        assert!(!def.is_known_by(1, Class::Mage));
        assert!(def.is_known_by(2, Class::Mage));
        assert!(!def.is_known_by(5, Class::Warrior));
    }

    #[test]
    fn effect_from_tagged_rejects_unknown_kind() {
        let err = AbilityEffect::from_tagged("Smite", &serde_json::json!({})).unwrap_err();
        assert_eq!(err, DomainError::UnknownEffectKind("Smite".into()));
    }
}
