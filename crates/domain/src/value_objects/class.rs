use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Class {
    Warrior,
    Mage,
    Cleric,
    Rogue,
}

impl Class {
    pub const ALL: [Class; 4] = [Self::Warrior, Self::Mage, Self::Cleric, Self::Rogue];

    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "warrior" => Some(Self::Warrior),
            "mage" => Some(Self::Mage),
            "cleric" => Some(Self::Cleric),
            "rogue" => Some(Self::Rogue),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Warrior => "warrior",
            Self::Mage => "mage",
            Self::Cleric => "cleric",
            Self::Rogue => "rogue",
        }
    }

    /// HP granted per level-up, before constitution modifiers.
    pub fn hp_per_level(self) -> i32 {
        match self {
            Self::Warrior => 12,
            Self::Mage => 5,
            Self::Cleric => 8,
            Self::Rogue => 8,
        }
    }

    /// Mana granted per level-up, before wisdom modifiers.
    pub fn mana_per_level(self) -> i32 {
        match self {
            Self::Warrior => 2,
            Self::Mage => 12,
            Self::Cleric => 10,
            Self::Rogue => 4,
        }
    }
}
