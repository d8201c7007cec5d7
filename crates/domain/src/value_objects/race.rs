use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Race {
    Human,
    Elf,
    Dwarf,
    Halfling,
}

impl Race {
    pub const ALL: [Race; 4] = [Self::Human, Self::Elf, Self::Dwarf, Self::Halfling];

    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "human" => Some(Self::Human),
            "elf" => Some(Self::Elf),
            "dwarf" => Some(Self::Dwarf),
            "halfling" => Some(Self::Halfling),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Elf => "elf",
            Self::Dwarf => "dwarf",
            Self::Halfling => "halfling",
        }
    }
}
