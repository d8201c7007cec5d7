pub mod cooldowns;
pub mod fight;
pub mod item_instance;
pub mod mob_state;
pub mod player_state;
pub mod status_effect;

pub use cooldowns::Cooldowns;
pub use fight::Fight;
pub use item_instance::{ItemInstance, ItemPlacement};
pub use mob_state::{MobBehavior, MobState};
pub use player_state::{EquipSlot, PlayerState};
pub use status_effect::{EffectKind, StackingRule, StatusEffect};
