use crate::ids::{ItemId, ItemTemplateId, MobId, PlayerId, RoomId};
use crate::entities::player_state::EquipSlot;
use serde::{Deserialize, Serialize};

/// Exactly one of these at a time - an item instance is referenced from at
/// most one container (spec.md §3, "item exclusivity").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemPlacement {
    RoomFloor(RoomId),
    PlayerInventory(PlayerId),
    PlayerSlot(PlayerId, EquipSlot),
    MobInventory(MobId),
    Unplaced,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemInstance {
    pub id: ItemId,
    pub template_id: ItemTemplateId,
    pub placement: ItemPlacement,
}

impl ItemInstance {
    pub fn new(id: ItemId, template_id: ItemTemplateId) -> Self {
        Self {
            id,
            template_id,
            placement: ItemPlacement::Unplaced,
        }
    }

    /// Moves the instance to a new placement. Since `placement` is a single
    /// field holding at most one variant, this can never create a second
    /// reference - the invariant holds by construction, not by runtime check.
    pub fn relocate(&mut self, new_placement: ItemPlacement) {
        self.placement = new_placement;
    }

    pub fn is_placed(&self) -> bool {
        !matches!(self.placement, ItemPlacement::Unplaced)
    }
}
