//! Inter-engine message variants (spec.md §4.13). Carried inside a signed
//! [`crate::envelope::Envelope`] over either the distributed pub/sub bus or
//! the RPC-streaming bus; encoded with `bincode` so every variant
//! round-trips without loss (spec.md §6).

use ambonmud_domain::ids::{EngineId, PlayerId, RoomId, SessionId, ZoneId};
use serde::{Deserialize, Serialize};

/// The runtime fields a `PlayerRecord` doesn't carry, needed to resume
/// simulation on the target engine without a full reload (spec.md §4.13
/// step 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffRuntimeState {
    pub hp: i32,
    pub mana: i32,
    pub level: u32,
    pub xp_total: u64,
    pub ansi_enabled: bool,
    pub is_staff: bool,
    pub inventory_item_ids: Vec<String>,
    pub equipped: Vec<(String, String)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InterEngineMessage {
    PlayerHandoff {
        player_id: PlayerId,
        session_id: SessionId,
        record: ambonmud_domain::record::PlayerRecord,
        runtime: HandoffRuntimeState,
        target_room_id: RoomId,
        origin_engine_id: EngineId,
    },
    HandoffAck {
        session_id: SessionId,
        accepted: bool,
    },
    TellMessage {
        from_name: String,
        to_name: String,
        message: String,
        reply_to_session: SessionId,
    },
    GlobalBroadcast {
        text: String,
    },
    WhoRequest {
        request_id: String,
    },
    WhoResponse {
        request_id: String,
        names: Vec<String>,
    },
    SessionRedirect {
        session_id: SessionId,
        target_engine_id: EngineId,
    },
    TransferRequest {
        player_name: String,
        destination_room_id: RoomId,
    },
    KickRequest {
        player_name: String,
        reason: String,
    },
    /// A periodic load snapshot used by the power-of-two-choices instance
    /// selector (spec.md §4.13 "Instance selection").
    LoadSnapshot {
        engine_id: EngineId,
        zone: ZoneId,
        active_sessions: u32,
        in_transit_handoffs: u32,
        queue_pressure: f64,
    },
}

impl InterEngineMessage {
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::PlayerHandoff { .. } => "PlayerHandoff",
            Self::HandoffAck { .. } => "HandoffAck",
            Self::TellMessage { .. } => "TellMessage",
            Self::GlobalBroadcast { .. } => "GlobalBroadcast",
            Self::WhoRequest { .. } => "WhoRequest",
            Self::WhoResponse { .. } => "WhoResponse",
            Self::SessionRedirect { .. } => "SessionRedirect",
            Self::TransferRequest { .. } => "TransferRequest",
            Self::KickRequest { .. } => "KickRequest",
            Self::LoadSnapshot { .. } => "LoadSnapshot",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, crate::SharedError> {
        bincode::serialize(self).map_err(|e| crate::SharedError::Decode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, crate::SharedError> {
        bincode::deserialize(bytes).map_err(|e| crate::SharedError::Decode(e.to_string()))
    }
}
