//! The two typed sealed event families that cross the transport/engine
//! boundary (spec.md §4.1). Transports and renderers consume and produce
//! only these values, never raw sockets or framing.

use ambonmud_domain::ids::{EngineId, SessionId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundEvent {
    Connected {
        session_id: SessionId,
        default_ansi: bool,
    },
    Disconnected {
        session_id: SessionId,
        reason: String,
    },
    LineReceived {
        session_id: SessionId,
        line: String,
    },
    GmcpReceived {
        session_id: SessionId,
        package: String,
        json_payload: serde_json::Value,
    },
}

impl InboundEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::Connected { session_id, .. }
            | Self::Disconnected { session_id, .. }
            | Self::LineReceived { session_id, .. }
            | Self::GmcpReceived { session_id, .. } => *session_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundEvent {
    SendText {
        session_id: SessionId,
        text: String,
    },
    SendInfo {
        session_id: SessionId,
        text: String,
    },
    SendError {
        session_id: SessionId,
        text: String,
    },
    SendPrompt {
        session_id: SessionId,
    },
    ShowLoginScreen {
        session_id: SessionId,
    },
    SetAnsi {
        session_id: SessionId,
        enabled: bool,
    },
    ClearScreen {
        session_id: SessionId,
    },
    Close {
        session_id: SessionId,
        reason: String,
    },
    SessionRedirect {
        session_id: SessionId,
        target_engine_id: EngineId,
    },
    GmcpData {
        session_id: SessionId,
        package: String,
        json: serde_json::Value,
    },
}

impl OutboundEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::SendText { session_id, .. }
            | Self::SendInfo { session_id, .. }
            | Self::SendError { session_id, .. }
            | Self::SendPrompt { session_id }
            | Self::ShowLoginScreen { session_id }
            | Self::SetAnsi { session_id, .. }
            | Self::ClearScreen { session_id }
            | Self::Close { session_id, .. }
            | Self::SessionRedirect { session_id, .. }
            | Self::GmcpData { session_id, .. } => *session_id,
        }
    }

    /// Consecutive `SendPrompt`s for the same session collapse into one at
    /// the rendering boundary (spec.md §4.1).
    pub fn is_prompt(&self) -> bool {
        matches!(self, Self::SendPrompt { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_event_carries_session_id() {
        let event = InboundEvent::LineReceived {
            session_id: SessionId(7),
            line: "look".into(),
        };
        assert_eq!(event.session_id(), SessionId(7));
    }

    #[test]
    fn outbound_event_round_trips_through_json() {
        let event = OutboundEvent::GmcpData {
            session_id: SessionId(1),
            package: "char.vitals".into(),
            json: serde_json::json!({"hp": 10}),
        };
        let encoded = serde_json::to_string(&event).unwrap();
        let decoded: OutboundEvent = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.session_id(), SessionId(1));
        assert!(!decoded.is_prompt());
    }

    #[test]
    fn prompt_is_recognized_for_coalescing() {
        assert!(OutboundEvent::SendPrompt {
            session_id: SessionId(1)
        }
        .is_prompt());
    }
}
