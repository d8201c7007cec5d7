//! Wire contract for the gateway↔engine streamed bus (spec.md §4.1
//! "Streamed (gateway<->engine): local queue plus a single bidirectional
//! RPC stream"). `EventBus<E>` is generic over one event type, but the
//! physical link carries both `InboundEvent` (gateway -> engine) and
//! `OutboundEvent` (engine -> gateway) over the same length-delimited
//! stream, so the two get tagged into one frame enum instead of requiring
//! two sockets.

use crate::events::{InboundEvent, OutboundEvent};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GatewayFrame {
    Inbound(InboundEvent),
    Outbound(OutboundEvent),
}

impl GatewayFrame {
    pub fn encode(&self) -> Result<Vec<u8>, crate::SharedError> {
        bincode::serialize(self).map_err(|e| crate::SharedError::Decode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, crate::SharedError> {
        bincode::deserialize(bytes).map_err(|e| crate::SharedError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambonmud_domain::ids::SessionId;

    #[test]
    fn inbound_frame_round_trips_through_bincode() {
        let frame = GatewayFrame::Inbound(InboundEvent::LineReceived {
            session_id: SessionId(1),
            line: "look".into(),
        });
        let bytes = frame.encode().unwrap();
        match GatewayFrame::decode(&bytes).unwrap() {
            GatewayFrame::Inbound(InboundEvent::LineReceived { line, .. }) => assert_eq!(line, "look"),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn outbound_frame_round_trips_through_bincode() {
        let frame = GatewayFrame::Outbound(OutboundEvent::SendPrompt {
            session_id: SessionId(2),
        });
        let bytes = frame.encode().unwrap();
        match GatewayFrame::decode(&bytes).unwrap() {
            GatewayFrame::Outbound(OutboundEvent::SendPrompt { session_id }) => assert_eq!(session_id, SessionId(2)),
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}
