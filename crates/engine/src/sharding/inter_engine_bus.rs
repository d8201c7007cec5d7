//! Thin routing wrapper over `EventBus<InterEngineMessage>` (spec.md §4.13).
//! The wire protocol is pure pub/sub - there is no per-recipient channel -
//! so "send to one engine" is just a broadcast the other side filters on a
//! field already carried by the message (`target_engine_id`, `to_name`,
//! `reply_to_session`, ...). This wrapper only exists to give call sites a
//! name for "broadcast" and a single place that owns this engine's own id.

use ambonmud_domain::ids::EngineId;
use ambonmud_shared::bus::EventBus;
use ambonmud_shared::inter_engine::InterEngineMessage;
use std::sync::Arc;
use tracing::warn;

pub struct InterEngineBus {
    bus: Arc<dyn EventBus<InterEngineMessage>>,
    self_engine_id: EngineId,
}

impl InterEngineBus {
    pub fn new(bus: Arc<dyn EventBus<InterEngineMessage>>, self_engine_id: EngineId) -> Self {
        Self { bus, self_engine_id }
    }

    pub fn self_engine_id(&self) -> &EngineId {
        &self.self_engine_id
    }

    /// Non-blocking publish. Failures never propagate to the caller (spec.md
    /// §4.1 "publish failures never propagate"); they're logged and counted
    /// by the caller via `Metrics::incr_bus_publish_failures`.
    pub fn broadcast(&self, message: InterEngineMessage) -> bool {
        let ok = self.bus.try_send(message);
        if !ok {
            warn!("inter-engine bus backpressured, message dropped");
        }
        ok
    }

    /// Drains everything currently queued, without suspending.
    pub fn drain(&self) -> Vec<InterEngineMessage> {
        let mut drained = Vec::new();
        while let Some(message) = self.bus.try_receive() {
            drained.push(message);
        }
        drained
    }
}
