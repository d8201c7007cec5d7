//! Maps live sessions to their per-connection render sink (spec.md §4.2).
//! One `SessionRouter` is shared by every transport listener on this
//! gateway process; connection tasks register on accept and deregister on
//! disconnect.

use ambonmud_domain::ids::SessionId;
use ambonmud_shared::events::OutboundEvent;
use ambonmud_shared::metrics::Metrics;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct SessionRouter {
    sinks: DashMap<SessionId, mpsc::Sender<OutboundEvent>>,
    /// Set when a session's sink is torn down for a reason other than a
    /// plain disconnect, and consumed by the connection task once its
    /// `recv()` loop drains the channel and ends (spec.md §4.2/§8
    /// "the session is disconnected with an explicit reason").
    disconnect_reasons: DashMap<SessionId, String>,
    capacity: usize,
    metrics: Arc<Metrics>,
}

impl SessionRouter {
    pub fn new(capacity: usize, metrics: Arc<Metrics>) -> Self {
        Self { sinks: DashMap::new(), disconnect_reasons: DashMap::new(), capacity, metrics }
    }

    pub fn register(&self, session_id: SessionId) -> mpsc::Receiver<OutboundEvent> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.sinks.insert(session_id, tx);
        rx
    }

    pub fn remove(&self, session_id: SessionId) {
        self.sinks.remove(&session_id);
        self.disconnect_reasons.remove(&session_id);
    }

    /// Takes the reason this session's sink was torn down for backpressure,
    /// if any. Returns `None` for an ordinary disconnect.
    pub fn take_disconnect_reason(&self, session_id: SessionId) -> Option<String> {
        self.disconnect_reasons.remove(&session_id).map(|(_, reason)| reason)
    }

    /// Routes one event to its session's connection task. Silently drops
    /// events for sessions that already disconnected (render sink gone).
    /// A session whose bounded queue is full is severed rather than left to
    /// grow unbounded (spec.md §4.2 "per-session outbound queue is
    /// bounded; on overflow, the session is disconnected with an explicit
    /// reason").
    pub fn route(&self, event: OutboundEvent) {
        let session_id = event.session_id();
        let Some(sink) = self.sinks.get(&session_id) else {
            return;
        };
        match sink.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => {
                drop(sink);
                self.sinks.remove(&session_id);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                drop(sink);
                self.disconnect_reasons.insert(session_id, "backpressure".to_string());
                self.sinks.remove(&session_id);
                self.metrics.incr_backpressure_disconnects();
            }
        }
    }

    /// Pushes a `Close` event to every live session (spec.md §4.2: on a
    /// successful engine-stream reconnect, sessions that predate the
    /// reconnect no longer have matching state on the engine side and must
    /// be dropped with a user-visible message). Best effort: a session
    /// whose queue is already full is left for `route` to sever on its own.
    pub fn close_all(&self, reason: &str) {
        for entry in self.sinks.iter() {
            let _ = entry.value().try_send(OutboundEvent::Close {
                session_id: *entry.key(),
                reason: reason.to_string(),
            });
        }
    }

    pub fn session_count(&self) -> usize {
        self.sinks.len()
    }
}

/// Drains `outbound` forever, routing each event to its session's sink.
/// One instance of this loop runs per gateway process.
pub async fn dispatch_outbound(
    outbound: std::sync::Arc<dyn ambonmud_shared::bus::EventBus<OutboundEvent>>,
    router: std::sync::Arc<SessionRouter>,
) {
    while let Some(event) = outbound.receive().await {
        router.route(event);
    }
    tracing::info!("outbound dispatch loop stopped, bus closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambonmud_domain::ids::SessionId;

    fn router(capacity: usize) -> SessionRouter {
        SessionRouter::new(capacity, Arc::new(Metrics::new()))
    }

    #[test]
    fn route_delivers_to_registered_sink() {
        let router = router(4);
        let mut rx = router.register(SessionId(1));
        router.route(OutboundEvent::SendPrompt { session_id: SessionId(1) });
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn route_drops_events_for_unknown_sessions() {
        let router = router(4);
        router.route(OutboundEvent::SendPrompt { session_id: SessionId(99) });
        assert_eq!(router.session_count(), 0);
    }

    #[test]
    fn close_all_reaches_every_session() {
        let router = router(4);
        let mut a = router.register(SessionId(1));
        let mut b = router.register(SessionId(2));
        router.close_all("bye");
        assert!(matches!(a.try_recv().unwrap(), OutboundEvent::Close { .. }));
        assert!(matches!(b.try_recv().unwrap(), OutboundEvent::Close { .. }));
    }

    #[test]
    fn overflowing_session_is_severed_with_backpressure_reason() {
        let router = router(4);
        let mut rx = router.register(SessionId(1));
        for _ in 0..4 {
            router.route(OutboundEvent::SendPrompt { session_id: SessionId(1) });
        }
        // The queue is now full; this 5th emission must sever the session
        // rather than block or grow the channel (spec.md §8 scenario 4).
        router.route(OutboundEvent::SendPrompt { session_id: SessionId(1) });

        assert_eq!(router.session_count(), 0);
        assert_eq!(router.take_disconnect_reason(SessionId(1)).as_deref(), Some("backpressure"));
        for _ in 0..4 {
            assert!(rx.try_recv().is_ok());
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn ordinary_disconnect_reports_no_reason() {
        let router = router(4);
        let _rx = router.register(SessionId(1));
        router.remove(SessionId(1));
        assert_eq!(router.take_disconnect_reason(SessionId(1)), None);
    }
}
