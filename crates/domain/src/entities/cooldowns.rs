use crate::ids::SessionId;
use std::collections::HashMap;

/// Per-session ability cooldowns. Session-local and never persisted -
/// reconnecting resets all cooldowns (spec.md §4.9).
#[derive(Debug, Default, Clone)]
pub struct Cooldowns {
    by_session: HashMap<SessionId, HashMap<String, i64>>,
}

impl Cooldowns {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` if never cast or already ready.
    pub fn remaining_ms(&self, session: SessionId, ability_id: &str, now_ms: i64) -> Option<i64> {
        let ready_at = *self.by_session.get(&session)?.get(ability_id)?;
        let remaining = ready_at - now_ms;
        if remaining > 0 {
            Some(remaining)
        } else {
            None
        }
    }

    pub fn set_ready_at(&mut self, session: SessionId, ability_id: &str, ready_at_ms: i64) {
        self.by_session
            .entry(session)
            .or_default()
            .insert(ability_id.to_string(), ready_at_ms);
    }

    /// Drops all cooldowns for a session, e.g. on disconnect or reconnect.
    pub fn clear_session(&mut self, session: SessionId) {
        self.by_session.remove(&session);
    }
}
