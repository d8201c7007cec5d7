//! Player registry & progression (spec.md §4.11). Owns the
//! `sessionId <-> PlayerState` mapping, the login FSM map, the
//! `maxConcurrentLogins` funnel semaphore, and the XP/level-up rules.

use crate::login::LoginSession;
use ambonmud_domain::abilities::AbilityDefinition;
use ambonmud_domain::entities::PlayerState;
use ambonmud_domain::ids::SessionId;
use ambonmud_domain::progression::XpCurve;
use ambonmud_domain::value_objects::Class;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct PlayerRegistry {
    players: HashMap<SessionId, PlayerState>,
    login_sessions: HashMap<SessionId, LoginSession>,
    /// Lowercased name -> session, for the "no two sessions for the same
    /// account coexist" takeover rule (spec.md §4.4).
    session_by_name: HashMap<String, SessionId>,
    login_semaphore: Arc<Semaphore>,
    /// Held permits, one per session currently inside the login funnel;
    /// dropped (releasing the permit) on login completion or disconnect.
    login_permits: HashMap<SessionId, OwnedSemaphorePermit>,
    pub xp_curve: XpCurve,
    pub full_heal_on_level_up: bool,
}

impl PlayerRegistry {
    pub fn new(max_concurrent_logins: usize, xp_curve: XpCurve, full_heal_on_level_up: bool) -> Self {
        Self {
            players: HashMap::new(),
            login_sessions: HashMap::new(),
            session_by_name: HashMap::new(),
            login_semaphore: Arc::new(Semaphore::new(max_concurrent_logins.max(1))),
            login_permits: HashMap::new(),
            xp_curve,
            full_heal_on_level_up,
        }
    }

    /// Attempts to admit a session into the login funnel. `None` means the
    /// funnel is saturated and the caller must send "server busy" and close
    /// the connection immediately (spec.md §4.4, §8 scenario 5).
    pub fn try_enter_login_funnel(&mut self, session_id: SessionId) -> bool {
        match Arc::clone(&self.login_semaphore).try_acquire_owned() {
            Ok(permit) => {
                self.login_permits.insert(session_id, permit);
                self.login_sessions.insert(session_id, LoginSession::new());
                true
            }
            Err(_) => false,
        }
    }

    pub fn login_session(&self, session_id: SessionId) -> Option<&LoginSession> {
        self.login_sessions.get(&session_id)
    }

    pub fn login_session_mut(&mut self, session_id: SessionId) -> Option<&mut LoginSession> {
        self.login_sessions.get_mut(&session_id)
    }

    pub fn is_logging_in(&self, session_id: SessionId) -> bool {
        self.login_sessions.contains_key(&session_id)
    }

    /// Completes (or abandons) a login funnel entry, releasing its permit.
    pub fn leave_login_funnel(&mut self, session_id: SessionId) {
        self.login_sessions.remove(&session_id);
        self.login_permits.remove(&session_id);
    }

    /// Looks up the session currently logged in under `name`, if any -
    /// consulted by the takeover rule before completing a new login.
    pub fn session_for_name(&self, name: &str) -> Option<SessionId> {
        self.session_by_name.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn admit_player(&mut self, player: PlayerState) {
        self.session_by_name
            .insert(player.name.to_ascii_lowercase(), player.session_id);
        self.players.insert(player.session_id, player);
    }

    pub fn remove_player(&mut self, session_id: SessionId) -> Option<PlayerState> {
        let player = self.players.remove(&session_id)?;
        self.session_by_name.remove(&player.name.to_ascii_lowercase());
        Some(player)
    }

    pub fn player(&self, session_id: SessionId) -> Option<&PlayerState> {
        self.players.get(&session_id)
    }

    pub fn player_mut(&mut self, session_id: SessionId) -> Option<&mut PlayerState> {
        self.players.get_mut(&session_id)
    }

    pub fn all_players(&self) -> impl Iterator<Item = &PlayerState> {
        self.players.values()
    }

    pub fn player_sessions_in_room<'a>(
        &'a self,
        room_id: &'a ambonmud_domain::ids::RoomId,
    ) -> impl Iterator<Item = SessionId> + 'a {
        self.players
            .values()
            .filter(move |p| &p.current_room_id == room_id)
            .map(|p| p.session_id)
    }

    /// Abilities known at `level`/`class` from the full catalog (spec.md
    /// §4.11 "all with levelRequired <= level and matching class/race
    /// restrictions").
    pub fn learnable_abilities(
        catalog: &HashMap<String, AbilityDefinition>,
        level: u32,
        class: Class,
    ) -> Vec<String> {
        let mut ids: Vec<String> = catalog
            .values()
            .filter(|def| def.is_known_by(level, class))
            .map(|def| def.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Grants `xp` to a player, returning `Some(new_level)` if this caused
    /// one or more level-ups.
    pub fn grant_xp(&mut self, session_id: SessionId, xp: u64) -> Option<u32> {
        let player = self.players.get_mut(&session_id)?;
        let old_level = player.level;
        player.xp_total += xp;
        let new_level = self.xp_curve.level_for_xp(player.xp_total);
        if new_level > old_level {
            player.level = new_level;
            Some(new_level)
        } else {
            None
        }
    }
}
