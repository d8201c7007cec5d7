//! Per-session login finite-state machine and the isolated auth worker pool
//! (spec.md §4.4). The FSM itself is pure data the engine advances
//! synchronously each tick; password hashing/verification is the one place
//! a handler needs to suspend, so it's submitted to [`AuthPool`] and the
//! result drained back in on a later tick (spec.md §5 "Suspension points").

use ambonmud_domain::ids::SessionId;
use ambonmud_domain::value_objects::{Class, Race};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    AwaitingName,
    /// Existing account found; `attempts_remaining` counts down from
    /// `maxWrongPasswordRetries` (spec.md §4.4).
    AwaitingExistingPassword { name: String, attempts_remaining: u32 },
    AwaitingPasswordVerification { name: String, attempts_remaining: u32 },
    AwaitingCreateConfirmation { name: String },
    AwaitingNewPassword { name: String },
    AwaitingPasswordHash { name: String },
    AwaitingRaceSelection { name: String, password_hash: String },
    AwaitingClassSelection { name: String, password_hash: String, race: Race },
}

#[derive(Debug, Clone)]
pub struct LoginSession {
    pub state: LoginState,
}

impl LoginSession {
    pub fn new() -> Self {
        Self {
            state: LoginState::AwaitingName,
        }
    }
}

impl Default for LoginSession {
    fn default() -> Self {
        Self::new()
    }
}

/// What a completed auth-pool job produces; drained by the engine once per
/// tick (spec.md §4.3 step 3).
#[derive(Debug)]
pub enum AuthResult {
    PasswordVerified { session_id: SessionId, ok: bool },
    PasswordHashed { session_id: SessionId, hash: String },
}

/// A dedicated worker pool for password KDF operations, sized `authThreads`
/// (spec.md §4.4, §5 "Auth"). Submissions suspend on a semaphore rather than
/// unboundedly spawning blocking tasks, so CPU-bound KDF work never starves
/// the process under a login storm.
pub struct AuthPool {
    semaphore: Arc<Semaphore>,
    results_tx: mpsc::UnboundedSender<AuthResult>,
}

impl AuthPool {
    pub fn new(auth_threads: usize) -> (Self, mpsc::UnboundedReceiver<AuthResult>) {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        (
            Self {
                semaphore: Arc::new(Semaphore::new(auth_threads.max(1))),
                results_tx,
            },
            results_rx,
        )
    }

    /// Verifies `password` against `hash` on a blocking-pool thread, gated
    /// by the `authThreads` semaphore, and pushes the result for the engine
    /// to drain.
    pub fn submit_verify(&self, session_id: SessionId, password: String, hash: String) {
        let semaphore = self.semaphore.clone();
        let tx = self.results_tx.clone();
        tokio::spawn(async move {
            let _permit = semaphore.acquire().await;
            let ok =
                tokio::task::spawn_blocking(move || verify_password(&password, &hash))
                    .await
                    .unwrap_or(false);
            let _ = tx.send(AuthResult::PasswordVerified { session_id, ok });
        });
    }

    /// Hashes a new account's password on a blocking-pool thread.
    pub fn submit_hash(&self, session_id: SessionId, password: String) {
        let semaphore = self.semaphore.clone();
        let tx = self.results_tx.clone();
        tokio::spawn(async move {
            let _permit = semaphore.acquire().await;
            let hash = tokio::task::spawn_blocking(move || hash_password(&password))
                .await
                .unwrap_or_default();
            let _ = tx.send(AuthResult::PasswordHashed { session_id, hash });
        });
    }
}

pub fn hash_password(password: &str) -> String {
    use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
    use argon2::Argon2;
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .unwrap_or_default()
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::password_hash::{PasswordHash, PasswordVerifier};
    use argon2::Argon2;
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}

/// Learns the race/class pair offered at account creation (spec.md §4.4).
pub fn class_offers() -> &'static [Class] {
    &Class::ALL
}

pub fn race_offers() -> &'static [Race] {
    &Race::ALL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_round_trips_through_hash_and_verify() {
        let hash = hash_password("hunter2");
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn login_session_starts_awaiting_name() {
        let session = LoginSession::new();
        assert_eq!(session.state, LoginState::AwaitingName);
    }
}
