//! Drives [`LoginState`] forward against incoming lines and drained auth
//! results (spec.md §4.4). `login.rs` owns the FSM's data shapes and the
//! `AuthPool` suspension point; this module is the state-transition table
//! that consumes them.

use crate::command_dispatch::describe_room;
use crate::errors::PersistenceError;
use crate::login::{AuthPool, AuthResult, LoginState};
use crate::persistence::{NewPlayerRecord, PlayerRepository};
use crate::registry::PlayerRegistry;
use crate::sharding::location_index::PlayerLocationIndex;
use crate::world_state::WorldState;
use ambonmud_domain::abilities::AbilityDefinition;
use ambonmud_domain::entities::PlayerState;
use ambonmud_domain::ids::{EngineId, SessionId};
use ambonmud_domain::record::{validate_name, validate_password, PlayerRecord};
use ambonmud_domain::value_objects::{Attributes, Class, Race};
use ambonmud_shared::config::LoginConfig;
use ambonmud_shared::events::OutboundEvent;
use ambonmud_shared::gmcp::GmcpSubscription;
use std::collections::HashMap;

/// Argon2's own input ceiling is much higher than this; this is the
/// account-policy limit enforced before a password ever reaches the KDF
/// (spec.md §4.4 "KDF's own max-input limit is a hard ceiling" - this is
/// the softer policy limit beneath it).
const MAX_PASSWORD_LEN: usize = 72;
const BASE_HP: i32 = 20;
const BASE_MANA: i32 = 10;

/// Everything a line needs to advance the FSM or complete a login. Bundled
/// so `handle_line`/`drain_auth_results` don't both carry a dozen
/// positional parameters.
pub struct LoginContext<'a> {
    pub world: &'a WorldState,
    pub registry: &'a mut PlayerRegistry,
    pub repo: &'a dyn PlayerRepository,
    pub auth_pool: &'a AuthPool,
    pub abilities: &'a HashMap<String, AbilityDefinition>,
    pub subscriptions: &'a mut HashMap<SessionId, GmcpSubscription>,
    pub location_index: Option<&'a PlayerLocationIndex>,
    pub self_engine_id: Option<&'a EngineId>,
    pub login_config: &'a LoginConfig,
}

/// Admits a freshly `Connected` session into the login funnel, or bounces
/// it immediately if the funnel is saturated (spec.md §4.4, §8 scenario 5).
pub fn on_connect(registry: &mut PlayerRegistry, session_id: SessionId, out: &mut Vec<OutboundEvent>) {
    if !registry.try_enter_login_funnel(session_id) {
        out.push(OutboundEvent::SendError { session_id, text: "Server busy, please try again shortly.".into() });
        out.push(OutboundEvent::Close { session_id, reason: "login funnel saturated".into() });
        return;
    }
    out.push(OutboundEvent::ShowLoginScreen { session_id });
    out.push(OutboundEvent::SendInfo { session_id, text: "By what name shall we know you?".into() });
}

/// Tears down whatever state a session accumulated, whether it disconnected
/// mid-login or while playing.
pub fn on_disconnect(
    registry: &mut PlayerRegistry,
    subscriptions: &mut HashMap<SessionId, GmcpSubscription>,
    location_index: Option<&PlayerLocationIndex>,
    session_id: SessionId,
) {
    registry.leave_login_funnel(session_id);
    subscriptions.remove(&session_id);
    if let Some(player) = registry.remove_player(session_id) {
        if let Some(index) = location_index {
            index.remove(&player.name);
        }
    }
}

/// Advances the FSM by one line (spec.md §4.4). Returns quietly if the
/// session isn't mid-login - callers are expected to have already checked
/// `registry.is_logging_in(session_id)` before routing here instead of to
/// the command pipeline.
pub async fn handle_line(
    ctx: &mut LoginContext<'_>,
    session_id: SessionId,
    line: &str,
    now_ms: i64,
    out: &mut Vec<OutboundEvent>,
) -> Result<(), PersistenceError> {
    let Some(state) = ctx.registry.login_session(session_id).map(|s| s.state.clone()) else {
        return Ok(());
    };
    let trimmed = line.trim();

    match state {
        LoginState::AwaitingName => {
            if validate_name(trimmed).is_err() {
                out.push(OutboundEvent::SendError { session_id, text: "Names are 2-16 letters, digits or underscores, starting with a letter.".into() });
                out.push(OutboundEvent::SendInfo { session_id, text: "By what name shall we know you?".into() });
                return Ok(());
            }
            match ctx.repo.find_by_name(trimmed).await? {
                Some(_) => {
                    set_state(
                        ctx.registry,
                        session_id,
                        LoginState::AwaitingExistingPassword {
                            name: trimmed.to_string(),
                            // +1: `max_wrong_password_retries` wrong attempts must still
                            // leave the session connected; the next one disconnects
                            // (spec.md:349 "exactly maxWrongPasswordRetries+1 failed
                            // attempts cause disconnect").
                            attempts_remaining: ctx.login_config.max_wrong_password_retries + 1,
                        },
                    );
                    out.push(OutboundEvent::SendInfo { session_id, text: "Password:".into() });
                }
                None => {
                    set_state(ctx.registry, session_id, LoginState::AwaitingCreateConfirmation { name: trimmed.to_string() });
                    out.push(OutboundEvent::SendInfo {
                        session_id,
                        text: format!("No one by that name walks these lands yet. Create {trimmed}? (yes/no)"),
                    });
                }
            }
        }

        LoginState::AwaitingExistingPassword { name, attempts_remaining } => match ctx.repo.find_by_name(&name).await? {
            Some(record) => {
                ctx.auth_pool.submit_verify(session_id, trimmed.to_string(), record.password_hash.clone());
                set_state(ctx.registry, session_id, LoginState::AwaitingPasswordVerification { name, attempts_remaining });
            }
            None => {
                set_state(ctx.registry, session_id, LoginState::AwaitingName);
                out.push(OutboundEvent::SendError { session_id, text: "That account vanished. Try another name.".into() });
            }
        },

        LoginState::AwaitingPasswordVerification { .. } => {
            out.push(OutboundEvent::SendInfo { session_id, text: "One moment...".into() });
        }

        LoginState::AwaitingCreateConfirmation { name } => match trimmed.to_ascii_lowercase().as_str() {
            "y" | "yes" => {
                set_state(ctx.registry, session_id, LoginState::AwaitingNewPassword { name });
                out.push(OutboundEvent::SendInfo { session_id, text: "Choose a password:".into() });
            }
            "n" | "no" => {
                set_state(ctx.registry, session_id, LoginState::AwaitingName);
                out.push(OutboundEvent::SendInfo { session_id, text: "By what name shall we know you?".into() });
            }
            _ => out.push(OutboundEvent::SendError { session_id, text: "Please answer yes or no.".into() }),
        },

        LoginState::AwaitingNewPassword { name } => {
            if validate_password(trimmed, MAX_PASSWORD_LEN).is_err() {
                out.push(OutboundEvent::SendError { session_id, text: "Choose a non-empty password.".into() });
                return Ok(());
            }
            ctx.auth_pool.submit_hash(session_id, trimmed.to_string());
            set_state(ctx.registry, session_id, LoginState::AwaitingPasswordHash { name });
        }

        LoginState::AwaitingPasswordHash { .. } => {
            out.push(OutboundEvent::SendInfo { session_id, text: "One moment...".into() });
        }

        LoginState::AwaitingRaceSelection { name, password_hash } => match Race::from_token(trimmed) {
            Some(race) => {
                set_state(ctx.registry, session_id, LoginState::AwaitingClassSelection { name, password_hash, race });
                out.push(OutboundEvent::SendInfo {
                    session_id,
                    text: format!("Choose a class: {}", class_choices()),
                });
            }
            None => out.push(OutboundEvent::SendError {
                session_id,
                text: format!("Unknown race. Choices: {}", race_choices()),
            }),
        },

        LoginState::AwaitingClassSelection { name, password_hash, race } => match Class::from_token(trimmed) {
            Some(class) => {
                create_account(ctx, session_id, name, password_hash, race, class, now_ms, out).await?;
            }
            None => out.push(OutboundEvent::SendError {
                session_id,
                text: format!("Unknown class. Choices: {}", class_choices()),
            }),
        },
    }
    Ok(())
}

/// Drains everything `AuthPool` finished since the last tick (spec.md §4.3
/// step 3).
pub async fn drain_auth_results(
    ctx: &mut LoginContext<'_>,
    results_rx: &mut tokio::sync::mpsc::UnboundedReceiver<AuthResult>,
    now_ms: i64,
    out: &mut Vec<OutboundEvent>,
) -> Result<(), PersistenceError> {
    while let Ok(result) = results_rx.try_recv() {
        match result {
            AuthResult::PasswordVerified { session_id, ok } => {
                let Some(LoginState::AwaitingPasswordVerification { name, attempts_remaining }) =
                    ctx.registry.login_session(session_id).map(|s| s.state.clone())
                else {
                    continue;
                };
                if ok {
                    complete_existing_login(ctx, session_id, &name, now_ms, out).await?;
                } else if attempts_remaining <= 1 {
                    ctx.registry.leave_login_funnel(session_id);
                    out.push(OutboundEvent::SendError { session_id, text: "Too many incorrect attempts.".into() });
                    out.push(OutboundEvent::Close { session_id, reason: "max wrong password retries".into() });
                } else {
                    set_state(
                        ctx.registry,
                        session_id,
                        LoginState::AwaitingExistingPassword { name, attempts_remaining: attempts_remaining - 1 },
                    );
                    out.push(OutboundEvent::SendError { session_id, text: "Wrong password. Try again:".into() });
                }
            }
            AuthResult::PasswordHashed { session_id, hash } => {
                let Some(LoginState::AwaitingPasswordHash { name }) =
                    ctx.registry.login_session(session_id).map(|s| s.state.clone())
                else {
                    continue;
                };
                set_state(ctx.registry, session_id, LoginState::AwaitingRaceSelection { name, password_hash: hash });
                out.push(OutboundEvent::SendInfo { session_id, text: format!("Choose a race: {}", race_choices()) });
            }
        }
    }
    Ok(())
}

async fn create_account(
    ctx: &mut LoginContext<'_>,
    session_id: SessionId,
    name: String,
    password_hash: String,
    race: Race,
    class: Class,
    now_ms: i64,
    out: &mut Vec<OutboundEvent>,
) -> Result<(), PersistenceError> {
    let max_hp = BASE_HP + class.hp_per_level();
    let max_mana = BASE_MANA + class.mana_per_level();
    let new_record = NewPlayerRecord {
        name: name.clone(),
        password_hash,
        current_room_id: ctx.world.world.start_room.clone(),
        race,
        class,
        attributes: Attributes::baseline(),
        hp: max_hp,
        max_hp,
        mana: max_mana,
        max_mana,
    };
    match ctx.repo.create(new_record).await {
        Ok(record) => place_new_player(ctx, session_id, &record, now_ms, out),
        Err(PersistenceError::NameTaken(_)) => {
            set_state(ctx.registry, session_id, LoginState::AwaitingName);
            out.push(OutboundEvent::SendError { session_id, text: "That name was just taken. Choose another:".into() });
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn complete_existing_login(
    ctx: &mut LoginContext<'_>,
    session_id: SessionId,
    name: &str,
    now_ms: i64,
    out: &mut Vec<OutboundEvent>,
) -> Result<(), PersistenceError> {
    let record = ctx.repo.find_by_name(name).await?.ok_or(PersistenceError::NotFound)?;

    // Takeover: a second successful login under the same name evicts the
    // first session rather than letting both coexist (spec.md §4.4).
    if let Some(old_session) = ctx.registry.session_for_name(name) {
        if old_session != session_id {
            ctx.registry.remove_player(old_session);
            out.push(OutboundEvent::SendError { session_id: old_session, text: "Logged in from another location.".into() });
            out.push(OutboundEvent::Close { session_id: old_session, reason: "session takeover".into() });
        }
    }

    place_new_player(ctx, session_id, &record, now_ms, out)
}

fn place_new_player(
    ctx: &mut LoginContext<'_>,
    session_id: SessionId,
    record: &PlayerRecord,
    now_ms: i64,
    out: &mut Vec<OutboundEvent>,
) -> Result<(), PersistenceError> {
    ctx.registry.leave_login_funnel(session_id);

    let known_abilities = PlayerRegistry::learnable_abilities(ctx.abilities, record.level, record.class);
    let player = PlayerState {
        session_id,
        player_id: record.id.clone(),
        name: record.name.clone(),
        current_room_id: record.current_room_id.clone(),
        race: record.race,
        class: record.class,
        attributes: record.attributes,
        hp: record.hp,
        max_hp: record.max_hp,
        mana: record.mana,
        max_mana: record.max_mana,
        level: record.level,
        xp_total: record.xp_total,
        gold: record.gold,
        ansi_enabled: record.ansi_enabled,
        is_staff: record.is_staff,
        equipped: record.equipped.clone(),
        inventory: record.inventory.clone(),
        known_abilities,
    };
    let name = player.name.clone();
    let room_id = player.current_room_id.clone();

    for sid in ctx.registry.player_sessions_in_room(&room_id).collect::<Vec<_>>() {
        out.push(OutboundEvent::SendText { session_id: sid, text: format!("{name} has entered the game.") });
    }
    ctx.registry.admit_player(player);

    let mut subscription = GmcpSubscription::with_core_packages(["char.vitals".to_string()]);
    subscription.mark_dirty("char.vitals");
    ctx.subscriptions.insert(session_id, subscription);

    if let (Some(index), Some(engine_id)) = (ctx.location_index, ctx.self_engine_id) {
        index.update(&name, engine_id.clone(), session_id, now_ms);
    }

    out.push(OutboundEvent::SetAnsi { session_id, enabled: record.ansi_enabled });
    if let Some(text) = describe_room(ctx.world, ctx.registry, &room_id, session_id) {
        out.push(OutboundEvent::SendText { session_id, text });
    }
    out.push(OutboundEvent::SendPrompt { session_id });
    Ok(())
}

fn set_state(registry: &mut PlayerRegistry, session_id: SessionId, state: LoginState) {
    if let Some(session) = registry.login_session_mut(session_id) {
        session.state = state;
    }
}

fn race_choices() -> String {
    Race::ALL.iter().map(|r| r.as_str()).collect::<Vec<_>>().join(", ")
}

fn class_choices() -> String {
    Class::ALL.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::file_backend::FileRepository;
    use ambonmud_domain::progression::XpCurve;
    use ambonmud_domain::world::World;
    use std::collections::HashMap as Map;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn empty_world() -> Arc<WorldState> {
        Arc::new(WorldState::new(
            Arc::new(World {
                rooms: {
                    let mut rooms = Map::new();
                    rooms.insert(
                        ambonmud_domain::ids::RoomId::new("demo", "start"),
                        ambonmud_domain::world::Room {
                            id: ambonmud_domain::ids::RoomId::new("demo", "start"),
                            title: "The Square".into(),
                            description: "A quiet square.".into(),
                            exits: Map::new(),
                        },
                    );
                    rooms
                },
                start_room: ambonmud_domain::ids::RoomId::new("demo", "start"),
                mob_spawns: vec![],
                item_spawns: vec![],
                zone_lifespans_minutes: Map::new(),
            }),
            0,
        ))
    }

    #[tokio::test]
    async fn full_new_account_flow_admits_player() {
        let world = empty_world();
        let dir = tempdir().unwrap();
        let repo = FileRepository::open(dir.path()).await.unwrap();
        let mut registry = PlayerRegistry::new(
            4,
            XpCurve { base_xp: 100.0, exponent: 1.5, linear_xp: 50.0, max_level: 50 },
            true,
        );
        let (auth_pool, mut results_rx) = AuthPool::new(2);
        let abilities = Map::new();
        let mut subscriptions = Map::new();
        let login_config = LoginConfig { max_concurrent_logins: 4, auth_threads: 2, max_wrong_password_retries: 3 };

        let session_id = SessionId(1);
        let mut out = Vec::new();
        on_connect(&mut registry, session_id, &mut out);

        let mut ctx = LoginContext {
            world: &world,
            registry: &mut registry,
            repo: &repo,
            auth_pool: &auth_pool,
            abilities: &abilities,
            subscriptions: &mut subscriptions,
            location_index: None,
            self_engine_id: None,
            login_config: &login_config,
        };

        handle_line(&mut ctx, session_id, "Ama", 0, &mut out).await.unwrap();
        handle_line(&mut ctx, session_id, "yes", 0, &mut out).await.unwrap();
        handle_line(&mut ctx, session_id, "hunter2", 0, &mut out).await.unwrap();

        // Password hash completes asynchronously; drain it before continuing.
        for _ in 0..20 {
            if results_rx.try_recv().is_err() {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                continue;
            }
            break;
        }
        drain_auth_results(&mut ctx, &mut results_rx, 0, &mut out).await.unwrap();

        handle_line(&mut ctx, session_id, "human", 0, &mut out).await.unwrap();
        handle_line(&mut ctx, session_id, "warrior", 0, &mut out).await.unwrap();

        assert!(registry.player(session_id).is_some());
        assert!(!registry.is_logging_in(session_id));
    }

    #[tokio::test]
    async fn wrong_password_disconnects_after_max_retries_plus_one() {
        let world = empty_world();
        let dir = tempdir().unwrap();
        let repo = FileRepository::open(dir.path()).await.unwrap();
        let mut registry = PlayerRegistry::new(
            4,
            XpCurve { base_xp: 100.0, exponent: 1.5, linear_xp: 50.0, max_level: 50 },
            true,
        );
        let (auth_pool, mut results_rx) = AuthPool::new(2);
        let abilities = Map::new();
        let mut subscriptions = Map::new();
        let max_wrong_password_retries = 3;
        let login_config = LoginConfig { max_concurrent_logins: 4, auth_threads: 2, max_wrong_password_retries };

        // Seed an account directly so a second session can attack its
        // password without running the new-account pipeline first.
        repo.create(NewPlayerRecord {
            name: "Ama".into(),
            password_hash: crate::login::hash_password("hunter2"),
            current_room_id: world.world.start_room.clone(),
            race: Race::Human,
            class: Class::Warrior,
            attributes: Attributes::baseline(),
            hp: 20,
            max_hp: 20,
            mana: 10,
            max_mana: 10,
        })
        .await
        .unwrap();

        let session_id = SessionId(1);
        let mut out = Vec::new();
        on_connect(&mut registry, session_id, &mut out);

        {
            let mut ctx = LoginContext {
                world: &world,
                registry: &mut registry,
                repo: &repo,
                auth_pool: &auth_pool,
                abilities: &abilities,
                subscriptions: &mut subscriptions,
                location_index: None,
                self_engine_id: None,
                login_config: &login_config,
            };
            handle_line(&mut ctx, session_id, "Ama", 0, &mut out).await.unwrap();
        }

        for attempt in 1..=max_wrong_password_retries + 1 {
            out.clear();
            {
                let mut ctx = LoginContext {
                    world: &world,
                    registry: &mut registry,
                    repo: &repo,
                    auth_pool: &auth_pool,
                    abilities: &abilities,
                    subscriptions: &mut subscriptions,
                    location_index: None,
                    self_engine_id: None,
                    login_config: &login_config,
                };
                handle_line(&mut ctx, session_id, "wrong", 0, &mut out).await.unwrap();
                // The verify runs on a blocking-pool thread; give it time to
                // land before draining rather than racing it.
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                drain_auth_results(&mut ctx, &mut results_rx, 0, &mut out).await.unwrap();
            }

            if attempt <= max_wrong_password_retries {
                assert!(registry.is_logging_in(session_id), "attempt {attempt} must not disconnect");
                assert!(!out.iter().any(|e| matches!(e, OutboundEvent::Close { .. })));
            } else {
                assert!(!registry.is_logging_in(session_id), "the (max_wrong_password_retries + 1)th attempt must disconnect");
                assert!(out.iter().any(|e| matches!(e, OutboundEvent::Close { .. })));
            }
        }
    }
}
