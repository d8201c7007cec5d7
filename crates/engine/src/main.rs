//! The engine binary: loads config and world content, wires the
//! persistence/bus/sharding stack, and runs the authoritative tick loop
//! (spec.md §4.3). One composition root per deployment mode (spec.md §9):
//! in `Standalone` mode this binary also owns the telnet/WebSocket
//! transports in-process (via the `ambonmud-gateway` library, the same
//! code a separate `ambonmud-gateway` process runs); in `Engine` mode it
//! only speaks `InboundEvent`/`OutboundEvent` over the streamed link to a
//! paired gateway process.

mod command_dispatch;
mod command_router;
mod errors;
mod gateway_link;
mod gmcp_emitter;
mod login;
mod login_flow;
mod persistence;
mod registry;
mod rng;
mod sharding;
mod subsystems;
mod world_loader;
mod world_state;

use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ambonmud_domain::command;
use ambonmud_domain::ids::{EngineId, SessionId, SessionIdAllocator};
use ambonmud_domain::progression::XpCurve;
use ambonmud_gateway::session_router::SessionRouter;
use ambonmud_gateway::websocket::GatewayAppState;
use ambonmud_gateway::{telnet, websocket};
use ambonmud_shared::bus::{DistributedBus, EventBus, LocalBus};
use ambonmud_shared::clock::{Clock, SystemClock};
use ambonmud_shared::config::{AmbonConfig, DeploymentMode, PersistenceBackendKind};
use ambonmud_shared::events::{InboundEvent, OutboundEvent};
use ambonmud_shared::gmcp::GmcpSubscription;
use ambonmud_shared::inter_engine::InterEngineMessage;
use ambonmud_shared::metrics::Metrics;
use gateway_link::GatewayWriteBus;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use command_dispatch::DispatchContext;
use command_router::ShardingHandles;
use login::AuthPool;
use login_flow::LoginContext;
use persistence::cache::CachedRepository;
use persistence::coalescing::CoalescingRepository;
use persistence::file_backend::FileRepository;
use persistence::sql_backend::SqlRepository;
use persistence::PlayerRepository;
use registry::PlayerRegistry;
use rng::ThreadRandom;
use sharding::global_commands::{self, GlobalCommandState};
use sharding::handoff::{self, PendingHandoffs};
use sharding::instance_selector::LoadSnapshotStore;
use sharding::inter_engine_bus::InterEngineBus;
use sharding::location_index::PlayerLocationIndex;
use sharding::zone_registry::{DistributedZoneRegistry, StaticZoneRegistry, ZoneRegistry};
use subsystems::combat::PlayerDeathPolicy;
use subsystems::regen::RegenTimers;
use subsystems::{combat, mob_ai, regen, status_effects, zone_reset};
use world_state::{ScheduledTask, WorldState};

/// A handoff whose ack never arrives is restored to the local engine rather
/// than leaving the player stranded mid-transit (spec.md §4.13). No config
/// field covers this; five seconds is long enough for a healthy remote
/// engine to answer within a few ticks.
const HANDOFF_TIMEOUT_MS: i64 = 5_000;

/// Upper bound on due scheduler callbacks drained per tick, mirroring the
/// combat/mob-ai "bounded work per tick" discipline elsewhere in the loop.
const MAX_SCHEDULER_CALLBACKS_PER_TICK: usize = 256;

/// The sharding-layer state the tick loop only carries in multi-engine
/// deployments (`bus.enabled`). Absent in a single standalone engine.
struct ShardingStack {
    zone_registry: Box<dyn ZoneRegistry>,
    bus: InterEngineBus,
    location_index: PlayerLocationIndex,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_file = env::args().nth(1);
    let config = AmbonConfig::load(config_file.as_deref())?;

    if matches!(config.mode, DeploymentMode::Gateway) {
        anyhow::bail!("ambonmud-engine does not serve DeploymentMode::Gateway; run the gateway binary instead");
    }

    let metrics = Arc::new(Metrics::new());
    let clock = SystemClock;
    let now_ms = clock.now_millis();

    info!(world_file = %config.engine.world_file, "loading world content");
    let world = world_loader::load(&config.engine.world_file).await?;
    let mut world_state = WorldState::new(Arc::new(world), now_ms);

    let xp_curve = XpCurve {
        base_xp: config.progression.xp_base_xp,
        exponent: config.progression.xp_exponent,
        linear_xp: config.progression.xp_linear_xp,
        max_level: config.progression.max_level,
    };
    let mut registry = PlayerRegistry::new(
        config.login.max_concurrent_logins,
        xp_curve,
        config.progression.full_heal_on_level_up,
    );

    let (auth_pool, mut auth_results_rx) = AuthPool::new(config.login.auth_threads);
    let repo = build_repository(&config).await?;

    let mut subscriptions: HashMap<SessionId, GmcpSubscription> = HashMap::new();
    let mut regen_timers = RegenTimers::new();
    let mut rng = ThreadRandom;

    let (inbound, outbound): (Arc<dyn EventBus<InboundEvent>>, Arc<dyn EventBus<OutboundEvent>>) = match config.mode {
        DeploymentMode::Standalone => {
            let local_inbound = Arc::new(LocalBus::new(config.server.session_outbound_queue_capacity));
            let local_outbound = Arc::new(LocalBus::new(config.server.session_outbound_queue_capacity));
            spawn_standalone_transports(&config, local_inbound.clone(), local_outbound.clone(), metrics.clone());
            (local_inbound, local_outbound)
        }
        DeploymentMode::Engine => {
            let local_inbound = Arc::new(LocalBus::new(config.server.session_outbound_queue_capacity));
            let gateway_outbound = Arc::new(GatewayWriteBus::new());
            let addr = SocketAddr::from(([0, 0, 0, 0], config.grpc.server_port));
            let listener_inbound = local_inbound.clone();
            let listener_outbound = gateway_outbound.clone();
            tokio::spawn(async move {
                if let Err(e) = gateway_link::serve(addr, listener_inbound, listener_outbound).await {
                    error!(error = %e, "gateway link listener exited");
                }
            });
            (local_inbound, gateway_outbound)
        }
        DeploymentMode::Gateway => unreachable!("rejected above"),
    };

    let self_engine_id = EngineId::new(config.resolved_instance_id());

    let mut sharding_stack = if config.bus.enabled {
        Some(build_sharding_stack(&config, &self_engine_id, &metrics).await?)
    } else {
        None
    };
    let mut pending_handoffs = PendingHandoffs::new();
    let mut global_state = GlobalCommandState::new();
    let mut load_snapshots = LoadSnapshotStore::new();

    info!(
        mode = ?config.mode,
        tick_millis = config.server.tick_millis,
        sharded = sharding_stack.is_some(),
        "engine starting"
    );

    let mut interval = tokio::time::interval(Duration::from_millis(config.server.tick_millis));
    let mut shutting_down = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received, shutting down");
                break;
            }
            _ = interval.tick() => {
                let now_ms = clock.now_millis();
                let mut out: Vec<OutboundEvent> = Vec::new();

                // Steps 1-2: drain inbound events, bounded per tick.
                let mut processed = 0usize;
                while processed < config.server.max_inbound_events_per_tick {
                    let Some(event) = inbound.try_receive() else { break };
                    processed += 1;
                    if let Err(e) = handle_inbound(
                        &config,
                        &mut world_state,
                        &mut registry,
                        &repo,
                        &auth_pool,
                        &mut subscriptions,
                        &self_engine_id,
                        sharding_stack.as_mut(),
                        &mut pending_handoffs,
                        &mut global_state,
                        &mut rng,
                        event,
                        now_ms,
                        &mut out,
                    )
                    .await
                    {
                        error!(error = %e, "failed to handle inbound event");
                        metrics.incr_persistence_write_failures();
                    }
                }

                // Step 3: auth-pool completions (password hash/verify).
                {
                    let mut login_ctx = LoginContext {
                        world: &world_state,
                        registry: &mut registry,
                        repo: repo.as_ref(),
                        auth_pool: &auth_pool,
                        abilities: &config.engine.abilities.definitions,
                        subscriptions: &mut subscriptions,
                        location_index: sharding_stack.as_ref().map(|s| &s.location_index),
                        self_engine_id: Some(&self_engine_id),
                        login_config: &config.login,
                    };
                    if let Err(e) =
                        login_flow::drain_auth_results(&mut login_ctx, &mut auth_results_rx, now_ms, &mut out).await
                    {
                        error!(error = %e, "failed to drain auth results");
                    }
                }

                // Step 4: world subsystems, in fixed order.
                mob_ai::tick(&mut world_state, &registry, &config.engine.mob, &config.engine.combat, &mut rng, now_ms, &mut out);
                combat::tick(
                    &mut world_state,
                    &mut registry,
                    &config.engine.combat,
                    PlayerDeathPolicy::default(),
                    &mut rng,
                    now_ms,
                    &mut out,
                );
                status_effects::tick(&mut world_state, &mut registry, now_ms, &mut out);
                regen::tick(&mut registry, &mut regen_timers, &config.engine.regen, &mut subscriptions, now_ms);

                // Step 5: due scheduler callbacks (mob respawns, zone resets,
                // delayed broadcasts).
                run_due_scheduler(&mut world_state, &registry, now_ms, &mut out);

                // Step 6: zone reset sweep.
                zone_reset::tick(&mut world_state, &registry, now_ms, &mut out);

                // Step 7: GMCP emission.
                gmcp_emitter::tick(&registry, &mut subscriptions, &mut out);

                // Sharding extension: drain the inter-engine bus, expire
                // stalled handoffs/tells/whos, broadcast load telemetry.
                if let Some(stack) = sharding_stack.as_mut() {
                    handle_inter_engine(
                        &config,
                        &mut world_state,
                        &mut registry,
                        &stack.bus,
                        &mut pending_handoffs,
                        &mut global_state,
                        &mut load_snapshots,
                        now_ms,
                        &mut out,
                    );

                    for (session_id, timed_out) in pending_handoffs.drain_timed_out(HANDOFF_TIMEOUT_MS, now_ms) {
                        metrics.incr_handoff_timeouts();
                        handoff::restore_after_timeout(&mut registry, &self_engine_id, session_id, timed_out, &mut out);
                    }
                    global_commands::check_timeouts(&mut global_state, now_ms, &mut out);

                    broadcast_load_snapshot(
                        stack.zone_registry.as_ref(),
                        &stack.bus,
                        &self_engine_id,
                        &registry,
                        &pending_handoffs,
                    );

                    if global_state.shutdown_requested {
                        info!("shutdown command received from staff, draining and exiting");
                        shutting_down = true;
                    }
                }

                // This is the tick-to-transport relay, not a per-session
                // queue; the gateway's `SessionRouter` is what enforces
                // `session_outbound_queue_capacity` per session and
                // disconnects the offending one on overflow (spec.md §4.2).
                // A drop here means the whole relay is saturated.
                for event in out {
                    if !outbound.try_send(event) {
                        warn!("outbound relay saturated, dropping event");
                    }
                }

                if shutting_down {
                    break;
                }
            }
        }
    }

    if let Err(e) = repo.flush().await {
        error!(error = %e, "final persistence flush failed");
    }
    info!(metrics = ?metrics.snapshot(), "engine stopped");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn handle_inbound(
    config: &AmbonConfig,
    world_state: &mut WorldState,
    registry: &mut PlayerRegistry,
    repo: &Arc<dyn PlayerRepository>,
    auth_pool: &AuthPool,
    subscriptions: &mut HashMap<SessionId, GmcpSubscription>,
    self_engine_id: &EngineId,
    sharding_stack: Option<&mut ShardingStack>,
    pending_handoffs: &mut PendingHandoffs,
    global_state: &mut GlobalCommandState,
    rng: &mut ThreadRandom,
    event: InboundEvent,
    now_ms: i64,
    out: &mut Vec<OutboundEvent>,
) -> Result<(), errors::PersistenceError> {
    match event {
        InboundEvent::Connected { session_id, .. } => {
            login_flow::on_connect(registry, session_id, out);
        }
        InboundEvent::Disconnected { session_id, .. } => {
            let location_index = sharding_stack.as_ref().map(|s| &s.location_index);
            login_flow::on_disconnect(registry, subscriptions, location_index, session_id);
        }
        InboundEvent::GmcpReceived { session_id, package, .. } => {
            if let Some(sub) = subscriptions.get_mut(&session_id) {
                sub.subscribe(package);
            }
        }
        InboundEvent::LineReceived { session_id, line } => {
            if registry.is_logging_in(session_id) {
                let mut login_ctx = LoginContext {
                    world: world_state,
                    registry,
                    repo: repo.as_ref(),
                    auth_pool,
                    abilities: &config.engine.abilities.definitions,
                    subscriptions,
                    location_index: sharding_stack.as_ref().map(|s| &s.location_index),
                    self_engine_id: Some(self_engine_id),
                    login_config: &config.login,
                };
                login_flow::handle_line(&mut login_ctx, session_id, &line, now_ms, out).await?;
                return Ok(());
            }

            let parsed = command::parse(&line);
            let mut ctx = DispatchContext {
                world: world_state,
                registry,
                abilities: &config.engine.abilities.definitions,
                status_effects: &config.engine.status_effects.definitions,
                combat_config: &config.engine.combat,
                rng,
                now_ms,
            };

            match sharding_stack {
                Some(stack) => {
                    let mut handles = ShardingHandles {
                        zone_registry: stack.zone_registry.as_ref(),
                        bus: &stack.bus,
                        repo: repo.as_ref(),
                        pending_handoffs,
                        global: global_state,
                        location_index: Some(&stack.location_index),
                        self_engine_id,
                    };
                    command_router::route(&mut ctx, Some(&mut handles), session_id, parsed, out).await?;
                }
                None => {
                    command_router::route(&mut ctx, None, session_id, parsed, out).await?;
                }
            }
        }
    }
    Ok(())
}

fn run_due_scheduler(world_state: &mut WorldState, registry: &PlayerRegistry, now_ms: i64, out: &mut Vec<OutboundEvent>) {
    let due = world_state.scheduler.run_due(now_ms, MAX_SCHEDULER_CALLBACKS_PER_TICK);
    for task in due {
        match task {
            ScheduledTask::MobRespawn { spawn_id } => {
                let def = world_state.world.mob_spawns.iter().find(|s| s.id == spawn_id).cloned();
                if let Some(def) = def {
                    world_state.spawn_mob_from_def(&def, now_ms);
                }
            }
            ScheduledTask::ZoneReset { zone } => {
                world_state.next_zone_reset_at_ms.insert(zone, now_ms);
            }
            ScheduledTask::DelayedBroadcast { room_id, text } => {
                for session_id in registry.player_sessions_in_room(&room_id).collect::<Vec<_>>() {
                    out.push(OutboundEvent::SendText { session_id, text: text.clone() });
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_inter_engine(
    config: &AmbonConfig,
    world_state: &mut WorldState,
    registry: &mut PlayerRegistry,
    bus: &InterEngineBus,
    pending_handoffs: &mut PendingHandoffs,
    global_state: &mut GlobalCommandState,
    load_snapshots: &mut LoadSnapshotStore,
    now_ms: i64,
    out: &mut Vec<OutboundEvent>,
) {
    for message in bus.drain() {
        load_snapshots.record(&message, now_ms);
        match message {
            InterEngineMessage::PlayerHandoff { player_id, session_id, record, runtime, target_room_id, .. } => {
                let ack = handoff::admit(world_state, registry, player_id, session_id, &record, &runtime, target_room_id, out);
                bus.broadcast(ack);
            }
            InterEngineMessage::HandoffAck { session_id, accepted } => {
                if accepted {
                    pending_handoffs.take(session_id);
                }
            }
            InterEngineMessage::KickRequest { .. } | InterEngineMessage::TransferRequest { .. } => {
                let mut ctx = DispatchContext {
                    world: world_state,
                    registry,
                    abilities: &config.engine.abilities.definitions,
                    status_effects: &config.engine.status_effects.definitions,
                    combat_config: &config.engine.combat,
                    rng: &mut ThreadRandom,
                    now_ms,
                };
                command_router::handle_remote_request(&mut ctx, &message, out);
            }
            other => {
                global_commands::handle_incoming(global_state, registry, bus, other, out);
            }
        }
    }
}

fn broadcast_load_snapshot(
    zone_registry: &dyn ZoneRegistry,
    bus: &InterEngineBus,
    self_engine_id: &EngineId,
    registry: &PlayerRegistry,
    pending_handoffs: &PendingHandoffs,
) {
    let active_sessions = registry.all_players().count() as u32;
    let in_transit_handoffs = pending_handoffs.len() as u32;
    let queue_pressure = in_transit_handoffs as f64 / (active_sessions as f64 + 1.0);
    for (zone, _mode, owners) in zone_registry.all_assignments() {
        if owners.iter().any(|e| e == self_engine_id) {
            bus.broadcast(InterEngineMessage::LoadSnapshot {
                engine_id: self_engine_id.clone(),
                zone,
                active_sessions,
                in_transit_handoffs,
                queue_pressure,
            });
        }
    }
}

async fn build_repository(config: &AmbonConfig) -> anyhow::Result<Arc<dyn PlayerRepository>> {
    let base: Arc<dyn PlayerRepository> = match config.persistence.backend {
        PersistenceBackendKind::File => Arc::new(FileRepository::open(&config.persistence.path_or_dsn).await?),
        PersistenceBackendKind::Sql => Arc::new(SqlRepository::connect(&config.persistence.path_or_dsn).await?),
    };

    let coalescing = CoalescingRepository::new(base, config.persistence.flush_interval_ms);
    coalescing.spawn_flusher();

    if config.cache.enabled {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Ok(Arc::new(CachedRepository::new(
            coalescing,
            config.cache.ttl_seconds as i64 * 1000,
            clock,
        )))
    } else {
        Ok(coalescing)
    }
}

/// `DeploymentMode::Standalone` is its own composition root (spec.md §9):
/// rather than going over a network stream, it embeds the gateway crate's
/// telnet/WebSocket listeners and outbound dispatcher directly against the
/// tick loop's own local buses. Allocation uses the `Counter` scheme since
/// a standalone deployment is inherently single-process.
fn spawn_standalone_transports(
    config: &AmbonConfig,
    inbound: Arc<LocalBus<InboundEvent>>,
    outbound: Arc<LocalBus<OutboundEvent>>,
    metrics: Arc<Metrics>,
) {
    let router = Arc::new(SessionRouter::new(config.server.session_outbound_queue_capacity, metrics));
    let allocator = Arc::new(AsyncMutex::new(SessionIdAllocator::counter()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    tokio::spawn(ambonmud_gateway::session_router::dispatch_outbound(outbound.clone(), router.clone()));

    let telnet_addr = SocketAddr::from(([0, 0, 0, 0], config.server.telnet_port));
    let telnet_inbound: Arc<dyn EventBus<InboundEvent>> = inbound.clone();
    let telnet_router = router.clone();
    let telnet_allocator = allocator.clone();
    let telnet_clock = clock.clone();
    tokio::spawn(async move {
        if let Err(e) = telnet::serve(telnet_addr, telnet_inbound, telnet_router, telnet_allocator, telnet_clock, None).await {
            error!(error = %e, "telnet listener exited");
        }
    });

    let ws_state = Arc::new(GatewayAppState {
        inbound: inbound.clone(),
        router: router.clone(),
        allocator: allocator.clone(),
        clock: clock.clone(),
        accepting: None,
    });
    let web_addr = SocketAddr::from(([0, 0, 0, 0], config.server.web_port));
    tokio::spawn(async move {
        if let Err(e) = websocket::serve(web_addr, ws_state).await {
            error!(error = %e, "websocket listener exited");
        }
    });
}

async fn build_sharding_stack(
    config: &AmbonConfig,
    self_engine_id: &EngineId,
    metrics: &Arc<Metrics>,
) -> anyhow::Result<ShardingStack> {
    let client = async_nats::connect(&config.bus.url).await?;
    let local = Arc::new(LocalBus::new(config.server.session_outbound_queue_capacity));
    let distributed = DistributedBus::spawn(
        local,
        client,
        config.bus.channel.clone(),
        config.resolved_instance_id(),
        config.bus.shared_secret.as_bytes().to_vec(),
        metrics.clone(),
    );
    let transport: Arc<dyn EventBus<InterEngineMessage>> = Arc::new(distributed);
    let bus = InterEngineBus::new(transport, self_engine_id.clone());

    let zone_registry: Box<dyn ZoneRegistry> = if config.sharding.static_zones.is_empty() {
        Box::new(DistributedZoneRegistry::new())
    } else {
        Box::new(StaticZoneRegistry::from_config(&config.sharding))
    };

    Ok(ShardingStack {
        zone_registry,
        bus,
        location_index: PlayerLocationIndex::new(),
    })
}
