//! The gateway binary: terminates telnet/WebSocket connections, allocates
//! session ids, and relays `InboundEvent`/`OutboundEvent` to a single
//! paired engine over a reconnecting streamed link (spec.md §4.1/§4.2,
//! `DeploymentMode::Gateway`).

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use ambonmud_domain::ids::{GatewayId, SessionIdAllocator};
use ambonmud_gateway::engine_link::EngineLink;
use ambonmud_gateway::rng::ThreadRandom;
use ambonmud_gateway::session_router::{self, SessionRouter};
use ambonmud_gateway::websocket::GatewayAppState;
use ambonmud_gateway::{telnet, websocket};
use ambonmud_shared::bus::LocalBus;
use ambonmud_shared::clock::{Clock, SystemClock};
use ambonmud_shared::config::{AmbonConfig, DeploymentMode};
use ambonmud_shared::events::OutboundEvent;
use ambonmud_shared::metrics::Metrics;
use tokio::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_file = env::args().nth(1);
    let config = AmbonConfig::load(config_file.as_deref())?;

    if !matches!(config.mode, DeploymentMode::Gateway) {
        anyhow::bail!("ambonmud-gateway only serves DeploymentMode::Gateway; run the engine binary instead");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let allocator = Arc::new(Mutex::new(SessionIdAllocator::snowflake(GatewayId(config.gateway.id))));
    let metrics = Arc::new(Metrics::new());
    let router = Arc::new(SessionRouter::new(config.server.session_outbound_queue_capacity, metrics));

    let local_outbound = Arc::new(LocalBus::<OutboundEvent>::new(config.server.session_outbound_queue_capacity));
    let engine_addr = format!("{}:{}", config.grpc.client_host, config.grpc.client_port);
    let engine_link = Arc::new(EngineLink::new(engine_addr, local_outbound.clone()));

    let reconnect_config = config.gateway.reconnect.clone();
    let link_for_run = engine_link.clone();
    let router_for_run = router.clone();
    tokio::spawn(async move {
        let mut rng = ThreadRandom;
        if let Err(e) = link_for_run.run(reconnect_config, router_for_run, &mut rng).await {
            error!(error = %e, "engine link reconnect loop exhausted, shutting down gateway");
            std::process::exit(1);
        }
    });

    tokio::spawn(session_router::dispatch_outbound(local_outbound.clone(), router.clone()));

    let accepting = Some(engine_link.accepting_flag());

    let telnet_addr = SocketAddr::from(([0, 0, 0, 0], config.server.telnet_port));
    let telnet_inbound = engine_link.clone();
    let telnet_router = router.clone();
    let telnet_allocator = allocator.clone();
    let telnet_clock = clock.clone();
    let telnet_accepting = accepting.clone();
    let telnet_task = tokio::spawn(async move {
        if let Err(e) = telnet::serve(telnet_addr, telnet_inbound, telnet_router, telnet_allocator, telnet_clock, telnet_accepting).await {
            error!(error = %e, "telnet listener exited");
        }
    });

    let ws_state = Arc::new(GatewayAppState {
        inbound: engine_link.clone(),
        router: router.clone(),
        allocator: allocator.clone(),
        clock: clock.clone(),
        accepting,
    });
    let web_addr = SocketAddr::from(([0, 0, 0, 0], config.server.web_port));
    let ws_task = tokio::spawn(async move {
        if let Err(e) = websocket::serve(web_addr, ws_state).await {
            error!(error = %e, "websocket listener exited");
        }
    });

    info!(gateway_id = config.gateway.id, engine_addr = %format!("{}:{}", config.grpc.client_host, config.grpc.client_port), "gateway starting");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received, shutting down");
        }
        _ = telnet_task => {
            error!("telnet listener task ended unexpectedly");
        }
        _ = ws_task => {
            error!("websocket listener task ended unexpectedly");
        }
    }

    Ok(())
}
