//! WebSocket transport (spec.md §1 Non-goals: rich ANSI framing excluded;
//! this proves the transport exists per spec.md §2/§4.2). Grounded on the
//! teacher's `ws_handler`/`handle_socket` split-and-forward pattern.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ambonmud_shared::bus::EventBus;
use ambonmud_shared::clock::Clock;
use ambonmud_shared::events::{InboundEvent, OutboundEvent};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::errors::GatewayError;
use crate::renderer::{self, PromptCoalescer, TransportKind};
use crate::session_router::SessionRouter;

const DEFAULT_ANSI: bool = true;

pub struct GatewayAppState {
    pub inbound: Arc<dyn EventBus<InboundEvent>>,
    pub router: Arc<SessionRouter>,
    pub allocator: Arc<Mutex<ambonmud_domain::ids::SessionIdAllocator>>,
    pub clock: Arc<dyn Clock>,
    /// See `telnet::serve`'s `accepting` parameter.
    pub accepting: Option<Arc<AtomicBool>>,
}

pub fn app(state: Arc<GatewayAppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: Arc<GatewayAppState>) -> Result<(), GatewayError> {
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|source| GatewayError::Bind {
        transport: "websocket",
        addr: addr.to_string(),
        source,
    })?;
    info!(%addr, "websocket listener bound");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<GatewayAppState>>) -> Response {
    let accepting = state.accepting.as_ref().map(|g| g.load(Ordering::Acquire)).unwrap_or(true);
    if !accepting {
        return (StatusCode::SERVICE_UNAVAILABLE, "engine link unavailable, try again shortly").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state)).into_response()
}

async fn handle_socket(socket: WebSocket, state: Arc<GatewayAppState>) {
    let session_id = {
        let mut alloc = state.allocator.lock().await;
        match alloc.allocate(state.clock.now_secs()) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "session id allocation failed, closing websocket");
                return;
            }
        }
    };

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut outbound_rx = state.router.register(session_id);

    if !state.inbound.try_send(InboundEvent::Connected { session_id, default_ansi: DEFAULT_ANSI }) {
        warn!(%session_id, "inbound bus saturated on connect, dropping websocket session");
        state.router.remove(session_id);
        return;
    }

    let send_task = tokio::spawn(async move {
        let mut ansi_enabled = DEFAULT_ANSI;
        let mut coalescer = PromptCoalescer::new();
        while let Some(event) = outbound_rx.recv().await {
            if !coalescer.should_emit(&event) {
                continue;
            }
            match renderer::render(&event, &mut ansi_enabled, TransportKind::WebSocket) {
                Some(renderer::Rendered::Line(line)) => {
                    if ws_tx.send(Message::Text(line.into())).await.is_err() {
                        break;
                    }
                }
                Some(renderer::Rendered::Close(reason)) => {
                    let _ = ws_tx.send(Message::Text(reason.into())).await;
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
                None => {}
            }
        }
    });

    while let Some(message) = ws_rx.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if !state.inbound.try_send(InboundEvent::LineReceived { session_id, line: text.to_string() }) {
                    warn!(%session_id, "inbound bus saturated, dropping line");
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(%session_id, error = %e, "websocket read error");
                break;
            }
        }
    }

    let reason = state.router.take_disconnect_reason(session_id).unwrap_or_else(|| "connection closed".to_string());
    let _ = state.inbound.try_send(InboundEvent::Disconnected { session_id, reason });
    state.router.remove(session_id);
    send_task.abort();
    info!(%session_id, "websocket session ended");
}
