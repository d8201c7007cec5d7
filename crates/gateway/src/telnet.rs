//! Telnet transport: newline-delimited line reader over a raw TCP socket
//! (spec.md §1 Non-goals: full ANSI framing is out of scope; this is the
//! minimal real transport the gateway component needs to exist and be
//! drivable per spec.md §2/§4.2).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ambonmud_domain::ids::SessionId;
use ambonmud_shared::bus::EventBus;
use ambonmud_shared::clock::Clock;
use ambonmud_shared::events::{InboundEvent, OutboundEvent};
use futures_util::StreamExt;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{info, warn};

use crate::errors::GatewayError;
use crate::renderer::{self, PromptCoalescer, TransportKind};
use crate::session_router::SessionRouter;

const DEFAULT_ANSI: bool = false;

/// `accepting` gates new connections while the gateway<->engine stream is
/// down (spec.md §4.2 "during reconnect, the inbound intake is closed so
/// new connects fail fast"). `None` in Standalone mode, where there is no
/// network hop to lose.
pub async fn serve(
    addr: SocketAddr,
    inbound: Arc<dyn EventBus<InboundEvent>>,
    router: Arc<SessionRouter>,
    allocator: Arc<Mutex<ambonmud_domain::ids::SessionIdAllocator>>,
    clock: Arc<dyn Clock>,
    accepting: Option<Arc<AtomicBool>>,
) -> Result<(), GatewayError> {
    let listener = TcpListener::bind(addr).await.map_err(|source| GatewayError::Bind {
        transport: "telnet",
        addr: addr.to_string(),
        source,
    })?;
    info!(%addr, "telnet listener bound");

    loop {
        let (mut socket, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "telnet accept failed");
                continue;
            }
        };

        if let Some(gate) = &accepting {
            if !gate.load(Ordering::Acquire) {
                let _ = socket.write_all(b"AmbonMUD is reconnecting to its engine, try again shortly.\r\n").await;
                continue;
            }
        }

        let session_id = {
            let mut alloc = allocator.lock().await;
            match alloc.allocate(clock.now_secs()) {
                Ok(id) => id,
                Err(e) => {
                    warn!(error = %e, %peer, "session id allocation failed, dropping connection");
                    continue;
                }
            }
        };
        tokio::spawn(handle_connection(socket, session_id, inbound.clone(), router.clone()));
    }
}

async fn handle_connection(
    socket: tokio::net::TcpStream,
    session_id: SessionId,
    inbound: Arc<dyn EventBus<InboundEvent>>,
    router: Arc<SessionRouter>,
) {
    let (read_half, write_half) = socket.into_split();
    let mut lines = FramedRead::new(read_half, LinesCodec::new());
    let mut writer = BufWriter::new(write_half);
    let mut outbound_rx = router.register(session_id);

    if !inbound.try_send(InboundEvent::Connected { session_id, default_ansi: DEFAULT_ANSI }) {
        warn!(%session_id, "inbound bus saturated on connect, dropping telnet session");
        router.remove(session_id);
        return;
    }

    let mut ansi_enabled = DEFAULT_ANSI;
    let mut coalescer = PromptCoalescer::new();

    loop {
        tokio::select! {
            line = lines.next() => {
                match line {
                    Some(Ok(line)) => {
                        if !inbound.try_send(InboundEvent::LineReceived { session_id, line }) {
                            warn!(%session_id, "inbound bus saturated, dropping line");
                        }
                    }
                    Some(Err(e)) => {
                        warn!(%session_id, error = %e, "telnet read error");
                        break;
                    }
                    None => break,
                }
            }
            event = outbound_rx.recv() => {
                match event {
                    Some(event) => {
                        if !coalescer.should_emit(&event) {
                            continue;
                        }
                        match renderer::render(&event, &mut ansi_enabled, TransportKind::Telnet) {
                            Some(renderer::Rendered::Line(line)) => {
                                if writer.write_all(line.as_bytes()).await.is_err()
                                    || writer.write_all(b"\r\n").await.is_err()
                                    || writer.flush().await.is_err()
                                {
                                    break;
                                }
                            }
                            Some(renderer::Rendered::Close(reason)) => {
                                let _ = writer.write_all(format!("{reason}\r\n").as_bytes()).await;
                                let _ = writer.flush().await;
                                break;
                            }
                            None => {}
                        }
                    }
                    None => break,
                }
            }
        }
    }

    let reason = router.take_disconnect_reason(session_id).unwrap_or_else(|| "connection closed".to_string());
    let _ = inbound.try_send(InboundEvent::Disconnected { session_id, reason });
    router.remove(session_id);
    info!(%session_id, "telnet session ended");
}
