//! Owns the single TCP stream to the paired engine process and the
//! reconnect-with-backoff state machine driving it (spec.md §4.2). Used
//! only in `DeploymentMode::Gateway`; Standalone mode wires its transports
//! directly against in-process `LocalBus`es instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ambonmud_domain::random::RandomSource;
use ambonmud_shared::bus::{EventBus, LocalBus};
use ambonmud_shared::config::ReconnectConfig;
use ambonmud_shared::errors::SharedError;
use ambonmud_shared::events::{InboundEvent, OutboundEvent};
use ambonmud_shared::gateway_link::GatewayFrame;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{info, warn};

use crate::errors::GatewayError;
use crate::reconnect::backoff_delay;
use crate::session_router::SessionRouter;

/// Bridges the gateway's local `InboundEvent`/`OutboundEvent` traffic to
/// the remote engine over one length-delimited stream, reconnecting with
/// backoff on failure.
pub struct EngineLink {
    /// "host:port", resolved via `ToSocketAddrs` on every connect attempt
    /// rather than once, so DNS changes for the paired engine take effect
    /// across reconnects.
    addr: String,
    accepting: Arc<AtomicBool>,
    local_outbound: Arc<LocalBus<OutboundEvent>>,
    writer: Mutex<Option<mpsc::Sender<Bytes>>>,
    dropped: Arc<Notify>,
}

impl EngineLink {
    pub fn new(addr: String, local_outbound: Arc<LocalBus<OutboundEvent>>) -> Self {
        Self {
            addr,
            accepting: Arc::new(AtomicBool::new(false)),
            local_outbound,
            writer: Mutex::new(None),
            dropped: Arc::new(Notify::new()),
        }
    }

    /// Telnet/WebSocket acceptors check this before completing a handshake;
    /// false while the engine stream is down or being reconnected.
    pub fn accepting_flag(&self) -> Arc<AtomicBool> {
        self.accepting.clone()
    }

    /// Runs the connect/reconnect loop forever. Returns only once
    /// `max_attempts` consecutive reconnect attempts have failed, at which
    /// point the gateway process shuts down (spec.md §4.2 "on exhaustion
    /// the gateway shuts down").
    pub async fn run(
        self: Arc<Self>,
        config: ReconnectConfig,
        router: Arc<SessionRouter>,
        rng: &mut dyn RandomSource,
    ) -> Result<(), GatewayError> {
        if self.connect_once().await.is_ok() {
            self.accepting.store(true, Ordering::Release);
            info!(addr = %self.addr, "engine stream established");
        } else {
            warn!(addr = %self.addr, "initial engine stream connect failed, entering reconnect loop");
            self.reconnect_loop(&config, &router, rng).await?;
        }

        // `dropped` fires once for whichever connection is currently live,
        // set up either just above or by the most recent `reconnect_loop`
        // success; each iteration waits out exactly one connection's life.
        loop {
            self.dropped.notified().await;
            self.accepting.store(false, Ordering::Release);
            *self.writer.lock().await = None;
            self.reconnect_loop(&config, &router, rng).await?;
        }
    }

    async fn reconnect_loop(
        &self,
        config: &ReconnectConfig,
        router: &Arc<SessionRouter>,
        rng: &mut dyn RandomSource,
    ) -> Result<(), GatewayError> {
        for attempt in 1..=config.max_attempts {
            let delay = backoff_delay(config, attempt, rng);
            tokio::time::sleep(delay).await;
            if self.connect_once().await.is_ok() {
                tokio::time::sleep(std::time::Duration::from_millis(config.stream_verify_ms)).await;
                if self.writer.lock().await.is_some() {
                    self.accepting.store(true, Ordering::Release);
                    router.close_all("engine connection was re-established, please reconnect");
                    info!(attempt, "engine stream reconnected");
                    return Ok(());
                }
            }
            warn!(attempt, "engine stream reconnect attempt failed");
        }
        Err(GatewayError::ReconnectExhausted { attempts: config.max_attempts })
    }

    async fn connect_once(&self) -> Result<(), GatewayError> {
        let stream = TcpStream::connect(self.addr.clone()).await?;
        let framed = Framed::new(stream, LengthDelimitedCodec::new());
        let (mut sink, mut read_half) = framed.split();
        let (tx, mut rx) = mpsc::channel::<Bytes>(256);

        let local_outbound = self.local_outbound.clone();
        let dropped = self.dropped.clone();
        tokio::spawn(async move {
            while let Some(frame) = read_half.next().await {
                let Ok(frame) = frame else { break };
                match GatewayFrame::decode(&frame) {
                    Ok(GatewayFrame::Outbound(event)) => {
                        if !local_outbound.try_send(event) {
                            warn!("local outbound bus full, dropping event from engine stream");
                        }
                    }
                    Ok(GatewayFrame::Inbound(_)) => {
                        warn!("gateway received an Inbound frame from the engine, ignoring");
                    }
                    Err(e) => warn!(error = %e, "failed to decode engine stream frame"),
                }
            }
            dropped.notify_one();
        });
        tokio::spawn(async move {
            while let Some(bytes) = rx.recv().await {
                if sink.send(bytes).await.is_err() {
                    break;
                }
            }
        });

        *self.writer.lock().await = Some(tx);
        Ok(())
    }
}

/// `EngineLink` is a write-through sink: `send`/`try_send` forward to the
/// remote engine, `receive`/`try_receive` are unused (nothing ever reads
/// `InboundEvent`s back off this side of the stream).
#[async_trait]
impl EventBus<InboundEvent> for EngineLink {
    async fn send(&self, event: InboundEvent) -> Result<(), SharedError> {
        let frame = GatewayFrame::Inbound(event).encode().map_err(|_| SharedError::BusClosed)?;
        let guard = self.writer.lock().await;
        match guard.as_ref() {
            Some(tx) => tx.send(Bytes::from(frame)).await.map_err(|_| SharedError::BusClosed),
            None => Err(SharedError::BusClosed),
        }
    }

    fn try_send(&self, event: InboundEvent) -> bool {
        let frame = match GatewayFrame::Inbound(event).encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to encode inbound frame");
                return false;
            }
        };
        let Ok(guard) = self.writer.try_lock() else {
            return false;
        };
        match guard.as_ref() {
            Some(tx) => tx.try_send(Bytes::from(frame)).is_ok(),
            None => false,
        }
    }

    fn try_receive(&self) -> Option<InboundEvent> {
        None
    }

    async fn receive(&self) -> Option<InboundEvent> {
        std::future::pending().await
    }

    fn close(&self) {
        self.accepting.store(false, Ordering::Release);
    }

    fn depth(&self) -> usize {
        0
    }
}
