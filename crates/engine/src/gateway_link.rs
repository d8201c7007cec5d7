//! Engine-side listener for the gateway<->engine streamed bus (spec.md
//! §4.1/§4.2, `DeploymentMode::Engine`). Accepts the single configured
//! gateway's connection and bridges it to the engine's local
//! `InboundEvent`/`OutboundEvent` buses. The gateway owns reconnect timing
//! end to end; this side just keeps re-accepting.

use std::net::SocketAddr;
use std::sync::Arc;

use ambonmud_shared::bus::{EventBus, LocalBus};
use ambonmud_shared::errors::SharedError;
use ambonmud_shared::events::{InboundEvent, OutboundEvent};
use ambonmud_shared::gateway_link::GatewayFrame;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{info, warn};

/// Write-through `EventBus<OutboundEvent>` that encodes onto whichever
/// gateway connection is currently live. `try_send`/`send` drop events
/// while no gateway is connected, the same backpressure shape the tick
/// loop already handles for a saturated local bus.
pub struct GatewayWriteBus {
    writer: Mutex<Option<mpsc::Sender<Bytes>>>,
}

impl GatewayWriteBus {
    pub fn new() -> Self {
        Self { writer: Mutex::new(None) }
    }

    async fn set_writer(&self, tx: Option<mpsc::Sender<Bytes>>) {
        *self.writer.lock().await = tx;
    }
}

impl Default for GatewayWriteBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus<OutboundEvent> for GatewayWriteBus {
    async fn send(&self, event: OutboundEvent) -> Result<(), SharedError> {
        let frame = GatewayFrame::Outbound(event).encode().map_err(|_| SharedError::BusClosed)?;
        let guard = self.writer.lock().await;
        match guard.as_ref() {
            Some(tx) => tx.send(Bytes::from(frame)).await.map_err(|_| SharedError::BusClosed),
            None => Err(SharedError::BusClosed),
        }
    }

    fn try_send(&self, event: OutboundEvent) -> bool {
        let frame = match GatewayFrame::Outbound(event).encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to encode outbound frame");
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

    fn try_receive(&self) -> Option<OutboundEvent> {
        None
    }

    async fn receive(&self) -> Option<OutboundEvent> {
        std::future::pending().await
    }

    fn close(&self) {}

    fn depth(&self) -> usize {
        0
    }
}

/// Accepts gateway connections forever, decoding `GatewayFrame::Inbound`
/// frames into `inbound` and wiring each new connection's writer half into
/// `outbound_bus` so the tick loop's `OutboundEvent`s reach whichever
/// gateway is currently connected.
pub async fn serve(addr: SocketAddr, inbound: Arc<LocalBus<InboundEvent>>, outbound_bus: Arc<GatewayWriteBus>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "gateway link listener bound");

    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "gateway link accept failed");
                continue;
            }
        };
        info!(%peer, "gateway connected");

        let framed = Framed::new(socket, LengthDelimitedCodec::new());
        let (mut sink, mut stream) = framed.split();
        let (tx, mut rx) = mpsc::channel::<Bytes>(256);
        outbound_bus.set_writer(Some(tx)).await;

        let inbound = inbound.clone();
        let outbound_bus_for_cleanup = outbound_bus.clone();
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let Ok(frame) = frame else { break };
                match GatewayFrame::decode(&frame) {
                    Ok(GatewayFrame::Inbound(event)) => {
                        if !inbound.try_send(event) {
                            warn!("engine inbound bus full, dropping event from gateway");
                        }
                    }
                    Ok(GatewayFrame::Outbound(_)) => {
                        warn!("engine received an Outbound frame from the gateway, ignoring");
                    }
                    Err(e) => warn!(error = %e, "failed to decode gateway link frame"),
                }
            }
            outbound_bus_for_cleanup.set_writer(None).await;
            info!("gateway disconnected");
        });
        tokio::spawn(async move {
            while let Some(bytes) = rx.recv().await {
                if sink.send(bytes).await.is_err() {
                    break;
                }
            }
        });
    }
}
