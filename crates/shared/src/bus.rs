//! The event bus abstraction and its three implementations (spec.md §4.1).
//!
//! `EventBus<E>` is generic over the event type so the same machinery backs
//! both the `InboundEvent` bus (transport -> engine) and the `OutboundEvent`
//! bus (engine -> transport); the gateway's inter-engine link reuses it a
//! third time for `InterEngineMessage`.

use crate::envelope::Envelope;
use crate::errors::SharedError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

#[async_trait]
pub trait EventBus<E: Send + 'static>: Send + Sync {
    /// Enqueues `event`, suspending if the bounded queue is full.
    async fn send(&self, event: E) -> Result<(), SharedError>;

    /// Enqueues `event` without suspending. Returns `false` if the queue was
    /// full and the event was rejected (caller disconnects on backpressure).
    fn try_send(&self, event: E) -> bool;

    /// Non-blocking poll for the next queued event.
    fn try_receive(&self) -> Option<E>;

    /// Blocks until an event is available or the bus is closed.
    async fn receive(&self) -> Option<E>;

    fn close(&self);

    /// Current queue depth, exposed for backpressure metrics.
    fn depth(&self) -> usize;
}

/// A bounded in-process queue with a depth gauge, the shared building block
/// every bus variant wraps (spec.md §4.1: "Local: wraps a bounded
/// in-process queue with a depth gauge").
pub struct LocalBus<E> {
    tx: mpsc::Sender<E>,
    rx: tokio::sync::Mutex<mpsc::Receiver<E>>,
    depth: Arc<AtomicUsize>,
    closed: Arc<std::sync::atomic::AtomicBool>,
}

impl<E: Send + 'static> LocalBus<E> {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            depth: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl<E: Send + 'static> EventBus<E> for LocalBus<E> {
    async fn send(&self, event: E) -> Result<(), SharedError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SharedError::BusClosed);
        }
        self.tx.send(event).await.map_err(|_| SharedError::BusClosed)?;
        self.depth.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn try_send(&self, event: E) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        match self.tx.try_send(event) {
            Ok(()) => {
                self.depth.fetch_add(1, Ordering::AcqRel);
                true
            }
            Err(_) => false,
        }
    }

    fn try_receive(&self) -> Option<E> {
        let mut rx = self.rx.try_lock().ok()?;
        let event = rx.try_recv().ok();
        if event.is_some() {
            self.depth.fetch_sub(1, Ordering::AcqRel);
        }
        event
    }

    async fn receive(&self) -> Option<E> {
        let mut rx = self.rx.lock().await;
        let event = rx.recv().await;
        if event.is_some() {
            self.depth.fetch_sub(1, Ordering::AcqRel);
        }
        event
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }
}

/// Wraps a [`LocalBus`] delegate: every sent event is also encoded into a
/// signed envelope and published to a named NATS subject; a background
/// subscriber decodes, verifies, rejects own-instance echoes, and delivers
/// into the local delegate (spec.md §4.1 "Distributed (pub/sub)").
///
/// Failure to publish never propagates upward - the local delegate remains
/// the source of truth for this process.
pub struct DistributedBus<E> {
    local: Arc<LocalBus<E>>,
    client: async_nats::Client,
    subject: String,
    instance_id: String,
    shared_secret: Vec<u8>,
    metrics: Arc<crate::metrics::Metrics>,
}

impl<E> DistributedBus<E>
where
    E: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn spawn(
        local: Arc<LocalBus<E>>,
        client: async_nats::Client,
        subject: String,
        instance_id: String,
        shared_secret: Vec<u8>,
        metrics: Arc<crate::metrics::Metrics>,
    ) -> Self {
        let bus = Self {
            local,
            client,
            subject,
            instance_id,
            shared_secret,
            metrics,
        };
        bus.spawn_subscriber();
        bus
    }

    fn spawn_subscriber(&self) {
        let client = self.client.clone();
        let subject = self.subject.clone();
        let instance_id = self.instance_id.clone();
        let shared_secret = self.shared_secret.clone();
        let local = self.local.clone();
        tokio::spawn(async move {
            let mut subscriber = match client.subscribe(subject.clone()).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, subject, "failed to subscribe to distributed bus subject");
                    return;
                }
            };
            use futures_util::StreamExt;
            while let Some(message) = subscriber.next().await {
                let envelope: Envelope = match serde_json::from_slice(&message.payload) {
                    Ok(e) => e,
                    Err(e) => {
                        warn!(error = %e, "malformed envelope on distributed bus, dropping");
                        continue;
                    }
                };
                if envelope.is_own_origin(&instance_id) {
                    continue;
                }
                if !envelope.verify(&shared_secret) {
                    warn!(sender = %envelope.sender, "bad signature on distributed bus envelope, dropping");
                    continue;
                }
                match serde_json::from_slice::<E>(&envelope.payload) {
                    Ok(event) => {
                        if !local.try_send(event) {
                            warn!("local delegate full, dropping distributed bus event");
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to decode distributed bus payload"),
                }
            }
        });
    }

    async fn publish(&self, event: &E) {
        let Ok(payload) = serde_json::to_vec(event) else {
            warn!("failed to encode event for distributed publish");
            return;
        };
        let envelope = Envelope::sign(&self.instance_id, "Event", payload, &self.shared_secret);
        let Ok(encoded) = serde_json::to_vec(&envelope) else {
            return;
        };
        if let Err(e) = self.client.publish(self.subject.clone(), encoded.into()).await {
            self.metrics.incr_bus_publish_failures();
            warn!(error = %e, "distributed bus publish failed, local delegate remains authoritative");
        }
    }
}

#[async_trait]
impl<E> EventBus<E> for DistributedBus<E>
where
    E: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn send(&self, event: E) -> Result<(), SharedError> {
        self.publish(&event).await;
        self.local.send(event).await
    }

    fn try_send(&self, event: E) -> bool {
        let local = self.local.clone();
        let client = self.client.clone();
        let subject = self.subject.clone();
        let instance_id = self.instance_id.clone();
        let shared_secret = self.shared_secret.clone();
        let metrics = self.metrics.clone();
        if let Ok(payload) = serde_json::to_vec(&event) {
            tokio::spawn(async move {
                let envelope = Envelope::sign(&instance_id, "Event", payload, &shared_secret);
                if let Ok(encoded) = serde_json::to_vec(&envelope) {
                    if client.publish(subject, encoded.into()).await.is_err() {
                        metrics.incr_bus_publish_failures();
                    }
                }
            });
        }
        local.try_send(event)
    }

    fn try_receive(&self) -> Option<E> {
        self.local.try_receive()
    }

    async fn receive(&self) -> Option<E> {
        self.local.receive().await
    }

    fn close(&self) {
        self.local.close();
    }

    fn depth(&self) -> usize {
        self.local.depth()
    }
}

/// Wraps a [`LocalBus`] delegate plus a single bidirectional length-delimited
/// stream to the gateway/engine on the other end (spec.md §4.1 "Streamed
/// (gateway<->engine)"). Every sent event is also encoded and written to the
/// stream; bytes read off the stream are decoded and enqueued locally.
pub struct StreamedBus<E> {
    local: Arc<LocalBus<E>>,
    outbound_tx: mpsc::Sender<Vec<u8>>,
}

impl<E> StreamedBus<E>
where
    E: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// `outbound_tx` feeds a `LengthDelimitedCodec`-framed writer task owned
    /// by the caller (the gateway's RPC client or the engine's RPC server);
    /// `inbound_rx` receives already length-delimited frames from that same
    /// stream's reader half.
    pub fn spawn(
        local: Arc<LocalBus<E>>,
        outbound_tx: mpsc::Sender<Vec<u8>>,
        mut inbound_rx: mpsc::Receiver<Vec<u8>>,
    ) -> Self {
        let delegate = local.clone();
        tokio::spawn(async move {
            while let Some(frame) = inbound_rx.recv().await {
                match bincode::deserialize::<E>(&frame) {
                    Ok(event) => {
                        if !delegate.try_send(event) {
                            warn!("local delegate full, dropping streamed bus event");
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to decode streamed bus frame"),
                }
            }
        });
        Self { local, outbound_tx }
    }

    async fn forward(&self, event: &E) {
        if let Ok(bytes) = bincode::serialize(event) {
            let _ = self.outbound_tx.send(bytes).await;
        }
    }
}

#[async_trait]
impl<E> EventBus<E> for StreamedBus<E>
where
    E: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn send(&self, event: E) -> Result<(), SharedError> {
        self.forward(&event).await;
        self.local.send(event).await
    }

    fn try_send(&self, event: E) -> bool {
        if let Ok(bytes) = bincode::serialize(&event) {
            let _ = self.outbound_tx.try_send(bytes);
        }
        self.local.try_send(event)
    }

    fn try_receive(&self) -> Option<E> {
        self.local.try_receive()
    }

    async fn receive(&self) -> Option<E> {
        self.local.receive().await
    }

    fn close(&self) {
        self.local.close();
    }

    fn depth(&self) -> usize {
        self.local.depth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_bus_send_and_receive_round_trips() {
        let bus: LocalBus<i32> = LocalBus::new(4);
        bus.send(1).await.unwrap();
        bus.send(2).await.unwrap();
        assert_eq!(bus.depth(), 2);
        assert_eq!(bus.receive().await, Some(1));
        assert_eq!(bus.depth(), 1);
    }

    #[tokio::test]
    async fn try_send_rejects_when_full() {
        let bus: LocalBus<i32> = LocalBus::new(1);
        assert!(bus.try_send(1));
        assert!(!bus.try_send(2), "second send should be rejected by backpressure");
    }

    #[tokio::test]
    async fn closed_bus_rejects_sends() {
        let bus: LocalBus<i32> = LocalBus::new(4);
        bus.close();
        assert!(bus.send(1).await.is_err());
    }

    #[tokio::test]
    async fn try_receive_on_empty_bus_returns_none() {
        let bus: LocalBus<i32> = LocalBus::new(4);
        assert_eq!(bus.try_receive(), None);
    }
}
