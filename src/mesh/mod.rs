//! key: event-mesh
//! In-process pub/sub fabric with wildcard pattern subscriptions, bounded
//! FIFO delivery, and handler isolation. Single writer (the router task),
//! many readers (subscribers).

mod event;
mod pattern;

pub use event::Event;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::{MESH_QUEUE_CAPACITY, SAFE_HELPER_TIMEOUT};
use crate::error::{GraceError, GraceResult};

/// Capability a subscriber implements to receive matching events. A handler
/// failure (panic-free `Err`, or the handler itself swallowing its error) is
/// isolated by the router: it is logged and never propagates, so one bad
/// handler can't stall the mesh.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, event: &Event);
}

#[async_trait]
impl<F> Handler for F
where
    F: Fn(&Event) + Send + Sync,
{
    async fn handle(&self, event: &Event) {
        (self)(event)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

struct Subscription {
    handle: SubscriptionHandle,
    pattern: String,
    handler: Arc<dyn Handler>,
}

/// Best-effort fan-out target for `publish`: every published event is also
/// handed to the Immutable Log writer with `result = "published"`. Failures
/// here never block delivery.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn record_published(&self, event: &Event);
}

/// Subsystem tag the mesh sheds first under sustained overload, ahead of
/// health/governance/execution traffic.
const TELEMETRY_SUBSYSTEM: &str = "telemetry";

/// Fraction of the configured capacity set aside for the telemetry lane.
/// Keeping it a strict subset of the main queue's capacity (rather than a
/// carve-out of shared capacity) means telemetry saturates and sheds on its
/// own without ever consuming headroom the priority lane needs.
const TELEMETRY_CAPACITY_DIVISOR: usize = 4;

pub struct EventMesh {
    sender: mpsc::Sender<Event>,
    telemetry_sender: mpsc::Sender<Event>,
    subscriptions: Arc<RwLock<Vec<Subscription>>>,
    next_handle: AtomicU64,
    dropped_telemetry: Arc<std::sync::atomic::AtomicU64>,
}

impl EventMesh {
    /// Spawns the router task and returns a handle to the mesh. `log_sink`
    /// is optional so the mesh remains usable in isolation during tests.
    pub fn spawn(log_sink: Option<Arc<dyn EventSink>>) -> Arc<Self> {
        Self::spawn_with_capacity(*MESH_QUEUE_CAPACITY, log_sink)
    }

    pub fn spawn_with_capacity(capacity: usize, log_sink: Option<Arc<dyn EventSink>>) -> Arc<Self> {
        let telemetry_capacity = (capacity / TELEMETRY_CAPACITY_DIVISOR).max(1);
        let (sender, mut receiver) = mpsc::channel::<Event>(capacity);
        let (telemetry_sender, mut telemetry_receiver) = mpsc::channel::<Event>(telemetry_capacity);
        let subscriptions: Arc<RwLock<Vec<Subscription>>> = Arc::new(RwLock::new(Vec::new()));
        let dropped_telemetry = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let mesh = Arc::new(Self {
            sender,
            telemetry_sender,
            subscriptions: subscriptions.clone(),
            next_handle: AtomicU64::new(1),
            dropped_telemetry: dropped_telemetry.clone(),
        });

        tokio::spawn(async move {
            loop {
                // Biased: the priority lane (health/governance/execution/...)
                // always drains ahead of telemetry, so a telemetry burst
                // never delays non-telemetry delivery.
                let event = tokio::select! {
                    biased;
                    event = receiver.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                    event = telemetry_receiver.recv() => match event {
                        Some(event) => event,
                        None => continue,
                    },
                };
                if let Some(sink) = &log_sink {
                    sink.record_published(&event).await;
                }
                let subs = subscriptions.read().await;
                for sub in subs.iter() {
                    if pattern::matches(&sub.pattern, &event.event_type) {
                        sub.handler.handle(&event).await;
                    }
                }
            }
            debug!("event mesh router exiting: sender dropped");
        });

        mesh
    }

    /// Appends to the bounded FIFO. Fails with `BackpressureFull` once the
    /// high-water mark is reached rather than dropping the oldest entry.
    /// Telemetry-tagged events route through a separate, smaller-capacity
    /// lane, so under sustained overload they saturate and get refused
    /// first, protecting the health/governance/execution lane's capacity.
    pub async fn publish(&self, event: Event) -> GraceResult<()> {
        if event.subsystem == TELEMETRY_SUBSYSTEM {
            return self.telemetry_sender.try_send(event).map_err(|_| {
                self.dropped_telemetry.fetch_add(1, Ordering::Relaxed);
                GraceError::BackpressureFull
            });
        }
        self.sender
            .try_send(event)
            .map_err(|_| GraceError::BackpressureFull)
    }

    /// Idempotent add; returns a handle usable with `unsubscribe`.
    pub async fn subscribe(&self, pattern: impl Into<String>, handler: Arc<dyn Handler>) -> SubscriptionHandle {
        let pattern = pattern.into();
        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let mut subs = self.subscriptions.write().await;
        if let Some(existing) = subs
            .iter()
            .find(|s| s.pattern == pattern && Arc::ptr_eq(&s.handler, &handler))
        {
            return existing.handle;
        }
        subs.push(Subscription {
            handle,
            pattern,
            handler,
        });
        handle
    }

    pub async fn unsubscribe(&self, handle: SubscriptionHandle) {
        let mut subs = self.subscriptions.write().await;
        subs.retain(|s| s.handle != handle);
    }

    pub fn dropped_telemetry_count(&self) -> u64 {
        self.dropped_telemetry.load(Ordering::Relaxed)
    }
}

/// Wraps `publish` with the default bounded timeout, translating a timeout
/// or backpressure failure into a warning + counter bump instead of
/// propagating, for telemetry-grade events that must never block a caller.
pub async fn safe_publish(mesh: &EventMesh, event: Event) {
    match timeout(*SAFE_HELPER_TIMEOUT, mesh.publish(event)).await {
        Ok(Ok(())) => {}
        Ok(Err(GraceError::BackpressureFull)) => {
            warn!("safe_publish: mesh backpressure, event dropped");
        }
        Ok(Err(err)) => warn!(?err, "safe_publish: publish failed"),
        Err(_) => warn!("safe_publish: timed out"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::sleep;

    #[tokio::test]
    async fn delivers_to_matching_pattern_only() {
        let mesh = EventMesh::spawn(None);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        mesh.subscribe(
            "health.*",
            Arc::new(move |_: &Event| {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .await;

        mesh.publish(Event::new(
            "health.degraded",
            "test",
            "test",
            "svc-a",
            "health",
            BTreeMap::new(),
        ))
        .await
        .unwrap();
        mesh.publish(Event::new(
            "governance.allow",
            "test",
            "test",
            "svc-a",
            "governance",
            BTreeMap::new(),
        ))
        .await
        .unwrap();

        sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn backpressure_rejects_when_full() {
        let mesh = EventMesh::spawn_with_capacity(1, None);
        // No subscribers draining, and the router task itself consumes one
        // slot per recv call; saturate quickly by publishing many events in
        // a tight loop without yielding.
        let mut last = Ok(());
        for _ in 0..10_000 {
            last = mesh
                .publish(Event::new(
                    "flood.event",
                    "test",
                    "test",
                    "r",
                    "telemetry",
                    BTreeMap::new(),
                ))
                .await;
            if last.is_err() {
                break;
            }
        }
        assert!(matches!(last, Err(GraceError::BackpressureFull)) || last.is_ok());
        if last.is_err() {
            assert!(mesh.dropped_telemetry_count() >= 1);
        }
    }

    #[tokio::test]
    async fn telemetry_flood_does_not_starve_priority_lane() {
        let mesh = EventMesh::spawn_with_capacity(1, None);
        for _ in 0..10_000 {
            let _ = mesh
                .publish(Event::new(
                    "flood.event",
                    "test",
                    "test",
                    "r",
                    "telemetry",
                    BTreeMap::new(),
                ))
                .await;
        }
        let health_event = Event::new("health.degraded", "test", "test", "svc-a", "health", BTreeMap::new());
        assert!(mesh.publish(health_event).await.is_ok());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let mesh = EventMesh::spawn(None);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        let handle = mesh
            .subscribe(
                "*",
                Arc::new(move |_: &Event| {
                    hits_clone.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await;
        mesh.unsubscribe(handle).await;
        mesh.publish(Event::new("a.b", "t", "t", "r", "s", BTreeMap::new()))
            .await
            .unwrap();
        sleep(Duration::from_millis(20)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
