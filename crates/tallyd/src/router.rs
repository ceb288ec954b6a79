//! Classification of inbound tracking events.

use std::sync::Arc;

use tally_types::{TrackingEvent, TrackingKind};
use tokio::task::JoinSet;
use tracing::debug;

use crate::handshake::FinishHandshake;
use crate::health::HealthReporter;
use crate::probe::DeviceProbe;
use crate::queue::DeliveryQueue;

const ROUTER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::router");

/// Dispatches each inbound event to the queue, the probe or the handshake.
///
/// Generic events are enqueued synchronously so their order is fixed at
/// receipt. Probing and finishing run as background tasks owned by the
/// router, so routing never waits on a device or on the grace period.
pub struct MessageRouter {
    queue: DeliveryQueue,
    probe: DeviceProbe,
    handshake: Arc<FinishHandshake>,
    reporter: Arc<dyn HealthReporter>,
    tasks: JoinSet<()>,
}

impl MessageRouter {
    /// Builds a router over the given collaborators.
    #[must_use]
    pub fn new(
        queue: DeliveryQueue,
        probe: DeviceProbe,
        handshake: Arc<FinishHandshake>,
        reporter: Arc<dyn HealthReporter>,
    ) -> Self {
        Self {
            queue,
            probe,
            handshake,
            reporter,
            tasks: JoinSet::new(),
        }
    }

    /// Handles one event from the parent.
    pub fn route(&mut self, event: TrackingEvent) {
        self.reporter.message_received(&event);
        match event.kind() {
            TrackingKind::Finish => {
                self.handshake.record_peer_finish();
                self.spawn_finish(Some(event));
            }
            TrackingKind::PreviewAppData => {
                let probe = self.probe.clone();
                self.tasks.spawn(async move {
                    probe.run(event).await;
                });
            }
            TrackingKind::Generic => {
                // The ticket is not awaited; failures are reported by the queue.
                drop(self.queue.enqueue(event));
            }
        }
        self.reap();
    }

    /// Handles end of stream on the parent channel.
    pub fn disconnected(&mut self) {
        self.reporter.disconnect_received();
        self.spawn_finish(None);
    }

    /// Waits for every probe and finish task started so far.
    pub async fn settle(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(error) = joined {
                debug!(target: ROUTER_TARGET, error = %error, "router task failed");
            }
        }
    }

    /// Collects tasks that have already completed.
    pub fn reap(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            if let Err(error) = joined {
                debug!(target: ROUTER_TARGET, error = %error, "router task failed");
            }
        }
    }

    fn spawn_finish(&mut self, data: Option<TrackingEvent>) {
        let handshake = Arc::clone(&self.handshake);
        self.tasks.spawn(async move {
            let outcome = handshake.request_finish(data).await;
            debug!(target: ROUTER_TARGET, outcome = ?outcome, "finish request completed");
        });
    }
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("handshake", &self.handshake)
            .field("pending_tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}
