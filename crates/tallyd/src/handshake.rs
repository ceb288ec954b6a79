//! Finish handshake between the worker and its parent.
//!
//! Tracking ends either because the parent sent `Finish` or because the
//! channel dropped. Both paths converge on [`FinishHandshake::request_finish`],
//! which runs at most once:
//!
//! ```text
//! Idle ──request_finish──► FinishSent ──drain──► Terminated
//!                              │
//!                              └─ no peer Finish yet: sleep grace period first
//! ```
//!
//! State is published on a watch channel so the runtime can stop its loop
//! as soon as `Terminated` is reached.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tally_types::TrackingEvent;
use tokio::sync::watch;
use tracing::debug;

use crate::health::HealthReporter;
use crate::queue::DeliveryQueue;

const HANDSHAKE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::handshake");

/// Lifecycle of the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Tracking is in progress.
    Idle,
    /// A finish was requested; the queue is being drained.
    FinishSent,
    /// The queue drained and the worker may close the channel.
    Terminated,
}

/// Result of a call to [`FinishHandshake::request_finish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishOutcome {
    /// This call drove the handshake to `Terminated`.
    Terminated,
    /// Another call already started the finish; nothing was done.
    AlreadyFinishing,
}

/// Coordinates the orderly end of tracking.
pub struct FinishHandshake {
    state: watch::Sender<HandshakeState>,
    finish_received: AtomicBool,
    grace_period: Duration,
    queue: DeliveryQueue,
    reporter: Arc<dyn HealthReporter>,
}

impl FinishHandshake {
    /// Builds an idle handshake draining `queue` on finish.
    #[must_use]
    pub fn new(
        queue: DeliveryQueue,
        grace_period: Duration,
        reporter: Arc<dyn HealthReporter>,
    ) -> Self {
        let (state, _) = watch::channel(HandshakeState::Idle);
        Self {
            state,
            finish_received: AtomicBool::new(false),
            grace_period,
            queue,
            reporter,
        }
    }

    /// Receiver that observes every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<HandshakeState> {
        self.state.subscribe()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> HandshakeState {
        *self.state.borrow()
    }

    /// Records that the parent sent `Finish`.
    pub fn record_peer_finish(&self) {
        self.finish_received.store(true, Ordering::SeqCst);
    }

    /// Whether the parent has sent `Finish`.
    #[must_use]
    pub fn peer_finish_received(&self) -> bool {
        self.finish_received.load(Ordering::SeqCst)
    }

    /// Ends tracking, at most once.
    ///
    /// Without a prior peer `Finish` the grace period always elapses in full
    /// before the drain starts, even if `Finish` arrives meanwhile.
    pub async fn request_finish(&self, data: Option<TrackingEvent>) -> FinishOutcome {
        let peer_finished = self.peer_finish_received();
        self.reporter
            .finish_started(self.state() != HandshakeState::Idle, peer_finished);

        let started = self.state.send_if_modified(|state| {
            if *state == HandshakeState::Idle {
                *state = HandshakeState::FinishSent;
                true
            } else {
                false
            }
        });
        if !started {
            debug!(target: HANDSHAKE_TARGET, "finish already in progress");
            return FinishOutcome::AlreadyFinishing;
        }

        let payload = data.unwrap_or_else(TrackingEvent::finish);
        debug!(target: HANDSHAKE_TARGET, payload = %payload, "finish sent");

        if !peer_finished {
            debug!(
                target: HANDSHAKE_TARGET,
                grace_period_ms = self.grace_period.as_millis(),
                "waiting for in-flight messages"
            );
            tokio::time::sleep(self.grace_period).await;
        }

        self.queue.drain().await;
        self.reporter.tracking_finished();
        self.state.send_replace(HandshakeState::Terminated);
        FinishOutcome::Terminated
    }
}

impl std::fmt::Debug for FinishHandshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinishHandshake")
            .field("state", &self.state())
            .field("finish_received", &self.peer_finish_received())
            .field("grace_period", &self.grace_period)
            .finish_non_exhaustive()
    }
}
