//! Ordered, one-at-a-time delivery of tracking events to the sink.
//!
//! Producers (the router, per-device probes, the handshake) submit work over
//! an unbounded channel. A single consumer task owns the sink and processes
//! submissions strictly in arrival order, so the sink never sees two sends in
//! flight and observes events in the order they were enqueued.
//!
//! ```text
//! Router ──┐
//! Probe  ──┼──► [unbounded channel] ──► consumer task ──► sink.send()
//! Drain  ──┘                                 └─► ticket resolved per event
//! ```
//!
//! A failed send resolves that event's ticket with an error and is reported
//! to the health reporter; the consumer then moves on to the next event.

use std::sync::Arc;
use std::time::Duration;

use tally_types::TrackingEvent;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::health::HealthReporter;
use crate::sink::{AnalyticsSink, SinkError};

const QUEUE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::queue");

/// Errors resolved on a [`DeliveryTicket`].
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The sink reported a failure.
    #[error("sink delivery failed: {source}")]
    Sink {
        /// Underlying sink error.
        #[source]
        source: SinkError,
    },
    /// The sink did not complete within the configured send timeout.
    #[error("sink delivery timed out after {timeout_ms}ms")]
    TimedOut {
        /// Configured timeout in milliseconds.
        timeout_ms: u128,
    },
    /// The consumer task is gone, so the event was never handed to the sink.
    #[error("delivery queue is closed")]
    QueueClosed,
}

enum Command {
    Deliver {
        event: TrackingEvent,
        done: oneshot::Sender<Result<(), DeliveryError>>,
    },
    Flush {
        done: oneshot::Sender<()>,
    },
}

/// Completion handle for a single enqueued event.
///
/// Dropping the ticket does not cancel the delivery.
#[must_use = "dropping a ticket discards the delivery result, not the delivery"]
#[derive(Debug)]
pub struct DeliveryTicket {
    receiver: Option<oneshot::Receiver<Result<(), DeliveryError>>>,
}

impl DeliveryTicket {
    /// Waits until the event has been processed by the sink.
    ///
    /// # Errors
    ///
    /// Returns the sink failure or timeout for this event, or
    /// [`DeliveryError::QueueClosed`] when the consumer has stopped.
    pub async fn wait(self) -> Result<(), DeliveryError> {
        let Some(receiver) = self.receiver else {
            return Err(DeliveryError::QueueClosed);
        };
        receiver
            .await
            .unwrap_or_else(|_| Err(DeliveryError::QueueClosed))
    }
}

/// Handle used to submit events to the delivery consumer.
///
/// Clones share the same consumer and therefore the same ordering.
#[derive(Debug, Clone)]
pub struct DeliveryQueue {
    sender: mpsc::UnboundedSender<Command>,
}

impl DeliveryQueue {
    /// Spawns the consumer task on the current runtime.
    ///
    /// The consumer runs until every queue handle has been dropped. When
    /// `send_timeout` is set, a send that exceeds it fails with
    /// [`DeliveryError::TimedOut`]; otherwise sends may wait indefinitely.
    #[must_use]
    pub fn spawn(
        sink: Arc<dyn AnalyticsSink>,
        reporter: Arc<dyn HealthReporter>,
        send_timeout: Option<Duration>,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let consumer = Consumer {
            sink,
            reporter,
            send_timeout,
        };
        tokio::spawn(consumer.run(receiver));
        Self { sender }
    }

    /// Submits an event behind everything already queued.
    pub fn enqueue(&self, event: TrackingEvent) -> DeliveryTicket {
        let (done, receiver) = oneshot::channel();
        let receiver = self
            .sender
            .send(Command::Deliver { event, done })
            .ok()
            .map(|()| receiver);
        DeliveryTicket { receiver }
    }

    /// Resolves once every event enqueued before this call has been processed.
    pub async fn drain(&self) {
        let (done, receiver) = oneshot::channel();
        if self.sender.send(Command::Flush { done }).is_err() {
            return;
        }
        // A dropped sender means the consumer stopped, which also means
        // nothing is left to wait for.
        drop(receiver.await);
    }
}

struct Consumer {
    sink: Arc<dyn AnalyticsSink>,
    reporter: Arc<dyn HealthReporter>,
    send_timeout: Option<Duration>,
}

impl Consumer {
    async fn run(self, mut receiver: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = receiver.recv().await {
            match command {
                Command::Deliver { event, done } => {
                    let result = self.deliver(&event).await;
                    if let Err(error) = &result {
                        self.reporter.delivery_failed(&event, error);
                    }
                    // The producer may have dropped its ticket.
                    drop(done.send(result));
                }
                Command::Flush { done } => {
                    drop(done.send(()));
                }
            }
        }
        debug!(target: QUEUE_TARGET, "delivery queue closed");
    }

    async fn deliver(&self, event: &TrackingEvent) -> Result<(), DeliveryError> {
        let send = self.sink.send(event);
        let outcome = match self.send_timeout {
            Some(limit) => match tokio::time::timeout(limit, send).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(DeliveryError::TimedOut {
                        timeout_ms: limit.as_millis(),
                    });
                }
            },
            None => send.await,
        };
        outcome.map_err(|source| DeliveryError::Sink { source })
    }
}
