//! Test double for [`HealthReporter`] that records lifecycle events in order.
//!
//! Relay tests assert on the sequence as well as the presence of events, so
//! the recorder keeps them in the order they were reported.

use std::sync::Mutex;

use tally_config::Config;
use tally_types::TrackingEvent;

use crate::devices::DeviceDescriptor;
use crate::errors::LaunchError;
use crate::health::HealthReporter;
use crate::queue::DeliveryError;

/// Structured lifecycle events tracked during tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// Bootstrap started.
    BootstrapStarting,
    /// Bootstrap failed with an error description.
    BootstrapFailed(String),
    /// Configuration and telemetry were ready.
    WorkerInitialising,
    /// Readiness was about to be sent.
    ReadinessSending,
    /// A message arrived; carries its `type` tag.
    MessageReceived(String),
    /// The parent channel reached end of stream.
    DisconnectReceived,
    /// A finish request was made.
    FinishStarted {
        finish_sent: bool,
        finish_received: bool,
    },
    /// The queue drained and the handshake terminated.
    TrackingFinished,
    /// An enriched preview event was about to be queued.
    PreviewForwarding { device: String, label: String },
    /// The sink failed on an event.
    DeliveryFailed(String),
}

/// Records lifecycle events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<RelayEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<RelayEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    /// Counts events equal to `expected`.
    #[must_use]
    pub fn count(&self, expected: &RelayEvent) -> usize {
        self.events()
            .iter()
            .filter(|event| *event == expected)
            .count()
    }

    /// Position of the first event equal to `expected`.
    #[must_use]
    pub fn position(&self, expected: &RelayEvent) -> Option<usize> {
        self.events().iter().position(|event| event == expected)
    }

    fn record(&self, event: RelayEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(RelayEvent::BootstrapStarting);
    }

    fn bootstrap_failed(&self, error: &LaunchError) {
        self.record(RelayEvent::BootstrapFailed(error.to_string()));
    }

    fn worker_initialising(&self, _config: &Config) {
        self.record(RelayEvent::WorkerInitialising);
    }

    fn readiness_sending(&self) {
        self.record(RelayEvent::ReadinessSending);
    }

    fn message_received(&self, event: &TrackingEvent) {
        self.record(RelayEvent::MessageReceived(event.kind().to_string()));
    }

    fn disconnect_received(&self) {
        self.record(RelayEvent::DisconnectReceived);
    }

    fn finish_started(&self, finish_sent: bool, finish_received: bool) {
        self.record(RelayEvent::FinishStarted {
            finish_sent,
            finish_received,
        });
    }

    fn tracking_finished(&self) {
        self.record(RelayEvent::TrackingFinished);
    }

    fn preview_forwarding(&self, device: &DeviceDescriptor, event: &TrackingEvent) {
        self.record(RelayEvent::PreviewForwarding {
            device: device.identifier().to_owned(),
            label: event.label().unwrap_or_default().to_owned(),
        });
    }

    fn delivery_failed(&self, event: &TrackingEvent, error: &DeliveryError) {
        self.record(RelayEvent::DeliveryFailed(format!("{}: {error}", event.kind())));
    }
}
