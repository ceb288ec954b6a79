//! Structured health reporting for worker lifecycle events.
//!
//! The reporter is the worker's logging collaborator. Implementations must
//! never fail and never block: they are called inline from the router, the
//! delivery queue and the handshake.

use std::sync::Arc;

use tally_config::Config;
use tally_types::TrackingEvent;

use crate::devices::DeviceDescriptor;
use crate::errors::LaunchError;
use crate::queue::DeliveryError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before the startup sequence begins.
    fn bootstrap_starting(&self);

    /// Invoked when startup fails with a fatal error.
    fn bootstrap_failed(&self, error: &LaunchError);

    /// Invoked once configuration and telemetry are in place.
    fn worker_initialising(&self, config: &Config);

    /// Invoked immediately before the readiness signal is written.
    fn readiness_sending(&self);

    /// Invoked for every message read from the parent channel.
    fn message_received(&self, event: &TrackingEvent);

    /// Invoked when the parent channel reports end of stream.
    fn disconnect_received(&self);

    /// Invoked on every finish request, before idempotence is checked.
    fn finish_started(&self, finish_sent: bool, finish_received: bool);

    /// Invoked after the queue drained and the handshake terminated.
    fn tracking_finished(&self);

    /// Invoked when an enriched preview event is about to be queued.
    fn preview_forwarding(&self, device: &DeviceDescriptor, event: &TrackingEvent);

    /// Invoked when the sink rejected or timed out on an event.
    fn delivery_failed(&self, event: &TrackingEvent, error: &DeliveryError);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_failed(&self, error: &LaunchError) {
        (**self).bootstrap_failed(error);
    }

    fn worker_initialising(&self, config: &Config) {
        (**self).worker_initialising(config);
    }

    fn readiness_sending(&self) {
        (**self).readiness_sending();
    }

    fn message_received(&self, event: &TrackingEvent) {
        (**self).message_received(event);
    }

    fn disconnect_received(&self) {
        (**self).disconnect_received();
    }

    fn finish_started(&self, finish_sent: bool, finish_received: bool) {
        (**self).finish_started(finish_sent, finish_received);
    }

    fn tracking_finished(&self) {
        (**self).tracking_finished();
    }

    fn preview_forwarding(&self, device: &DeviceDescriptor, event: &TrackingEvent) {
        (**self).preview_forwarding(device, event);
    }

    fn delivery_failed(&self, event: &TrackingEvent, error: &DeliveryError) {
        (**self).delivery_failed(event, error);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting worker bootstrap"
        );
    }

    fn bootstrap_failed(&self, error: &LaunchError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "worker bootstrap failed"
        );
    }

    fn worker_initialising(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "worker_initialising",
            log_filter = %config.log_filter(),
            log_format = ?config.log_format(),
            grace_period_ms = config.grace_period_ms,
            send_timeout_ms = config.send_timeout_ms,
            "initialising analytics relay"
        );
    }

    fn readiness_sending(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "readiness_sending",
            "sending readiness signal to parent"
        );
    }

    fn message_received(&self, event: &TrackingEvent) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "message_received",
            kind = %event.kind(),
            payload = %event,
            "received message from parent"
        );
    }

    fn disconnect_received(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "disconnect_received",
            "parent channel disconnected"
        );
    }

    fn finish_started(&self, finish_sent: bool, finish_received: bool) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "finish_started",
            finish_sent,
            finish_received,
            "finish tracking started"
        );
    }

    fn tracking_finished(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "tracking_finished",
            "tracking finished"
        );
    }

    fn preview_forwarding(&self, device: &DeviceDescriptor, event: &TrackingEvent) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "preview_forwarding",
            device = %device.identifier(),
            platform = %device.platform(),
            payload = %event,
            "forwarding preview app data"
        );
    }

    fn delivery_failed(&self, event: &TrackingEvent, error: &DeliveryError) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "delivery_failed",
            kind = %event.kind(),
            error = %error,
            "sink did not accept tracking event"
        );
    }
}
