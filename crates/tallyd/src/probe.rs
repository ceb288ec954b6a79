//! Best-effort enrichment of preview events with device identifiers.
//!
//! A preview event names a platform. For every device known for that
//! platform the probe reads the preview app's identity file, appends the
//! stored identifier to a private copy of the event's label and forwards the
//! copy to the delivery queue. Devices are probed concurrently and
//! independently: a device that cannot be read is skipped without affecting
//! the others, and nothing is reported as an error.

use std::sync::Arc;

use serde_json::Value;
use tally_types::{EventShapeError, TrackingEvent};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::debug;

use crate::devices::{Device, DeviceError, DeviceInitOptions, DeviceService, Platform};
use crate::health::HealthReporter;
use crate::queue::{DeliveryError, DeliveryQueue};

const PROBE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::probe");

/// Application whose private storage holds the identity file.
pub const PREVIEW_APP_IDENTIFIER: &str = "org.nativescript.preview";

const ANDROID_IDENTITY_PATH: &str = "/sdcard/org.nativescript.preview/device.json";
const IOS_IDENTITY_PATH: &str = "Documents/device.json";
const IDENTITY_FIELD: &str = "id";

/// Location of the identity file for a platform, if it has one.
#[must_use]
pub const fn identity_file_path(platform: &Platform) -> Option<&'static str> {
    match platform {
        Platform::Android => Some(ANDROID_IDENTITY_PATH),
        Platform::Ios => Some(IOS_IDENTITY_PATH),
        Platform::Other(_) => None,
    }
}

/// Extracts the `id` field from identity file content.
///
/// # Errors
///
/// Fails when the content is not JSON or carries no string or numeric `id`.
pub fn parse_identity(content: &str) -> Result<String, ProbeError> {
    let document: Value = serde_json::from_str(content).map_err(ProbeError::MalformedIdentity)?;
    match document.get(IDENTITY_FIELD) {
        Some(Value::String(id)) => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(ProbeError::MissingIdentifier),
    }
}

/// Reasons a probe, or one device within it, produced nothing.
///
/// These never leave the probe; they are logged at debug level only.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The preview event did not name a platform.
    #[error("preview event has no platform")]
    MissingPlatform,
    /// The platform has no known identity file location.
    #[error("no identity file location for platform {0}")]
    UnsupportedPlatform(Platform),
    /// The device service or the device failed.
    #[error(transparent)]
    Device(#[from] DeviceError),
    /// The identity file is not valid JSON.
    #[error("identity file is not valid JSON: {0}")]
    MalformedIdentity(#[source] serde_json::Error),
    /// The identity file has no usable `id`.
    #[error("identity file has no id")]
    MissingIdentifier,
    /// The event label could not be extended.
    #[error(transparent)]
    Shape(#[from] EventShapeError),
    /// The enriched event was not accepted by the sink.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// Outcome of probing every device for one preview event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProbeSummary {
    /// Devices considered.
    pub devices: usize,
    /// Enriched events handed to the queue.
    pub forwarded: usize,
}

/// Queries devices for an identifier before forwarding preview events.
#[derive(Clone)]
pub struct DeviceProbe {
    devices: Arc<dyn DeviceService>,
    queue: DeliveryQueue,
    reporter: Arc<dyn HealthReporter>,
}

impl DeviceProbe {
    /// Builds a probe that forwards enriched events to `queue`.
    #[must_use]
    pub fn new(
        devices: Arc<dyn DeviceService>,
        queue: DeliveryQueue,
        reporter: Arc<dyn HealthReporter>,
    ) -> Self {
        Self {
            devices,
            queue,
            reporter,
        }
    }

    /// Probes all devices for `event`.
    ///
    /// Never fails: a probe that cannot start yields an empty summary and
    /// per-device failures only reduce `forwarded`.
    pub async fn run(&self, event: TrackingEvent) -> ProbeSummary {
        match self.probe_all(event).await {
            Ok(summary) => {
                debug!(
                    target: PROBE_TARGET,
                    devices = summary.devices,
                    forwarded = summary.forwarded,
                    "preview probe finished"
                );
                summary
            }
            Err(error) => {
                debug!(target: PROBE_TARGET, error = %error, "preview probe abandoned");
                ProbeSummary::default()
            }
        }
    }

    async fn probe_all(&self, event: TrackingEvent) -> Result<ProbeSummary, ProbeError> {
        let platform = Platform::parse(event.platform().ok_or(ProbeError::MissingPlatform)?);
        self.devices
            .initialize(&platform, DeviceInitOptions::probing())
            .await?;
        let devices = self.devices.devices_for_platform(&platform).await?;

        let mut summary = ProbeSummary {
            devices: devices.len(),
            forwarded: 0,
        };
        let mut tasks = JoinSet::new();
        for device in devices {
            let probe = self.clone();
            let copy = event.clone();
            tasks.spawn(async move { probe.enrich_and_forward(device.as_ref(), copy).await });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => summary.forwarded += 1,
                Ok(Err(error)) => {
                    debug!(target: PROBE_TARGET, error = %error, "device skipped");
                }
                Err(error) => {
                    debug!(target: PROBE_TARGET, error = %error, "device probe task failed");
                }
            }
        }
        Ok(summary)
    }

    async fn enrich_and_forward(
        &self,
        device: &dyn Device,
        mut event: TrackingEvent,
    ) -> Result<(), ProbeError> {
        let descriptor = device.descriptor();
        let path = identity_file_path(descriptor.platform())
            .ok_or_else(|| ProbeError::UnsupportedPlatform(descriptor.platform().clone()))?;
        let content = device.read_app_file(path, PREVIEW_APP_IDENTIFIER).await?;
        let identifier = parse_identity(&content)?;
        event.append_label_suffix(&identifier)?;

        self.reporter.preview_forwarding(descriptor, &event);
        self.queue.enqueue(event).wait().await?;
        Ok(())
    }
}
