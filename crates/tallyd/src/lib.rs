//! Out-of-process analytics relay.
//!
//! `tallyd` is spawned by a parent process that produces tracking events. The
//! parent writes one JSON document per line to the worker's standard input;
//! the worker answers once with `"BrokerReadyToReceive"` on standard output
//! and from then on forwards every event, in order, to an analytics sink.
//!
//! The worker is organised around four collaborating pieces:
//!
//! 1. **Message router** ([`MessageRouter`]): classifies each inbound event
//!    and hands it to the queue, the device probe or the finish handshake.
//! 2. **Delivery queue** ([`DeliveryQueue`]): a single consumer task that owns
//!    the sink, so sends complete one at a time in submission order.
//! 3. **Device probe** ([`DeviceProbe`]): enriches preview events with the
//!    identifier stored on each connected device. Failures are contained to
//!    the device that produced them.
//! 4. **Finish handshake** ([`FinishHandshake`]): reconciles a `Finish`
//!    message from the parent with a bare disconnect. A disconnect that was
//!    not preceded by `Finish` waits for a grace period before draining, so
//!    messages still in flight can land.
//!
//! Collaborators (logging, the sink, device management) are passed in
//! explicitly. The production binary resolves them from the bootstrap
//! manifest named on its command line; see [`BootstrapManifest`].

mod bootstrap;
mod channel;
pub mod devices;
mod errors;
mod handshake;
mod health;
mod manifest;
pub mod probe;
mod queue;
mod router;
mod runtime;
pub mod sink;
mod telemetry;

pub use bootstrap::{
    Bootstrap, ConfigLoader, LaunchArgs, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use channel::{ChannelError, ParentChannel, StdioChannel};
pub use devices::{
    Device, DeviceCatalog, DeviceDescriptor, DeviceError, DeviceInitOptions, DeviceService,
    LocalDevice, Platform,
};
pub use errors::LaunchError;
pub use handshake::{FinishHandshake, FinishOutcome, HandshakeState};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use manifest::{BootstrapManifest, DeviceManifest, ManifestError, SinkManifest};
pub use probe::{DeviceProbe, ProbeError, ProbeSummary};
pub use queue::{DeliveryError, DeliveryQueue, DeliveryTicket};
pub use router::MessageRouter;
pub use runtime::{Collaborators, Relay, run_worker, run_worker_with};
pub use sink::{AnalyticsSink, SinkError, SpoolSink};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
