//! Worker entry point and event loop.

use std::ffi::OsString;
use std::sync::Arc;

use tally_config::Config;
use tally_types::BrokerMessage;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tracing::warn;

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::channel::{ParentChannel, StdioChannel};
use crate::devices::DeviceService;
use crate::errors::LaunchError;
use crate::handshake::{FinishHandshake, HandshakeState};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::probe::DeviceProbe;
use crate::queue::DeliveryQueue;
use crate::router::MessageRouter;
use crate::sink::AnalyticsSink;

const RUNTIME_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::runtime");

/// External collaborators the relay depends on.
#[derive(Clone)]
pub struct Collaborators {
    /// Destination for tracking events.
    pub sink: Arc<dyn AnalyticsSink>,
    /// Device-management service used by the preview probe.
    pub devices: Arc<dyn DeviceService>,
    /// Lifecycle logging collaborator.
    pub reporter: Arc<dyn HealthReporter>,
}

/// Fully wired relay, ready to serve a parent channel.
pub struct Relay {
    router: MessageRouter,
    state: watch::Receiver<HandshakeState>,
    reporter: Arc<dyn HealthReporter>,
}

impl Relay {
    /// Wires the queue, probe, handshake and router.
    ///
    /// Must be called from within a tokio runtime: the delivery consumer is
    /// spawned immediately.
    #[must_use]
    pub fn assemble(config: &Config, collaborators: Collaborators) -> Self {
        let Collaborators {
            sink,
            devices,
            reporter,
        } = collaborators;
        let queue = DeliveryQueue::spawn(sink, Arc::clone(&reporter), config.send_timeout());
        let probe = DeviceProbe::new(devices, queue.clone(), Arc::clone(&reporter));
        let handshake = Arc::new(FinishHandshake::new(
            queue.clone(),
            config.grace_period(),
            Arc::clone(&reporter),
        ));
        let state = handshake.subscribe();
        let router = MessageRouter::new(queue, probe, handshake, Arc::clone(&reporter));
        Self {
            router,
            state,
            reporter,
        }
    }

    /// Signals readiness, then routes messages until the handshake
    /// terminates, and finally closes the channel.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Channel`] when the readiness signal cannot be
    /// written. Later channel failures are treated as a disconnect.
    pub async fn serve<R, W>(mut self, channel: &mut ParentChannel<R, W>) -> Result<(), LaunchError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        self.reporter.readiness_sending();
        channel.send(BrokerMessage::ReadyToReceive).await?;

        let mut connected = true;
        loop {
            if *self.state.borrow_and_update() == HandshakeState::Terminated {
                break;
            }
            tokio::select! {
                received = channel.recv(), if connected => match received {
                    Ok(Some(event)) => self.router.route(event),
                    Ok(None) => {
                        connected = false;
                        self.router.disconnected();
                    }
                    Err(error) => {
                        warn!(target: RUNTIME_TARGET, error = %error, "parent channel read failed");
                        connected = false;
                        self.router.disconnected();
                    }
                },
                changed = self.state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        if let Err(error) = channel.close().await {
            warn!(target: RUNTIME_TARGET, error = %error, "failed to close parent channel");
        }
        Ok(())
    }
}

/// Runs the worker with the production collaborators.
///
/// # Errors
///
/// Returns a [`LaunchError`] when startup fails or readiness cannot be sent.
pub fn run_worker(args: &[OsString]) -> Result<(), LaunchError> {
    let reporter: Arc<dyn HealthReporter> = Arc::new(StructuredHealthReporter::new());
    run_worker_with(&SystemConfigLoader, reporter, args)
}

/// Runs the worker over standard streams with the given loader and reporter.
///
/// # Errors
///
/// Returns a [`LaunchError`] when startup fails or readiness cannot be sent.
pub fn run_worker_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    args: &[OsString],
) -> Result<(), LaunchError> {
    let bootstrap = bootstrap_with(loader, reporter.as_ref(), args)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|source| LaunchError::Runtime { source })
        .inspect_err(|error| reporter.bootstrap_failed(error))?;

    let collaborators = bootstrap.manifest().collaborators(Arc::clone(&reporter));
    let result = runtime.block_on(async {
        let relay = Relay::assemble(bootstrap.config(), collaborators);
        let mut channel = StdioChannel::stdio();
        relay.serve(&mut channel).await
    });
    // Standard input is read on a blocking thread that cannot be joined.
    runtime.shutdown_background();
    result
}
