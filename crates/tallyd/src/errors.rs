//! Fatal startup errors for the worker process.
//!
//! Only these errors cross the process boundary: they abort the worker before
//! readiness is signalled. Everything that can go wrong afterwards is
//! contained by the component that hit it.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;

use crate::channel::ChannelError;
use crate::manifest::ManifestError;
use crate::telemetry::TelemetryError;

/// Errors surfaced while launching the worker.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// No bootstrap path was supplied on the command line.
    #[error("invalid path to bootstrap: no path supplied")]
    MissingBootstrapPath,
    /// The supplied bootstrap path does not exist.
    #[error("invalid path to bootstrap: '{path}' does not exist")]
    BootstrapNotFound {
        /// Path that was checked.
        path: PathBuf,
    },
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Config {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The bootstrap manifest could not be read or was malformed.
    #[error("failed to load bootstrap manifest: {source}")]
    Manifest {
        /// Underlying manifest error.
        #[source]
        source: ManifestError,
    },
    /// The async runtime could not be constructed.
    #[error("failed to start async runtime: {source}")]
    Runtime {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Writing to the parent channel failed.
    #[error("parent channel failed: {source}")]
    Channel {
        /// Underlying channel error.
        #[source]
        source: ChannelError,
    },
}

impl From<Arc<OrthoError>> for LaunchError {
    fn from(source: Arc<OrthoError>) -> Self {
        Self::Config { source }
    }
}

impl From<TelemetryError> for LaunchError {
    fn from(source: TelemetryError) -> Self {
        Self::Telemetry { source }
    }
}

impl From<ManifestError> for LaunchError {
    fn from(source: ManifestError) -> Self {
        Self::Manifest { source }
    }
}

impl From<ChannelError> for LaunchError {
    fn from(source: ChannelError) -> Self {
        Self::Channel { source }
    }
}
