//! Bootstrap manifest naming the worker's collaborators.
//!
//! The parent passes the manifest path as the first positional argument.
//! It selects the spool file used by the sink and the devices available to
//! the preview probe:
//!
//! ```json
//! {
//!   "sink": { "spool": "events.jsonl" },
//!   "devices": [
//!     { "identifier": "emulator-5554", "platform": "Android", "storage_root": "dev1" }
//!   ]
//! }
//! ```
//!
//! Relative paths are resolved against the manifest's directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::devices::{Device, DeviceCatalog, DeviceDescriptor, LocalDevice, Platform};
use crate::health::HealthReporter;
use crate::runtime::Collaborators;
use crate::sink::SpoolSink;

/// Errors raised while loading the bootstrap manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest file could not be read.
    #[error("failed to read bootstrap manifest '{path}': {source}")]
    Read {
        /// Manifest path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The manifest is not valid JSON or has the wrong shape.
    #[error("failed to parse bootstrap manifest '{path}': {source}")]
    Parse {
        /// Manifest path.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
    /// The manifest parsed but its contents are unusable.
    #[error("invalid bootstrap manifest: {message}")]
    Invalid {
        /// Description of the problem.
        message: String,
    },
}

/// Sink section of the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SinkManifest {
    /// JSON-lines file receiving tracking events.
    pub spool: PathBuf,
}

/// One device entry of the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceManifest {
    /// Device identifier.
    pub identifier: String,
    /// Platform family name.
    pub platform: Platform,
    /// Directory standing in for the device's app-private storage.
    pub storage_root: PathBuf,
}

/// Parsed bootstrap manifest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BootstrapManifest {
    /// Sink configuration.
    pub sink: SinkManifest,
    /// Devices known to the worker.
    #[serde(default)]
    pub devices: Vec<DeviceManifest>,
}

impl BootstrapManifest {
    /// Reads, parses and validates the manifest at `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`ManifestError`] when the file cannot be read, is not a
    /// valid manifest, or fails validation.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut manifest = Self::parse(&content).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(base) = path.parent() {
            manifest.resolve_relative_to(base);
        }
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parses manifest JSON without touching the filesystem.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`serde_json::Error`] on malformed input.
    pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Rejects manifests that cannot produce working collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Invalid`] for an empty spool path, an empty
    /// device identifier, or a duplicated device identifier.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.sink.spool.as_os_str().is_empty() {
            return Err(ManifestError::Invalid {
                message: String::from("sink spool path must not be empty"),
            });
        }
        let mut seen = std::collections::HashSet::new();
        for device in &self.devices {
            if device.identifier.trim().is_empty() {
                return Err(ManifestError::Invalid {
                    message: String::from("device identifier must not be empty"),
                });
            }
            if !seen.insert(device.identifier.as_str()) {
                return Err(ManifestError::Invalid {
                    message: format!("device '{}' is listed more than once", device.identifier),
                });
            }
        }
        Ok(())
    }

    /// Builds the production collaborators described by the manifest.
    #[must_use]
    pub fn collaborators(&self, reporter: Arc<dyn HealthReporter>) -> Collaborators {
        let devices: Vec<Arc<dyn Device>> = self
            .devices
            .iter()
            .map(|entry| {
                let descriptor =
                    DeviceDescriptor::new(entry.identifier.clone(), entry.platform.clone());
                Arc::new(LocalDevice::new(descriptor, entry.storage_root.clone()))
                    as Arc<dyn Device>
            })
            .collect();
        Collaborators {
            sink: Arc::new(SpoolSink::new(self.sink.spool.clone())),
            devices: Arc::new(DeviceCatalog::new(devices)),
            reporter,
        }
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        self.sink.spool = resolve(base, &self.sink.spool);
        for device in &mut self.devices {
            device.storage_root = resolve(base, &device.storage_root);
        }
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() || path.as_os_str().is_empty() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
