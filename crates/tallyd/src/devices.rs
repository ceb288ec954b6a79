//! Device-management contract and the manifest-backed catalog.
//!
//! The probe borrows devices from a [`DeviceService`] for the duration of a
//! single preview event. Discovery and connection management belong to the
//! service; the worker only asks for the devices already known for a
//! platform and reads one file from each.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

const DEVICES_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::devices");

/// Mobile platform family.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub enum Platform {
    /// Android phones, tablets and emulators.
    Android,
    /// Apple iOS devices and simulators.
    Ios,
    /// Any platform the worker has no identity path for.
    Other(String),
}

impl Platform {
    /// Parses a platform name case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        if name.eq_ignore_ascii_case("android") {
            Self::Android
        } else if name.eq_ignore_ascii_case("ios") {
            Self::Ios
        } else {
            Self::Other(name.to_owned())
        }
    }

    /// Canonical display name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Android => "Android",
            Self::Ios => "iOS",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for Platform {
    fn from(name: String) -> Self {
        Self::parse(&name)
    }
}

impl From<&str> for Platform {
    fn from(name: &str) -> Self {
        Self::parse(name)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a connected device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    identifier: String,
    platform: Platform,
}

impl DeviceDescriptor {
    /// Builds a descriptor.
    #[must_use]
    pub fn new(identifier: impl Into<String>, platform: Platform) -> Self {
        Self {
            identifier: identifier.into(),
            platform,
        }
    }

    /// Device identifier as reported by the device service.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Platform family of the device.
    #[must_use]
    pub const fn platform(&self) -> &Platform {
        &self.platform
    }
}

/// Errors raised by devices and device services.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The device disappeared or refused the request.
    #[error("device '{identifier}' is unreachable")]
    Unreachable {
        /// Device identifier.
        identifier: String,
    },
    /// Reading a file from app-private storage failed.
    #[error("failed to read '{path}' from device '{identifier}': {source}")]
    FileRead {
        /// Device identifier.
        identifier: String,
        /// Resolved path of the file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: Arc<io::Error>,
    },
    /// The device service could not be initialised for a platform.
    #[error("failed to initialise devices for {platform}: {message}")]
    Initialise {
        /// Platform being initialised.
        platform: Platform,
        /// Human-readable reason.
        message: String,
    },
}

/// A device that exposes its app-private storage.
#[async_trait]
pub trait Device: Send + Sync {
    /// Describes the device.
    fn descriptor(&self) -> &DeviceDescriptor;

    /// Reads a text file stored by `app_identifier` on the device.
    async fn read_app_file(&self, path: &str, app_identifier: &str) -> Result<String, DeviceError>;
}

/// Options passed to [`DeviceService::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceInitOptions {
    /// Do not look for newly attached devices.
    pub skip_device_detection: bool,
    /// Do not boot an emulator or simulator when none is running.
    pub skip_emulator_start: bool,
}

impl DeviceInitOptions {
    /// Options used while probing: only devices that are already known.
    #[must_use]
    pub const fn probing() -> Self {
        Self {
            skip_device_detection: true,
            skip_emulator_start: true,
        }
    }
}

/// Device-management collaborator.
#[async_trait]
pub trait DeviceService: Send + Sync {
    /// Prepares the service for `platform`.
    async fn initialize(
        &self,
        platform: &Platform,
        options: DeviceInitOptions,
    ) -> Result<(), DeviceError>;

    /// Devices currently known for `platform`.
    async fn devices_for_platform(
        &self,
        platform: &Platform,
    ) -> Result<Vec<Arc<dyn Device>>, DeviceError>;
}

/// Device whose app-private storage is a directory on the local filesystem.
///
/// A file `path` stored by `app_identifier` lives at
/// `<storage_root>/<app_identifier>/<path>`, with any leading `/` removed
/// from `path`.
#[derive(Debug, Clone)]
pub struct LocalDevice {
    descriptor: DeviceDescriptor,
    storage_root: PathBuf,
}

impl LocalDevice {
    /// Builds a device rooted at `storage_root`.
    #[must_use]
    pub fn new(descriptor: DeviceDescriptor, storage_root: impl Into<PathBuf>) -> Self {
        Self {
            descriptor,
            storage_root: storage_root.into(),
        }
    }

    fn resolve(&self, path: &str, app_identifier: &str) -> PathBuf {
        self.storage_root
            .join(app_identifier)
            .join(path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Device for LocalDevice {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    async fn read_app_file(&self, path: &str, app_identifier: &str) -> Result<String, DeviceError> {
        let resolved = self.resolve(path, app_identifier);
        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|source| DeviceError::FileRead {
                identifier: self.descriptor.identifier.clone(),
                path: resolved,
                source: Arc::new(source),
            })
    }
}

/// Static device list loaded from the bootstrap manifest.
#[derive(Clone, Default)]
pub struct DeviceCatalog {
    devices: Vec<Arc<dyn Device>>,
}

impl DeviceCatalog {
    /// Builds a catalog from already constructed devices.
    #[must_use]
    pub fn new(devices: Vec<Arc<dyn Device>>) -> Self {
        Self { devices }
    }
}

impl fmt::Debug for DeviceCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let identifiers: Vec<&str> = self
            .devices
            .iter()
            .map(|device| device.descriptor().identifier())
            .collect();
        f.debug_struct("DeviceCatalog")
            .field("devices", &identifiers)
            .finish()
    }
}

#[async_trait]
impl DeviceService for DeviceCatalog {
    async fn initialize(
        &self,
        platform: &Platform,
        options: DeviceInitOptions,
    ) -> Result<(), DeviceError> {
        debug!(
            target: DEVICES_TARGET,
            platform = %platform,
            skip_device_detection = options.skip_device_detection,
            skip_emulator_start = options.skip_emulator_start,
            "device catalog initialised"
        );
        Ok(())
    }

    async fn devices_for_platform(
        &self,
        platform: &Platform,
    ) -> Result<Vec<Arc<dyn Device>>, DeviceError> {
        Ok(self
            .devices
            .iter()
            .filter(|device| device.descriptor().platform() == platform)
            .cloned()
            .collect())
    }
}
