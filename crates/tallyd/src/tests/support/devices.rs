//! Fake devices and device service for probe scenarios.

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::devices::{
    Device, DeviceDescriptor, DeviceError, DeviceInitOptions, DeviceService, Platform,
};

/// What a fake device returns when asked for a file.
#[derive(Debug, Clone)]
pub enum FileResponse {
    /// The file exists with this content.
    Content(String),
    /// The device cannot be reached.
    Unreachable,
    /// The file does not exist.
    Missing,
}

/// Device that answers file reads from a canned response.
#[derive(Debug)]
pub struct FakeDevice {
    descriptor: DeviceDescriptor,
    response: FileResponse,
    latency: Duration,
    reads: Mutex<Vec<(String, String)>>,
}

impl FakeDevice {
    /// Device whose identity file holds `{"id": <id>}`.
    #[must_use]
    pub fn with_identity(identifier: &str, platform: Platform, id: &str) -> Self {
        Self::new(
            identifier,
            platform,
            FileResponse::Content(serde_json::json!({ "id": id }).to_string()),
        )
    }

    /// Device with an arbitrary response.
    #[must_use]
    pub fn new(identifier: &str, platform: Platform, response: FileResponse) -> Self {
        Self {
            descriptor: DeviceDescriptor::new(identifier, platform),
            response,
            latency: Duration::ZERO,
            reads: Mutex::new(Vec::new()),
        }
    }

    /// Delays every read by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// `(path, app identifier)` pairs requested so far.
    #[must_use]
    pub fn reads(&self) -> Vec<(String, String)> {
        self.reads.lock().expect("device mutex poisoned").clone()
    }
}

#[async_trait]
impl Device for FakeDevice {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    async fn read_app_file(&self, path: &str, app_identifier: &str) -> Result<String, DeviceError> {
        self.reads
            .lock()
            .expect("device mutex poisoned")
            .push((path.to_owned(), app_identifier.to_owned()));
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match &self.response {
            FileResponse::Content(content) => Ok(content.clone()),
            FileResponse::Unreachable => Err(DeviceError::Unreachable {
                identifier: self.descriptor.identifier().to_owned(),
            }),
            FileResponse::Missing => Err(DeviceError::FileRead {
                identifier: self.descriptor.identifier().to_owned(),
                path: PathBuf::from(path),
                source: Arc::new(io::Error::from(io::ErrorKind::NotFound)),
            }),
        }
    }
}

/// Device service over a fixed list of fake devices.
#[derive(Debug, Default)]
pub struct FakeDeviceService {
    devices: Mutex<Vec<Arc<FakeDevice>>>,
    initialisations: Mutex<Vec<(Platform, DeviceInitOptions)>>,
    fail_initialise: Mutex<bool>,
}

impl FakeDeviceService {
    /// Adds a device to the service.
    pub fn add(&self, device: FakeDevice) -> Arc<FakeDevice> {
        let device = Arc::new(device);
        self.devices
            .lock()
            .expect("device service mutex poisoned")
            .push(Arc::clone(&device));
        device
    }

    /// Makes every initialisation fail.
    pub fn fail_initialise(&self) {
        *self
            .fail_initialise
            .lock()
            .expect("device service mutex poisoned") = true;
    }

    /// Initialisations requested so far.
    #[must_use]
    pub fn initialisations(&self) -> Vec<(Platform, DeviceInitOptions)> {
        self.initialisations
            .lock()
            .expect("device service mutex poisoned")
            .clone()
    }
}

#[async_trait]
impl DeviceService for FakeDeviceService {
    async fn initialize(
        &self,
        platform: &Platform,
        options: DeviceInitOptions,
    ) -> Result<(), DeviceError> {
        self.initialisations
            .lock()
            .expect("device service mutex poisoned")
            .push((platform.clone(), options));
        if *self
            .fail_initialise
            .lock()
            .expect("device service mutex poisoned")
        {
            return Err(DeviceError::Initialise {
                platform: platform.clone(),
                message: String::from("configured to fail"),
            });
        }
        Ok(())
    }

    async fn devices_for_platform(
        &self,
        platform: &Platform,
    ) -> Result<Vec<Arc<dyn Device>>, DeviceError> {
        Ok(self
            .devices
            .lock()
            .expect("device service mutex poisoned")
            .iter()
            .filter(|device| device.descriptor().platform() == platform)
            .map(|device| Arc::clone(device) as Arc<dyn Device>)
            .collect())
    }
}
