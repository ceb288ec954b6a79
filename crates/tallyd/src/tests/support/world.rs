//! BDD test world: a relay wired to recording doubles and driven by a
//! scripted parent over an in-memory channel.
//!
//! The runtime uses a paused clock, so grace periods and latencies elapse
//! instantly while keeping their relative order.

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use tally_config::Config;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::runtime::Runtime;
use tokio::time::Instant;

use crate::bootstrap::{Bootstrap, ConfigLoader, bootstrap_with};
use crate::channel::ParentChannel;
use crate::errors::LaunchError;
use crate::runtime::{Collaborators, Relay};

use super::config_loader::{FailingConfigLoader, TestConfigLoader};
use super::devices::FakeDeviceService;
use super::reporter::RecordingHealthReporter;
use super::sink::RecordingSink;

/// One step of the scripted parent.
#[derive(Debug, Clone)]
pub enum ParentAction {
    /// Write one JSON line to the worker.
    Send(String),
    /// Let the worker run for a while.
    Pause(Duration),
    /// Close the parent's writing side.
    Disconnect,
}

/// What the parent observed during a session.
#[derive(Debug, Default)]
pub struct SessionTranscript {
    /// Lines the worker wrote, in order.
    pub outbound: Vec<String>,
    /// Whether the worker closed its side of the channel.
    pub closed_by_worker: bool,
    /// Time between the parent's disconnect and the relay stopping.
    pub stopped_after_disconnect: Option<Duration>,
    /// Error returned by the relay, if any.
    pub error: Option<String>,
}

/// Scenario world shared across BDD steps.
pub struct TestWorld {
    runtime: Runtime,
    pub config: Config,
    pub reporter: Arc<RecordingHealthReporter>,
    pub sink: Arc<RecordingSink>,
    pub devices: Arc<FakeDeviceService>,
    script: Vec<ParentAction>,
    write_before_readiness: bool,
    usage_sent: usize,
    transcript: Option<SessionTranscript>,
    workspace: TempDir,
    loader: Box<dyn ConfigLoader>,
    bootstrap_result: Option<Result<Bootstrap, LaunchError>>,
}

impl TestWorld {
    /// Builds a world with default configuration and empty doubles.
    #[must_use]
    pub fn new() -> Self {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .expect("failed to build test runtime");
        Self {
            runtime,
            config: Config::default(),
            reporter: Arc::new(RecordingHealthReporter::default()),
            sink: Arc::new(RecordingSink::default()),
            devices: Arc::new(FakeDeviceService::default()),
            script: Vec::new(),
            write_before_readiness: false,
            usage_sent: 0,
            transcript: None,
            workspace: TempDir::new().expect("failed to create workspace directory"),
            loader: Box::new(TestConfigLoader::default()),
            bootstrap_result: None,
        }
    }

    /// Appends a step to the parent's script.
    pub fn script(&mut self, action: ParentAction) {
        self.script.push(action);
    }

    /// Makes the parent play its script before reading anything, so its
    /// first lines may arrive before the worker has announced readiness.
    pub fn write_before_readiness(&mut self) {
        self.write_before_readiness = true;
    }

    /// Appends a JSON message to the parent's script.
    pub fn send(&mut self, message: serde_json::Value) {
        self.script(ParentAction::Send(message.to_string()));
    }

    /// Appends `count` numbered usage events to the parent's script.
    pub fn send_usage(&mut self, count: usize) {
        for _ in 0..count {
            let index = self.usage_sent;
            self.send(serde_json::json!({ "type": format!("usage-{index}") }));
            self.usage_sent += 1;
        }
    }

    /// Type tags of every usage event scripted so far.
    #[must_use]
    pub fn expected_usage(&self) -> Vec<String> {
        (0..self.usage_sent)
            .map(|index| format!("usage-{index}"))
            .collect()
    }

    /// Runs the relay against the scripted parent until the relay stops.
    pub fn run_session(&mut self) {
        let config = self.config.clone();
        let collaborators = Collaborators {
            sink: self.sink.clone(),
            devices: self.devices.clone(),
            reporter: self.reporter.clone(),
        };
        let script = std::mem::take(&mut self.script);
        let wait_for_readiness = !self.write_before_readiness;

        let transcript = self.runtime.block_on(async move {
            let (parent, worker) = tokio::io::duplex(64 * 1024);
            let (worker_reader, worker_writer) = tokio::io::split(worker);
            let mut channel = ParentChannel::new(worker_reader, worker_writer);
            let relay = Relay::assemble(&config, collaborators);

            let serve = async {
                let result = relay.serve(&mut channel).await;
                (result, Instant::now())
            };
            let ((result, stopped_at), (mut transcript, disconnected_at)) =
                tokio::join!(serve, drive_parent(parent, script, wait_for_readiness));

            transcript.error = result.err().map(|error| error.to_string());
            transcript.stopped_after_disconnect =
                disconnected_at.map(|at| stopped_at.saturating_duration_since(at));
            transcript
        });
        self.transcript = Some(transcript);
    }

    /// Transcript of the last session.
    #[must_use]
    pub fn transcript(&self) -> &SessionTranscript {
        self.transcript
            .as_ref()
            .expect("no session has been run")
    }

    /// Writes a bootstrap manifest into the scenario workspace.
    pub fn write_manifest(&self, content: &str) {
        std::fs::write(self.manifest_path(), content).expect("failed to write manifest");
    }

    /// Installs a loader that always fails.
    pub fn use_failing_loader(&mut self) {
        self.loader = Box::new(FailingConfigLoader);
    }

    /// Runs the bootstrap sequence with the given positional arguments.
    pub fn bootstrap(&mut self, positionals: &[OsString]) {
        let mut args = vec![OsString::from("tallyd")];
        args.extend_from_slice(positionals);
        let result = bootstrap_with(self.loader.as_ref(), self.reporter.as_ref(), &args);
        self.bootstrap_result = Some(result);
    }

    /// Path where [`Self::write_manifest`] stores the manifest.
    #[must_use]
    pub fn manifest_path(&self) -> std::path::PathBuf {
        self.workspace.path().join("bootstrap.json")
    }

    /// Result of the last bootstrap.
    #[must_use]
    pub fn bootstrap_result(&self) -> &Result<Bootstrap, LaunchError> {
        self.bootstrap_result
            .as_ref()
            .expect("bootstrap has not run")
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

async fn drive_parent(
    parent: DuplexStream,
    script: Vec<ParentAction>,
    wait_for_readiness: bool,
) -> (SessionTranscript, Option<Instant>) {
    let (reader, mut writer) = tokio::io::split(parent);
    let mut lines = BufReader::new(reader).lines();
    let mut transcript = SessionTranscript::default();
    let mut disconnected_at = None;

    if wait_for_readiness {
        if let Ok(Some(line)) = lines.next_line().await {
            transcript.outbound.push(line);
        }
    }

    for action in script {
        match action {
            ParentAction::Send(line) => {
                writer
                    .write_all(format!("{line}\n").as_bytes())
                    .await
                    .expect("failed to write to worker");
            }
            ParentAction::Pause(duration) => tokio::time::sleep(duration).await,
            ParentAction::Disconnect => {
                writer
                    .shutdown()
                    .await
                    .expect("failed to close parent writer");
                disconnected_at = Some(Instant::now());
            }
        }
    }

    while let Ok(Some(line)) = lines.next_line().await {
        transcript.outbound.push(line);
    }
    transcript.closed_by_worker = true;
    (transcript, disconnected_at)
}

/// Builds a fresh world for each scenario.
#[must_use]
pub fn world() -> std::cell::RefCell<TestWorld> {
    std::cell::RefCell::new(TestWorld::new())
}
