//! Analytics sink contract and the spool-file implementation.
//!
//! The sink's own transport is not the worker's concern: the delivery queue
//! only needs an async `send` that reports success or failure for a single
//! event. [`SpoolSink`] is the implementation used by the production binary;
//! it appends each event as one JSON line to a spool file that a separate
//! uploader can consume.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tally_types::TrackingEvent;
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Errors reported by analytics sinks.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The event could not be serialised.
    #[error("failed to serialise tracking event: {0}")]
    Serialise(#[source] serde_json::Error),
    /// Writing to the spool file failed.
    #[error("failed to write spool file '{path}': {source}")]
    Io {
        /// Spool file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: Arc<io::Error>,
    },
    /// The sink refused the event.
    #[error("sink rejected tracking event: {message}")]
    Rejected {
        /// Human-readable reason supplied by the sink.
        message: String,
    },
}

impl SinkError {
    /// Builds a rejection with the given reason.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }
}

/// Destination for tracking events.
///
/// Implementations are driven by a single consumer task, so `send` is never
/// called concurrently on the same sink by the worker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    /// Delivers one event.
    async fn send(&self, event: &TrackingEvent) -> Result<(), SinkError>;
}

/// Sink that appends events to a JSON-lines spool file.
#[derive(Debug, Clone)]
pub struct SpoolSink {
    path: PathBuf,
}

impl SpoolSink {
    /// Creates a sink writing to `path`. The file is created on first use.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the spool file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    fn io_error(&self, source: io::Error) -> SinkError {
        SinkError::Io {
            path: self.path.clone(),
            source: Arc::new(source),
        }
    }
}

#[async_trait]
impl AnalyticsSink for SpoolSink {
    async fn send(&self, event: &TrackingEvent) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(event).map_err(SinkError::Serialise)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|source| self.io_error(source))?;
        file.write_all(&line)
            .await
            .map_err(|source| self.io_error(source))?;
        file.flush().await.map_err(|source| self.io_error(source))
    }
}
