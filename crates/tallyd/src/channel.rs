//! JSON-lines channel to the parent process.
//!
//! Each inbound line is one tracking event; each outbound line is one
//! [`BrokerMessage`]. End of stream on the reader is the parent's disconnect.

use std::io;

use tally_types::{BrokerMessage, TrackingEvent};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::warn;

const CHANNEL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::channel");

/// Errors raised by the parent channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Reading from the parent failed.
    #[error("failed to read from parent: {0}")]
    Read(#[source] io::Error),
    /// Writing to the parent failed.
    #[error("failed to write to parent: {0}")]
    Write(#[source] io::Error),
    /// An outbound message could not be encoded.
    #[error("failed to encode message for parent: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Bidirectional message link with the parent.
pub struct ParentChannel<R, W> {
    reader: BufReader<R>,
    line: Vec<u8>,
    writer: W,
}

/// Channel over the process's standard streams.
pub type StdioChannel = ParentChannel<tokio::io::Stdin, tokio::io::Stdout>;

impl StdioChannel {
    /// Channel reading standard input and writing standard output.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> ParentChannel<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wraps a reader and writer pair.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            line: Vec::new(),
            writer,
        }
    }

    /// Reads the next event, or `None` once the parent disconnects.
    ///
    /// Blank lines are ignored. Lines that are not JSON, including lines
    /// that are not valid UTF-8, are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Read`] when the underlying reader fails.
    pub async fn recv(&mut self) -> Result<Option<TrackingEvent>, ChannelError> {
        loop {
            // Partial lines stay buffered in `self.line` if this future is
            // dropped mid-read.
            self.reader
                .read_until(b'\n', &mut self.line)
                .await
                .map_err(ChannelError::Read)?;
            if self.line.is_empty() {
                return Ok(None);
            }
            let line = std::mem::take(&mut self.line);
            let trimmed = line.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }
            match TrackingEvent::parse(trimmed) {
                Ok(event) => return Ok(Some(event)),
                Err(error) => {
                    warn!(
                        target: CHANNEL_TARGET,
                        error = %error,
                        line = %String::from_utf8_lossy(trimmed),
                        "ignoring malformed message from parent"
                    );
                }
            }
        }
    }

    /// Writes one message and flushes.
    ///
    /// # Errors
    ///
    /// Fails when the message cannot be encoded or written.
    pub async fn send(&mut self, message: BrokerMessage) -> Result<(), ChannelError> {
        let mut line = serde_json::to_vec(&message).map_err(ChannelError::Encode)?;
        line.push(b'\n');
        self.writer
            .write_all(&line)
            .await
            .map_err(ChannelError::Write)?;
        self.writer.flush().await.map_err(ChannelError::Write)
    }

    /// Flushes and shuts down the outbound side.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Write`] when the shutdown fails.
    pub async fn close(&mut self) -> Result<(), ChannelError> {
        self.writer.flush().await.map_err(ChannelError::Write)?;
        self.writer.shutdown().await.map_err(ChannelError::Write)
    }
}
