//! Queue source capability and the broker polling loop.
//!
//! `BrokerSource` owns the consume loop; a `RecordReader` supplies records
//! from a concrete broker (`KafkaReader`) or from a script (`MemoryReader`).

pub mod kafka;
pub mod memory;

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SourceError;
use crate::message::Message;

pub use kafka::KafkaReader;
pub use memory::{MemoryReader, ReadStep};

/// Upper bound on a single broker poll, so cancellation is noticed promptly.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// A source of messages for the pipeline.
#[async_trait]
pub trait QueueSource: Send {
    /// Read until cancelled or failed, emitting each message on `messages`.
    ///
    /// Returns `Ok(())` when `shutdown` is cancelled. The sender is consumed,
    /// so the channel is closed on every return path.
    async fn consume(
        &mut self,
        shutdown: CancellationToken,
        messages: mpsc::Sender<Message>,
    ) -> Result<(), SourceError>;

    /// Release broker resources. Called once, after consumption has ended.
    async fn close(&mut self) -> Result<(), SourceError>;
}

/// Low-level broker access used by `BrokerSource`.
#[async_trait]
pub trait RecordReader: Send {
    fn subscribe(&mut self, topic: &str) -> Result<(), SourceError>;

    /// Wait at most `timeout` for the next record. `Ok(None)` means the poll
    /// timed out.
    async fn read(&mut self, timeout: Duration) -> Result<Option<Message>, SourceError>;

    fn close(&mut self) -> Result<(), SourceError>;
}

/// Subscribes once, then polls the reader until shutdown or a read failure.
pub struct BrokerSource<R: RecordReader> {
    reader: R,
    topic: String,
    poll_timeout: Duration,
}

impl<R: RecordReader> BrokerSource<R> {
    pub fn new(reader: R, topic: impl Into<String>) -> Self {
        Self {
            reader,
            topic: topic.into(),
            poll_timeout: POLL_TIMEOUT,
        }
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl<R: RecordReader> QueueSource for BrokerSource<R> {
    async fn consume(
        &mut self,
        shutdown: CancellationToken,
        messages: mpsc::Sender<Message>,
    ) -> Result<(), SourceError> {
        self.reader.subscribe(&self.topic)?;
        info!(topic = %self.topic, "Subscribed to topic");

        loop {
            let read = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!(topic = %self.topic, "Shutdown requested, stopping consumer");
                    return Ok(());
                }
                read = self.reader.read(self.poll_timeout) => read,
            };

            let message = match read? {
                Some(message) => message,
                None => continue,
            };

            debug!(
                key = %message.key,
                headers = ?message.headers,
                bytes = message.content.len(),
                "Message received from broker"
            );

            let key = message.key.clone();
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!(key = %key, "Shutdown requested during handoff, message dropped");
                    return Ok(());
                }
                sent = messages.send(message) => {
                    if sent.is_err() {
                        warn!(topic = %self.topic, "Message receiver dropped, stopping consumer");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        self.reader.close()
    }
}
