use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Headers;
use rdkafka::Message as _;
use tracing::{info, warn};

use crate::config::KafkaConfig;
use crate::error::SourceError;
use crate::message::Message;
use crate::source::RecordReader;

/// Kafka record reader backed by a `StreamConsumer`.
///
/// Offsets are auto-committed by librdkafka; the relay adds no delivery
/// guarantee on top of that.
pub struct KafkaReader {
    consumer: Option<StreamConsumer>,
}

impl KafkaReader {
    pub fn new(config: &KafkaConfig) -> Result<Self, SourceError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.broker)
            .set("group.id", &config.group_id)
            .set("auto.offset.reset", config.offset_reset.as_str())
            .set("enable.auto.commit", "true")
            .set("session.timeout.ms", "30000")
            .set("heartbeat.interval.ms", "3000")
            .create()
            .map_err(|e| SourceError::ConnectionFailed(e.to_string()))?;

        info!(
            broker = %config.broker,
            group_id = %config.group_id,
            offset_reset = config.offset_reset.as_str(),
            "Kafka consumer created"
        );

        Ok(Self {
            consumer: Some(consumer),
        })
    }

    fn consumer(&self) -> Result<&StreamConsumer, SourceError> {
        self.consumer
            .as_ref()
            .ok_or_else(|| SourceError::ReadFailed("consumer closed".to_string()))
    }
}

#[async_trait]
impl RecordReader for KafkaReader {
    fn subscribe(&mut self, topic: &str) -> Result<(), SourceError> {
        let subscribe_failed = |reason: String| SourceError::SubscribeFailed {
            topic: topic.to_string(),
            reason,
        };
        self.consumer
            .as_ref()
            .ok_or_else(|| subscribe_failed("consumer closed".to_string()))?
            .subscribe(&[topic])
            .map_err(|e| subscribe_failed(e.to_string()))
    }

    async fn read(&mut self, timeout: Duration) -> Result<Option<Message>, SourceError> {
        let consumer = self.consumer()?;
        let received = match tokio::time::timeout(timeout, consumer.recv()).await {
            Ok(received) => received,
            Err(_elapsed) => return Ok(None),
        };

        match received {
            Ok(record) => {
                let headers = record
                    .headers()
                    .map(|h| {
                        h.iter()
                            .map(|header| (header.key, header.value))
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default();
                Ok(Some(to_message(record.key(), record.payload(), headers)))
            }
            Err(e) if is_poll_timeout(&e) => Ok(None),
            Err(e) => Err(SourceError::Broker { source: e }),
        }
    }

    fn close(&mut self) -> Result<(), SourceError> {
        match self.consumer.take() {
            Some(consumer) => {
                consumer.unsubscribe();
                info!("Kafka consumer closed");
                Ok(())
            }
            None => {
                warn!("Kafka consumer already closed");
                Ok(())
            }
        }
    }
}

/// Broker-side timeouts mean "nothing yet", same as our own poll deadline.
fn is_poll_timeout(error: &KafkaError) -> bool {
    matches!(
        error.rdkafka_error_code(),
        Some(RDKafkaErrorCode::OperationTimedOut) | Some(RDKafkaErrorCode::RequestTimedOut)
    )
}

/// Build a `Message` from raw record parts. Keys and header values are
/// decoded lossily; a header without a value maps to the empty string.
fn to_message<'a>(
    key: Option<&[u8]>,
    payload: Option<&[u8]>,
    headers: impl IntoIterator<Item = (&'a str, Option<&'a [u8]>)>,
) -> Message {
    let headers: HashMap<String, String> = headers
        .into_iter()
        .map(|(name, value)| {
            let value = value
                .map(|v| String::from_utf8_lossy(v).into_owned())
                .unwrap_or_default();
            (name.to_string(), value)
        })
        .collect();

    Message {
        content: payload.map(Bytes::copy_from_slice).unwrap_or_default(),
        headers,
        key: key
            .map(|k| String::from_utf8_lossy(k).into_owned())
            .unwrap_or_default(),
    }
}
