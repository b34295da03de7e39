use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("failed to create consumer: {0}")]
    ConnectionFailed(String),
    #[error("failed to subscribe to topic {topic}: {reason}")]
    SubscribeFailed { topic: String, reason: String },
    #[error("failed to read message: {0}")]
    ReadFailed(String),
    /// Broker read failure, with the client error kept as the cause
    #[error("failed to read message: {source}")]
    Broker {
        #[source]
        source: KafkaError,
    },
    #[error("failed to close consumer: {0}")]
    CloseFailed(String),
}

impl SourceError {
    /// librdkafka error code, when the failure came from the broker client.
    pub fn kafka_code(&self) -> Option<RDKafkaErrorCode> {
        match self {
            SourceError::Broker { source } => source.rdkafka_error_code(),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SinkError {
    #[error("failed to create request: invalid url {0}")]
    InvalidUrl(String),
    #[error("failed to execute request: {0}")]
    Request(String),
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("request cancelled")]
    Cancelled,
}

/// Outcome of a single forward attempt that did not end in a 200.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForwardError {
    /// The sink failed at the transport level. Carried unmodified.
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("unexpected status code: {status}")]
    UnexpectedStatus { status: u16 },
}

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("queue source failed: {0}")]
    Source(#[from] SourceError),
    #[error("consume task panicked: {0}")]
    ConsumeTask(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("failed to build http client: {0}")]
    HttpClient(String),
}
