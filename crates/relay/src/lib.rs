//! anyker-relay: Kafka to HTTP relay runtime components
//!
//! This crate provides the pieces of the relay pipeline: a queue source that
//! reads broker records, an origin filter, and an HTTP sink that posts each
//! admitted record downstream.

pub mod config;
pub mod error;
pub mod message;
pub mod metrics;
pub mod policy;
pub mod runner;
pub mod server;
pub mod shutdown;
pub mod sink;
pub mod source;

pub use config::{Config, KafkaConfig, OffsetReset, RelayConfig};
pub use error::{ConfigError, ForwardError, RunnerError, SinkError, SourceError};
pub use message::{split_key, Message};
pub use metrics::RelayMetrics;
pub use policy::RelayPolicy;
pub use runner::{RunSummary, Runner, RunnerState};
pub use server::{create_router, run_server, ServerState};
pub use shutdown::{cancel_on_signal, shutdown_signal};
pub use sink::{HttpSink, MemorySink, ReqwestSink, SinkResponse};
pub use source::{BrokerSource, KafkaReader, MemoryReader, QueueSource, ReadStep, RecordReader};
