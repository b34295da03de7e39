//! Origin filtering and the forward call.

use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::RelayConfig;
use crate::error::ForwardError;
use crate::message::{Message, CORRELATION_ID_HTTP_HEADER};
use crate::sink::HttpSink;

const HTTP_OK: u16 = 200;

/// Decides per message whether to relay it, and relays it.
pub struct RelayPolicy<K: HttpSink> {
    sink: K,
    config: RelayConfig,
}

impl<K: HttpSink> RelayPolicy<K> {
    pub fn new(config: RelayConfig, sink: K) -> Self {
        if config.origin_filter.is_empty() {
            info!("No origin filter configured, all messages will be relayed");
        } else {
            info!(origin = %config.origin_filter, "Relaying messages from a single origin");
        }
        Self { sink, config }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Whether `message` passes the origin filter.
    ///
    /// `forward` answers `Ok(())` both for relayed and for filtered-out
    /// messages; ask here first when the two must be told apart.
    pub fn admits(&self, message: &Message) -> bool {
        self.config.origin_filter.is_empty() || message.origin() == self.config.origin_filter
    }

    /// Relay one message to the configured endpoint.
    ///
    /// - filtered out by origin: `Ok(())`, and the sink is never called
    /// - sink transport failure: `Err(ForwardError::Sink)` with the sink's error as-is
    /// - any status other than 200: `Err(ForwardError::UnexpectedStatus)`
    /// - 200: `Ok(())`
    ///
    /// Nothing is retried.
    pub async fn forward(
        &self,
        shutdown: &CancellationToken,
        message: &Message,
    ) -> Result<(), ForwardError> {
        if !self.admits(message) {
            debug!(origin = %message.origin(), "Message origin discarded");
            return Ok(());
        }

        let mut headers = HashMap::with_capacity(1);
        headers.insert(
            CORRELATION_ID_HTTP_HEADER.to_string(),
            message.correlation_id().to_string(),
        );

        let resp = self
            .sink
            .post(
                shutdown,
                message.content.clone(),
                &headers,
                &self.config.endpoint,
            )
            .await?;

        if resp.status != HTTP_OK {
            debug!(
                status = resp.status,
                body = %String::from_utf8_lossy(&resp.body),
                "Downstream rejected message"
            );
            return Err(ForwardError::UnexpectedStatus {
                status: resp.status,
            });
        }

        info!(
            status = resp.status,
            correlation_id = %message.correlation_id(),
            routing_id = %message.routing_id(),
            "API response status"
        );
        Ok(())
    }
}
