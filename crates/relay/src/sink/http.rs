use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ConfigError, SinkError};
use crate::sink::{HttpSink, SinkResponse};

/// HTTP sink backed by a shared `reqwest::Client`.
pub struct ReqwestSink {
    http: Client,
    bearer_token: String,
    timeout: Duration,
}

impl ReqwestSink {
    /// Build a sink whose requests are bounded by `timeout`.
    /// `bearer_token` may be empty; the header is sent either way.
    pub fn new(bearer_token: impl Into<String>, timeout: Duration) -> Result<Self, ConfigError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            bearer_token: bearer_token.into(),
            timeout,
        })
    }

    fn map_error(&self, e: reqwest::Error) -> SinkError {
        if e.is_timeout() {
            SinkError::Timeout {
                timeout_ms: millis(self.timeout),
            }
        } else {
            SinkError::Request(e.to_string())
        }
    }
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl HttpSink for ReqwestSink {
    async fn post(
        &self,
        shutdown: &CancellationToken,
        payload: Bytes,
        headers: &HashMap<String, String>,
        url: &str,
    ) -> Result<SinkResponse, SinkError> {
        let url = reqwest::Url::parse(url).map_err(|e| SinkError::InvalidUrl(format!("{}: {}", url, e)))?;
        debug!(url = %url, bytes = payload.len(), "POST request");

        let mut request = self
            .http
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.bearer_token))
            .header(CONTENT_TYPE, "application/json");
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let exchange = async {
            let resp = request.body(payload).send().await.map_err(|e| self.map_error(e))?;
            let status = resp.status().as_u16();
            let body = resp.bytes().await.map_err(|e| self.map_error(e))?;
            Ok::<_, SinkError>(SinkResponse { status, body })
        };

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(SinkError::Cancelled),
            result = exchange => result,
        }
    }
}
