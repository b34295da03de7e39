//! HTTP sink capability.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use crate::error::SinkError;

pub use http::ReqwestSink;
pub use memory::{MemorySink, SinkCall};

/// A completed HTTP exchange. The caller judges the status.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkResponse {
    pub status: u16,
    pub body: Bytes,
}

impl SinkResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Delivers a payload to a downstream HTTP endpoint.
#[async_trait]
pub trait HttpSink: Send + Sync {
    /// POST `payload` to `url` with the given extra headers.
    ///
    /// An `Err` is a transport-level failure; any response that arrived is an
    /// `Ok`, whatever its status. Cancelling `shutdown` aborts the request.
    async fn post(
        &self,
        shutdown: &CancellationToken,
        payload: Bytes,
        headers: &HashMap<String, String>,
        url: &str,
    ) -> Result<SinkResponse, SinkError>;
}
