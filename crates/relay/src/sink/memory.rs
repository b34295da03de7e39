use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::SinkError;
use crate::sink::{HttpSink, SinkResponse};

/// A request as seen by `MemorySink`.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkCall {
    pub payload: Bytes,
    pub headers: HashMap<String, String>,
    pub url: String,
}

/// Recording sink for tests.
///
/// Answers from a scripted queue, then with `default_status` once the queue
/// is empty. Every call is recorded, including those answered with an error.
pub struct MemorySink {
    calls: Arc<Mutex<Vec<SinkCall>>>,
    responses: Mutex<VecDeque<Result<SinkResponse, SinkError>>>,
    default_status: u16,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_status(200)
    }

    pub fn with_status(default_status: u16) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            responses: Mutex::new(VecDeque::new()),
            default_status,
        }
    }

    /// Queue one answer for the next unanswered call.
    pub fn respond_with(self, response: Result<SinkResponse, SinkError>) -> Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(response);
        }
        self
    }

    /// Handle to the recorded calls, usable after the sink has been moved.
    pub fn calls(&self) -> Arc<Mutex<Vec<SinkCall>>> {
        Arc::clone(&self.calls)
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpSink for MemorySink {
    async fn post(
        &self,
        _shutdown: &CancellationToken,
        payload: Bytes,
        headers: &HashMap<String, String>,
        url: &str,
    ) -> Result<SinkResponse, SinkError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(SinkCall {
                payload,
                headers: headers.clone(),
                url: url.to_string(),
            });
        }

        let scripted = self
            .responses
            .lock()
            .ok()
            .and_then(|mut responses| responses.pop_front());

        scripted.unwrap_or_else(|| Ok(SinkResponse::new(self.default_status, Bytes::new())))
    }
}
