use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::SourceError;
use crate::message::Message;
use crate::source::RecordReader;

/// One scripted poll result.
#[derive(Debug, Clone)]
pub enum ReadStep {
    Message(Message),
    Timeout,
    Fail(String),
}

/// Scripted reader for tests and local runs.
///
/// Steps are replayed in order; once the script is exhausted every poll waits
/// out its timeout and reports nothing, like an idle topic.
pub struct MemoryReader {
    script: VecDeque<ReadStep>,
    subscribe_error: Option<String>,
    close_error: Option<String>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
}

impl MemoryReader {
    pub fn new(script: Vec<ReadStep>) -> Self {
        Self {
            script: script.into(),
            subscribe_error: None,
            close_error: None,
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn from_messages(messages: impl IntoIterator<Item = Message>) -> Self {
        Self::new(messages.into_iter().map(ReadStep::Message).collect())
    }

    pub fn fail_subscribe(mut self, reason: impl Into<String>) -> Self {
        self.subscribe_error = Some(reason.into());
        self
    }

    pub fn fail_close(mut self, reason: impl Into<String>) -> Self {
        self.close_error = Some(reason.into());
        self
    }

    /// Topics subscribed so far, shared with the reader.
    pub fn subscriptions(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.subscriptions)
    }

    /// Number of `close` calls, shared with the reader.
    pub fn close_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }
}

#[async_trait]
impl RecordReader for MemoryReader {
    fn subscribe(&mut self, topic: &str) -> Result<(), SourceError> {
        if let Some(reason) = &self.subscribe_error {
            return Err(SourceError::SubscribeFailed {
                topic: topic.to_string(),
                reason: reason.clone(),
            });
        }
        if let Ok(mut topics) = self.subscriptions.lock() {
            topics.push(topic.to_string());
        }
        Ok(())
    }

    async fn read(&mut self, timeout: Duration) -> Result<Option<Message>, SourceError> {
        match self.script.pop_front() {
            Some(ReadStep::Message(message)) => Ok(Some(message)),
            Some(ReadStep::Timeout) => Ok(None),
            Some(ReadStep::Fail(reason)) => Err(SourceError::ReadFailed(reason)),
            None => {
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
        }
    }

    fn close(&mut self) -> Result<(), SourceError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        match &self.close_error {
            Some(reason) => Err(SourceError::CloseFailed(reason.clone())),
            None => Ok(()),
        }
    }
}
