use serde::Serialize;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::RunnerError;
use crate::metrics::RelayMetrics;
use crate::policy::RelayPolicy;
use crate::sink::HttpSink;
use crate::source::QueueSource;

/// Capacity of the source→forwarder handoff. One slot keeps a slow sink
/// stalling the broker reads instead of buffering behind them.
const HANDOFF_CAPACITY: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerState {
    Idle,
    Running,
    Draining,
    Stopped,
}

/// Per-run message counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub forwarded: u64,
    pub filtered: u64,
    pub failed: u64,
}

/// Runner drives the consume → filter → forward pipeline
pub struct Runner<S: QueueSource + 'static, K: HttpSink> {
    source: S,
    policy: RelayPolicy<K>,
    metrics: RelayMetrics,
    state: watch::Sender<RunnerState>,
}

impl<S: QueueSource + 'static, K: HttpSink> Runner<S, K> {
    pub fn new(source: S, policy: RelayPolicy<K>, metrics: RelayMetrics) -> Self {
        let (state, _) = watch::channel(RunnerState::Idle);
        Self {
            source,
            policy,
            metrics,
            state,
        }
    }

    /// Returns a receiver that follows the runner's lifecycle state
    pub fn state(&self) -> watch::Receiver<RunnerState> {
        self.state.subscribe()
    }

    /// Run until the source stops, then close it.
    ///
    /// Forward failures are logged and the next message is taken. The source
    /// stops on `shutdown` or on its own failure; either way every message
    /// already handed off is still forwarded, then the source is closed once.
    /// A source failure is returned after that.
    pub async fn run(self, shutdown: CancellationToken) -> Result<RunSummary, RunnerError> {
        let Self {
            mut source,
            policy,
            metrics,
            state,
        } = self;

        let (tx, mut rx) = mpsc::channel(HANDOFF_CAPACITY);
        let consume_shutdown = shutdown.clone();
        let consumer = tokio::spawn(async move {
            let result = source.consume(consume_shutdown, tx).await;
            (source, result)
        });

        state.send_replace(RunnerState::Running);
        info!("Relay listening to queue");

        let mut summary = RunSummary::default();
        let mut draining = false;

        loop {
            let message = tokio::select! {
                message = rx.recv() => message,
                _ = shutdown.cancelled(), if !draining => {
                    info!("Shutting down, draining handoff channel");
                    draining = true;
                    state.send_replace(RunnerState::Draining);
                    continue;
                }
            };
            let Some(message) = message else { break };

            let admitted = policy.admits(&message);
            let started = Instant::now();
            match policy.forward(&shutdown, &message).await {
                Ok(()) if admitted => {
                    metrics.observe_forward_duration(started.elapsed().as_secs_f64());
                    metrics.inc_forwarded();
                    summary.forwarded += 1;
                }
                Ok(()) => {
                    metrics.inc_filtered();
                    summary.filtered += 1;
                }
                Err(e) => {
                    metrics.observe_forward_duration(started.elapsed().as_secs_f64());
                    metrics.inc_failed();
                    summary.failed += 1;
                    error!(error = %e, key = %message.key, "Failed to forward message");
                }
            }
        }

        if !draining {
            state.send_replace(RunnerState::Draining);
        }

        let result = match consumer.await {
            Ok((mut source, result)) => {
                if let Err(e) = &result {
                    metrics.inc_source_error();
                    error!(error = %e, "Failed to consume messages");
                }
                if let Err(e) = source.close().await {
                    error!(error = %e, "Failed to close queue source");
                }
                result.map_err(RunnerError::from)
            }
            Err(e) => {
                metrics.inc_source_error();
                error!(error = %e, "Consume task panicked, queue source not closed");
                Err(RunnerError::ConsumeTask(e.to_string()))
            }
        };

        state.send_replace(RunnerState::Stopped);
        info!(
            forwarded = summary.forwarded,
            filtered = summary.filtered,
            failed = summary.failed,
            "Relay stopped"
        );

        result.map(|()| summary)
    }
}
