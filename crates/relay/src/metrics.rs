//! Prometheus metrics for the relay

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

const LABEL_INSTANCE: &str = "instance";
const LABEL_OUTCOME: &str = "outcome";

/// Messages taken off the handoff channel, by outcome
static MESSAGES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "anyker_relay_messages_total",
        "Messages handled by the relay, by outcome (forwarded, filtered, failed)",
        &[LABEL_INSTANCE, LABEL_OUTCOME]
    )
    .expect("Failed to register messages_total metric")
});

/// Forward call duration, filtered messages excluded
static FORWARD_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "anyker_relay_forward_duration_seconds",
        "Time spent in the downstream HTTP call",
        &[LABEL_INSTANCE],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to register forward_duration metric")
});

static SOURCE_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "anyker_relay_source_errors_total",
        "Queue source failures that stopped the pipeline",
        &[LABEL_INSTANCE]
    )
    .expect("Failed to register source_errors_total metric")
});

/// Metric handle bound to one relay instance name.
#[derive(Clone)]
pub struct RelayMetrics {
    instance: String,
}

impl RelayMetrics {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn inc_forwarded(&self) {
        self.inc_outcome("forwarded");
    }

    pub fn inc_filtered(&self) {
        self.inc_outcome("filtered");
    }

    pub fn inc_failed(&self) {
        self.inc_outcome("failed");
    }

    pub fn inc_source_error(&self) {
        SOURCE_ERRORS_TOTAL
            .with_label_values(&[self.instance.as_str()])
            .inc();
    }

    pub fn observe_forward_duration(&self, seconds: f64) {
        FORWARD_DURATION
            .with_label_values(&[self.instance.as_str()])
            .observe(seconds);
    }

    /// Messages this instance has finished handling, whatever the outcome.
    pub fn handled(&self) -> u64 {
        ["forwarded", "filtered", "failed"]
            .into_iter()
            .map(|outcome| {
                MESSAGES_TOTAL
                    .with_label_values(&[self.instance.as_str(), outcome])
                    .get()
            })
            .sum()
    }

    fn inc_outcome(&self, outcome: &str) {
        MESSAGES_TOTAL
            .with_label_values(&[self.instance.as_str(), outcome])
            .inc();
    }
}

/// Encode all registered metrics in Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to encode metrics as UTF-8: {}", e))
    })
}
