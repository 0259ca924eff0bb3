//! Prometheus metrics for the gossip pipeline.
//!
//! All metrics follow the naming convention: `radio_<area>_<metric>_total`
//!
//! ## Metrics Exported
//!
//! - `radio_messages_received_total` - Inbound envelopes handed to the pipeline
//! - `radio_messages_rejected_total` - Inbound envelopes dropped (by reason)
//! - `radio_attestations_stored_total` - Attestations accepted into the store
//! - `radio_reports_published_total` - Local reports gossiped
//! - `radio_deployments_unavailable_total` - Deployments skipped on a send tick
//! - `radio_divergences_detected_total` - Local values that lost to the majority
//! - `radio_cost_model_failures_total` - Failed cost model updates

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Registry holding every radio metric
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref MESSAGES_RECEIVED: IntCounter = IntCounter::new(
        "radio_messages_received_total",
        "Total number of inbound gossip envelopes"
    ).expect("metric creation failed");

    /// Rejections labeled by the gate that dropped the message
    pub static ref MESSAGES_REJECTED: IntCounterVec = IntCounterVec::new(
        Opts::new("radio_messages_rejected_total", "Total number of rejected gossip envelopes"),
        &["reason"]
    ).expect("metric creation failed");

    pub static ref ATTESTATIONS_STORED: IntCounter = IntCounter::new(
        "radio_attestations_stored_total",
        "Total number of attestations accepted into the store"
    ).expect("metric creation failed");

    pub static ref REPORTS_PUBLISHED: IntCounter = IntCounter::new(
        "radio_reports_published_total",
        "Total number of local reports published"
    ).expect("metric creation failed");

    pub static ref DEPLOYMENTS_UNAVAILABLE: IntCounter = IntCounter::new(
        "radio_deployments_unavailable_total",
        "Total number of deployments without a local value on a send tick"
    ).expect("metric creation failed");

    pub static ref DIVERGENCES_DETECTED: IntCounter = IntCounter::new(
        "radio_divergences_detected_total",
        "Total number of deployments diverging from the stake majority"
    ).expect("metric creation failed");

    pub static ref COST_MODEL_FAILURES: IntCounter = IntCounter::new(
        "radio_cost_model_failures_total",
        "Total number of failed cost model updates"
    ).expect("metric creation failed");
}

/// Register all radio metrics with [`REGISTRY`].
///
/// Calling this more than once is harmless.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(MESSAGES_RECEIVED.clone()),
        Box::new(MESSAGES_REJECTED.clone()),
        Box::new(ATTESTATIONS_STORED.clone()),
        Box::new(REPORTS_PUBLISHED.clone()),
        Box::new(DEPLOYMENTS_UNAVAILABLE.clone()),
        Box::new(DIVERGENCES_DETECTED.clone()),
        Box::new(COST_MODEL_FAILURES.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Record an inbound envelope
pub fn record_message_received() {
    MESSAGES_RECEIVED.inc();
}

/// Record a rejected envelope with reason
pub fn record_message_rejected(reason: &str) {
    MESSAGES_REJECTED.with_label_values(&[reason]).inc();
}

/// Record an attestation accepted into the store
pub fn record_attestation_stored() {
    ATTESTATIONS_STORED.inc();
}

/// Record a published local report
pub fn record_report_published() {
    REPORTS_PUBLISHED.inc();
}

/// Record a deployment skipped on a send tick
pub fn record_deployment_unavailable() {
    DEPLOYMENTS_UNAVAILABLE.inc();
}

/// Record a detected divergence
pub fn record_divergence() {
    DIVERGENCES_DETECTED.inc();
}

/// Record a failed cost model update
pub fn record_cost_model_failure() {
    COST_MODEL_FAILURES.inc();
}
