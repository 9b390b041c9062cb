//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use crate::realtime::DisconnectReason;

use super::{
    CONNECTIONS_ACTIVE, CONNECTIONS_OPENED_TOTAL, CONNECT_ERRORS_TOTAL, DISCONNECTS_TOTAL,
    EVENTS_DROPPED_TOTAL, EVENTS_EMITTED_TOTAL, RECONNECTS_EXHAUSTED_TOTAL,
    SERVER_EVENTS_RECEIVED_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording connection lifecycle metrics
pub struct LifecycleMetrics;

impl LifecycleMetrics {
    pub fn record_connected() {
        CONNECTIONS_OPENED_TOTAL.inc();
        CONNECTIONS_ACTIVE.inc();
    }

    pub fn record_disconnected(reason: DisconnectReason) {
        CONNECTIONS_ACTIVE.dec();
        DISCONNECTS_TOTAL.with_label_values(&[reason.as_str()]).inc();
    }

    pub fn record_connect_error() {
        CONNECT_ERRORS_TOTAL.inc();
    }

    pub fn record_reconnects_exhausted() {
        RECONNECTS_EXHAUSTED_TOTAL.inc();
    }
}

/// Helper struct for recording event traffic
pub struct EventMetrics;

impl EventMetrics {
    pub fn record_emitted(event: &str) {
        EVENTS_EMITTED_TOTAL.with_label_values(&[event]).inc();
    }

    /// Dropped because no session was established
    pub fn record_dropped_disconnected(event: &str) {
        EVENTS_DROPPED_TOTAL
            .with_label_values(&[event, "disconnected"])
            .inc();
    }

    /// Dropped because the outbound queue was full
    pub fn record_dropped_backpressure(event: &str) {
        EVENTS_DROPPED_TOTAL
            .with_label_values(&[event, "queue_full"])
            .inc();
    }

    pub fn record_server_event() {
        SERVER_EVENTS_RECEIVED_TOTAL.inc();
    }
}
