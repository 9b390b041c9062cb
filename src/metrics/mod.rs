//! Prometheus metrics for the realtime client.
//!
//! - Connection lifecycle (opened sessions, disconnect reasons, handshake failures)
//! - Outbound events (emitted and dropped, by event name)
//! - Inbound server events

mod helpers;

pub use helpers::{encode_metrics, EventMetrics, LifecycleMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "storefront_realtime";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Sessions currently established
    pub static ref CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_connections_active", METRIC_PREFIX),
        "Number of established realtime sessions"
    ).unwrap();

    /// Sessions established since start
    pub static ref CONNECTIONS_OPENED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_connections_opened_total", METRIC_PREFIX),
        "Total realtime sessions established"
    ).unwrap();

    /// Session ends by reason
    pub static ref DISCONNECTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_disconnects_total", METRIC_PREFIX),
        "Total realtime session ends",
        &["reason"]
    ).unwrap();

    /// Failed connection attempts
    pub static ref CONNECT_ERRORS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_connect_errors_total", METRIC_PREFIX),
        "Total failed connection attempts"
    ).unwrap();

    /// Times the reconnection ceiling was reached
    pub static ref RECONNECTS_EXHAUSTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_reconnects_exhausted_total", METRIC_PREFIX),
        "Total times the reconnection attempt ceiling was reached"
    ).unwrap();

    // ============================================================================
    // Event Metrics
    // ============================================================================

    /// Outbound events written to the transport
    pub static ref EVENTS_EMITTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_emitted_total", METRIC_PREFIX),
        "Total outbound events written to the transport",
        &["event"]
    ).unwrap();

    /// Outbound events dropped (not connected or queue full)
    pub static ref EVENTS_DROPPED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_dropped_total", METRIC_PREFIX),
        "Total outbound events dropped before reaching the transport",
        &["event", "cause"]
    ).unwrap();

    /// Server-pushed events received
    pub static ref SERVER_EVENTS_RECEIVED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_server_events_received_total", METRIC_PREFIX),
        "Total events pushed by the server"
    ).unwrap();
}
