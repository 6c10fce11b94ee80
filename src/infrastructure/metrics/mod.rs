//! Prometheus metrics for template rendering, sending and send logging.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec, TextEncoder,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "appmail";

lazy_static! {
    /// Messages accepted by the transport
    pub static ref EMAILS_SENT_TOTAL: IntCounter = register_int_counter!(
        format!("{}_emails_sent_total", METRIC_PREFIX),
        "Total messages accepted by the mail transport"
    ).unwrap();

    /// Transport failures, including silenced ones
    pub static ref SEND_FAILURES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_send_failures_total", METRIC_PREFIX),
        "Total failed send attempts"
    ).unwrap();

    /// Logged message records written
    pub static ref MESSAGES_LOGGED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_logged_total", METRIC_PREFIX),
        "Total logged message records written"
    ).unwrap();

    /// Render failures by kind (not_found, syntax, fatal)
    pub static ref RENDER_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_render_errors_total", METRIC_PREFIX),
        "Total template render failures",
        &["kind"]
    ).unwrap();

    /// Logged message records removed by retention truncation
    pub static ref LOGS_TRUNCATED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_logs_truncated_total", METRIC_PREFIX),
        "Total logged message records truncated"
    ).unwrap();
}

/// Encode all registered metrics in the Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}
