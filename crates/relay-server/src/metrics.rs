//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus recorder as the global `metrics` recorder.
///
/// Call once at startup before any metric is recorded. The returned handle
/// renders the `/metrics` endpoint.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Handle backed by a recorder that is not installed globally. Metrics
/// recorded through the `metrics` macros do not reach it.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// Connections accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Connections closed (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Open connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connection lifetime in seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Text messages received (counter).
pub const RELAY_TEXT_MESSAGES_TOTAL: &str = "relay_text_messages_total";
/// Binary messages received (counter).
pub const RELAY_BINARY_MESSAGES_TOTAL: &str = "relay_binary_messages_total";
/// Envelopes queued to recipients (counter).
pub const RELAY_BROADCAST_DELIVERIES_TOTAL: &str = "relay_broadcast_deliveries_total";
/// Frames that could not be queued (counter).
pub const RELAY_SEND_FAILURES_TOTAL: &str = "relay_send_failures_total";
/// Connections accepted without a color (counter).
pub const RELAY_POOL_EXHAUSTED_TOTAL: &str = "relay_pool_exhausted_total";
