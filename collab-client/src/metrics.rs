//! Prometheus metrics for the collaboration client.
//!
//! Recording is a no-op until a recorder is installed, so library users pay
//! nothing unless they call [`init_metrics`].

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

const WS_MESSAGES_TOTAL: &str = "collab_ws_messages_total";
const WS_CONNECTED: &str = "collab_ws_connected";
const RECONNECT_ATTEMPTS_TOTAL: &str = "collab_reconnect_attempts_total";
const LISTENER_PANICS_TOTAL: &str = "collab_listener_panics_total";
const HTTP_REQUESTS_TOTAL: &str = "collab_http_requests_total";

/// Socket message direction label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Server to client.
    Inbound,
    /// Client to server.
    Outbound,
}

impl Direction {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or another recorder is
/// already installed.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}

/// Record a socket message.
///
/// * `msg_type` - wire `type` tag, or `invalid` for rejected frames
pub fn record_ws_message(direction: Direction, msg_type: &str) {
    counter!(
        WS_MESSAGES_TOTAL,
        "direction" => direction.as_str(),
        "type" => msg_type.to_string()
    )
    .increment(1);
}

/// Flip the connected gauge.
pub fn set_ws_connected(connected: bool) {
    gauge!(WS_CONNECTED).set(if connected { 1.0 } else { 0.0 });
}

/// Record a scheduled reconnect.
pub fn record_reconnect_attempt() {
    counter!(RECONNECT_ATTEMPTS_TOTAL).increment(1);
}

/// Record listeners that panicked during one dispatch.
pub fn record_listener_panics(count: usize) {
    if count > 0 {
        counter!(LISTENER_PANICS_TOTAL).increment(count as u64);
    }
}

/// Record an HTTP call.
///
/// * `endpoint` - `create_session`, `get_session` or `invite_participant`
/// * `outcome` - `success`, `status`, `transport`, `decode` or `invalid_url`
pub fn record_http_request(endpoint: &'static str, outcome: &'static str) {
    counter!(
        HTTP_REQUESTS_TOTAL,
        "endpoint" => endpoint,
        "outcome" => outcome
    )
    .increment(1);
}
