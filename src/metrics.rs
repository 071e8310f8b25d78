//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Connection attempts and outcomes
//! - Client state
//! - Handshake latency and session duration
//! - Piped bytes
//! - Discovery and errors
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `replication_client_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)
//!
//! # Usage
//!
//! ```rust,no_run
//! use replication_client::metrics;
//! use std::time::Duration;
//!
//! metrics::record_connect_attempt();
//! metrics::record_handshake(Duration::from_millis(12));
//! ```

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// =============================================================================
// Connection Metrics
// =============================================================================

/// Record an accepted `connect()` call.
pub fn record_connect_attempt() {
    counter!("replication_client_connect_attempts_total").increment(1);
}

/// Record the outcome of a connection attempt.
pub fn record_connection(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("replication_client_connections_total", "status" => status).increment(1);
}

/// Record a `connect()` rejected by a usage precondition.
pub fn record_usage_error(reason: &'static str) {
    counter!("replication_client_usage_errors_total", "reason" => reason).increment(1);
}

/// Gauge for client state (0=idle, 1=connecting, 2=connected, 3=destroyed).
pub fn set_client_state(value: f64) {
    gauge!("replication_client_state").set(value);
}

// =============================================================================
// Session Metrics
// =============================================================================

/// Record time from stream creation to handshake.
pub fn record_handshake(latency: Duration) {
    histogram!("replication_client_handshake_seconds").record(latency.as_secs_f64());
}

/// Record bytes moved by the pipe in one direction ("in" or "out").
pub fn record_pipe_bytes(direction: &'static str, bytes: u64) {
    counter!("replication_client_pipe_bytes_total", "direction" => direction).increment(bytes);
}

/// Record how long a connection attempt lived, from connect to teardown.
pub fn record_session_duration(duration: Duration) {
    histogram!("replication_client_session_duration_seconds").record(duration.as_secs_f64());
}

/// Record teardown duration.
pub fn record_teardown(duration: Duration) {
    counter!("replication_client_teardowns_total").increment(1);
    histogram!("replication_client_teardown_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Discovery / Error Metrics
// =============================================================================

/// Record a peer found by discovery.
pub fn record_peer_discovered() {
    counter!("replication_client_peers_discovered_total").increment(1);
}

/// Record an emitted error by kind.
pub fn record_error(kind: &'static str) {
    counter!("replication_client_errors_total", "kind" => kind).increment(1);
}
