//! Prometheus Metrics Module
//!
//! Client metrics recorded through the `metrics` facade. Recording is a no-op
//! until a recorder is installed, so library users who never call
//! [`init_metrics`] or [`install_exporter`] pay nothing.
//!
//! # Metrics Categories
//!
//! - **Commands**: subscription commands enqueued, sent and discarded
//! - **Events**: inbound events by kind, handler panics
//! - **Stream**: lifecycle state of the event stream
//! - **Unary calls**: outcomes and latency per RPC method

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::streaming::{EventKind, StreamState};
use crate::domain::subscription::CommandKind;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder without an HTTP listener.
///
/// Repeated calls return the handle from the first successful install.
///
/// # Errors
///
/// Returns an error if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Install the Prometheus recorder and serve `/metrics` on `port`.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or a recorder is
/// already installed.
pub fn install_exporter(port: u16) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        .install()?;
    register_metrics();
    tracing::info!(port, "Prometheus exporter listening");
    Ok(())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if [`init_metrics`] has not been called.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "trade_api_client_commands_enqueued_total",
        "Subscription commands accepted by the command queue"
    );
    describe_counter!(
        "trade_api_client_commands_sent_total",
        "Subscription commands handed to the transport"
    );
    describe_counter!(
        "trade_api_client_commands_discarded_total",
        "Subscription commands still queued when the stream closed"
    );

    describe_counter!(
        "trade_api_client_events_received_total",
        "Inbound events by payload kind"
    );
    describe_counter!(
        "trade_api_client_handler_panics_total",
        "Panics raised by user event handlers"
    );

    describe_gauge!(
        "trade_api_client_stream_state",
        "Event stream state (0=created, 1=streaming, 2=closed, 3=failed)"
    );

    describe_counter!(
        "trade_api_client_unary_calls_total",
        "Unary RPC calls by method and outcome"
    );
    describe_histogram!(
        "trade_api_client_unary_call_seconds",
        "Unary RPC latency"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for unary calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// Response received.
    Ok,
    /// Transport or status error.
    Error,
}

impl CallOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }
}

/// Record a command accepted by the queue.
pub fn record_command_enqueued(kind: CommandKind) {
    counter!(
        "trade_api_client_commands_enqueued_total",
        "command" => kind.as_str()
    )
    .increment(1);
}

/// Record a command handed to the transport.
pub fn record_command_sent(kind: CommandKind) {
    counter!(
        "trade_api_client_commands_sent_total",
        "command" => kind.as_str()
    )
    .increment(1);
}

/// Record commands discarded at stream close.
pub fn record_commands_discarded(count: u64) {
    counter!("trade_api_client_commands_discarded_total").increment(count);
}

/// Record an inbound event.
pub fn record_event_received(kind: EventKind) {
    counter!(
        "trade_api_client_events_received_total",
        "event" => kind.as_str()
    )
    .increment(1);
}

/// Record a handler panic.
pub fn record_handler_panic(kind: EventKind) {
    counter!(
        "trade_api_client_handler_panics_total",
        "event" => kind.as_str()
    )
    .increment(1);
}

/// Update the stream state gauge.
pub fn set_stream_state(state: StreamState) {
    gauge!("trade_api_client_stream_state").set(state.as_gauge());
}

/// Record a unary call outcome and its latency.
pub fn record_unary_call(method: &'static str, outcome: CallOutcome, duration: Duration) {
    counter!(
        "trade_api_client_unary_calls_total",
        "method" => method,
        "outcome" => outcome.as_str()
    )
    .increment(1);
    histogram!(
        "trade_api_client_unary_call_seconds",
        "method" => method
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
