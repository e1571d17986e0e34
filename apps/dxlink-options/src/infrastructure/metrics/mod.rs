//! Prometheus Metrics Module
//!
//! Exposes session and query metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Messages**: protocol messages received and sent by type
//! - **Feed**: decoded events by type, dropped events, decode errors
//! - **Connection**: session state and reconnect attempts
//! - **Subscriptions**: subscribed symbol counts per table
//! - **Queries**: retries and exhausted lookups
//!
//! # Integration
//!
//! With a non-zero port, metrics are served at `/metrics` by the exporter's
//! own HTTP listener.

use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Errors installing the metrics recorder.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Exporter could not be built.
    #[error("failed to build Prometheus exporter: {0}")]
    Build(#[from] BuildError),
    /// Another global recorder is installed.
    #[error("a metrics recorder is already installed")]
    AlreadyInstalled,
}

/// Initialize the Prometheus metrics recorder.
///
/// A `port` of 0 installs the recorder without an HTTP listener. Must be
/// called from within a Tokio runtime when `port` is non-zero. Repeated calls
/// return the existing handle.
///
/// # Errors
///
/// Returns an error if the exporter cannot bind or a different recorder is
/// already installed.
pub fn init_metrics(port: u16) -> Result<PrometheusHandle, MetricsError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = if port == 0 {
        PrometheusBuilder::new().install_recorder()?
    } else {
        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
            .build()?;
        let handle = recorder.handle();
        metrics::set_global_recorder(recorder).map_err(|_| MetricsError::AlreadyInstalled)?;
        tokio::spawn(async move {
            if let Err(e) = exporter.await {
                tracing::error!(error = ?e, "Prometheus exporter stopped");
            }
        });
        handle
    };

    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "dxlink_messages_received_total",
        "Protocol messages received from DXLink by type"
    );
    describe_counter!(
        "dxlink_messages_sent_total",
        "Protocol messages sent to DXLink by type"
    );
    describe_counter!(
        "dxlink_feed_events_total",
        "Feed events decoded and applied by event type"
    );
    describe_counter!(
        "dxlink_feed_events_dropped_total",
        "Feed events for symbols that are not subscribed"
    );
    describe_counter!(
        "dxlink_errors_total",
        "Decode, protocol and server errors by kind"
    );
    describe_counter!(
        "dxlink_reconnects_total",
        "DXLink reconnection attempts"
    );

    describe_gauge!(
        "dxlink_connection_state",
        "Session state: 0 disconnected, 1 connecting, 2 connected"
    );
    describe_gauge!(
        "dxlink_subscribed_symbols",
        "Subscribed symbols by table"
    );

    describe_counter!(
        "dxlink_query_retries_total",
        "Snapshot lookups retried while waiting for data"
    );
    describe_counter!(
        "dxlink_query_exhausted_total",
        "Snapshot queries that ran out of retries"
    );

    describe_histogram!(
        "dxlink_feed_processing_seconds",
        "Time to decode and apply one FEED_DATA message"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for error kinds.
#[derive(Debug, Clone, Copy)]
pub enum ErrorKind {
    /// Frame or feed payload failed to decode.
    Decode,
    /// Handshake failure.
    Protocol,
    /// Server `ERROR` message.
    Server,
    /// Socket read/write failure.
    Socket,
}

impl ErrorKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Decode => "decode",
            Self::Protocol => "protocol",
            Self::Server => "server",
            Self::Socket => "socket",
        }
    }
}

/// Metric labels for the retrying queries.
#[derive(Debug, Clone, Copy)]
pub enum QueryKind {
    /// Option snapshot lookup.
    Option,
    /// Underlying price lookup.
    Underlying,
}

impl QueryKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Option => "option",
            Self::Underlying => "underlying",
        }
    }
}

/// Record a message received from DXLink.
pub fn record_message_received(message_type: &str) {
    counter!(
        "dxlink_messages_received_total",
        "message_type" => message_type.to_string()
    )
    .increment(1);
}

/// Record a message sent to DXLink.
pub fn record_message_sent(message_type: &'static str) {
    counter!(
        "dxlink_messages_sent_total",
        "message_type" => message_type
    )
    .increment(1);
}

/// Record feed events applied to the store.
pub fn record_feed_events(event_type: &'static str, count: u64) {
    counter!(
        "dxlink_feed_events_total",
        "event_type" => event_type
    )
    .increment(count);
}

/// Record feed events dropped for unsubscribed symbols.
pub fn record_feed_events_dropped(count: u64) {
    counter!("dxlink_feed_events_dropped_total").increment(count);
}

/// Record an error.
pub fn record_error(kind: ErrorKind) {
    counter!(
        "dxlink_errors_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a reconnection attempt.
pub fn record_reconnect() {
    counter!("dxlink_reconnects_total").increment(1);
}

/// Update the connection state gauge.
pub fn set_connection_state(value: f64) {
    gauge!("dxlink_connection_state").set(value);
}

/// Update subscribed symbol counts.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscribed_symbols(underlyings: usize, options: usize) {
    gauge!("dxlink_subscribed_symbols", "table" => "underlying").set(underlyings as f64);
    gauge!("dxlink_subscribed_symbols", "table" => "option").set(options as f64);
}

/// Record a retried snapshot lookup.
pub fn record_query_retry(kind: QueryKind) {
    counter!(
        "dxlink_query_retries_total",
        "query" => kind.as_str()
    )
    .increment(1);
}

/// Record a snapshot query that ran out of retries.
pub fn record_query_exhausted(kind: QueryKind) {
    counter!(
        "dxlink_query_exhausted_total",
        "query" => kind.as_str()
    )
    .increment(1);
}

/// Record `FEED_DATA` processing duration.
pub fn record_feed_processing(duration: Duration) {
    histogram!("dxlink_feed_processing_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
