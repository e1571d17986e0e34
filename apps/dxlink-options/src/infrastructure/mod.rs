//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the DXLink client and the process-level concerns
//! (configuration, metrics, telemetry) around it.

/// DXLink WebSocket session and protocol.
pub mod dxlink;

/// Configuration and configuration-backed sources.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
