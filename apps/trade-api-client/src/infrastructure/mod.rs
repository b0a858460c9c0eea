//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the gRPC transport, the event stream multiplexer,
//! and the ambient configuration, metrics and telemetry setup.

/// Configuration loaded from environment variables.
pub mod config;

/// gRPC transport, wire conversions and the client façade.
pub mod grpc;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Event stream multiplexer.
pub mod stream;

/// OpenTelemetry tracing integration.
pub mod telemetry;
