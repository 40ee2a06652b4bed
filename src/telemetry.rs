//! Telemetry metric name constants.
//!
//! Centralised metric names for opsx operations. Consumers install their own
//! `metrics` recorder (e.g. prometheus, statsd); without a recorder
//! installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `opsx_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `binding`: transport binding: "grpc", "gateway" or "http"
//! - `method`: RPC method name (e.g. "Healthz")
//! - `route`: HTTP route served by the gateway (e.g. "/healthz")
//! - `status`: HTTP status code returned to the caller
//! - `code`: gRPC status code of an upstream failure

/// Total gRPC calls handled by the `Core` service.
///
/// Labels: `method`.
pub const GRPC_REQUESTS_TOTAL: &str = "opsx_grpc_requests_total";

/// Total HTTP responses produced by the gateway bridge.
///
/// Labels: `route`, `status`.
pub const GATEWAY_REQUESTS_TOTAL: &str = "opsx_gateway_requests_total";

/// Total gateway calls whose upstream gRPC call failed.
///
/// Labels: `code`.
pub const GATEWAY_UPSTREAM_ERRORS_TOTAL: &str = "opsx_gateway_upstream_errors_total";

/// Total binding stops, by outcome.
///
/// Labels: `binding`, `outcome` ("drained" | "failed" | "forced" | "panicked").
pub const BINDING_STOPS_TOTAL: &str = "opsx_binding_stops_total";
