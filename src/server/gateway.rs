//! HTTP+JSON to gRPC bridge.
//!
//! Every route is forwarded to the gRPC binding over a loopback channel, so
//! requests through the gateway see the same interceptors as direct gRPC
//! callers.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use tracing::warn;

use super::http::not_found;
use super::interceptor::REQUEST_ID_HEADER;
use super::marshal::{GatewayJson, MarshalOptions, status_body};
use crate::client::ServiceClient;
use crate::telemetry;
use crate::{OpsxError, Result};

/// Routes HTTP calls into the gRPC binding.
#[derive(Debug, Clone)]
pub struct GatewayBridge {
    client: ServiceClient,
    marshal: MarshalOptions,
    timeout: Option<Duration>,
    target: SocketAddr,
}

impl GatewayBridge {
    /// Bridge to the gRPC listener bound at `grpc_addr`.
    ///
    /// The channel connects lazily, so the bridge can be built before the
    /// gRPC binding starts serving. `timeout` bounds each upstream call.
    pub fn new(grpc_addr: SocketAddr, timeout: Option<Duration>) -> Result<Self> {
        let target = dial_addr(grpc_addr);
        let client = ServiceClient::connect_lazy(format!("http://{target}"))?;
        Ok(Self {
            client,
            marshal: MarshalOptions::gateway(),
            timeout,
            target,
        })
    }

    pub fn with_marshal_options(mut self, marshal: MarshalOptions) -> Self {
        self.marshal = marshal;
        self
    }

    /// Address the bridge dials.
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/healthz", get(healthz))
            .fallback(not_found)
            .with_state(self)
    }
}

async fn healthz(State(bridge): State<GatewayBridge>, headers: HeaderMap) -> Response {
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok());

    let (status, body) = match bridge.client.healthz(request_id, bridge.timeout).await {
        Ok(response) => (StatusCode::OK, response.to_gateway_json(&bridge.marshal)),
        Err(OpsxError::Upstream(status)) => {
            warn!(
                request_id = request_id.unwrap_or("-"),
                code = ?status.code(),
                message = status.message(),
                "upstream call failed"
            );
            metrics::counter!(
                telemetry::GATEWAY_UPSTREAM_ERRORS_TOTAL,
                "code" => format!("{:?}", status.code())
            )
            .increment(1);
            (
                http_status_from_code(status.code()),
                status_body(status.code(), status.message()),
            )
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            status_body(tonic::Code::Internal, &e.to_string()),
        ),
    };

    metrics::counter!(
        telemetry::GATEWAY_REQUESTS_TOTAL,
        "route" => "/healthz",
        "status" => status.as_u16().to_string()
    )
    .increment(1);
    (status, Json(body)).into_response()
}

/// HTTP status for a gRPC code, following the usual gateway table.
pub fn http_status_from_code(code: tonic::Code) -> StatusCode {
    use tonic::Code;
    match code {
        Code::Ok => StatusCode::OK,
        // Client Closed Request; not in the registered set.
        Code::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
        Code::InvalidArgument | Code::FailedPrecondition | Code::OutOfRange => {
            StatusCode::BAD_REQUEST
        }
        Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::AlreadyExists | Code::Aborted => StatusCode::CONFLICT,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Code::Unknown | Code::Internal | Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Address to dial for a listener bound at `bound`.
///
/// Wildcard binds accept on loopback, which is always reachable.
pub fn dial_addr(bound: SocketAddr) -> SocketAddr {
    match bound.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), bound.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), bound.port())
        }
        _ => bound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_is_dialed_on_loopback() {
        assert_eq!(
            dial_addr("0.0.0.0:7701".parse().unwrap()),
            "127.0.0.1:7701".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            dial_addr("[::]:7701".parse().unwrap()),
            "[::1]:7701".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            dial_addr("10.0.0.5:7701".parse().unwrap()),
            "10.0.0.5:7701".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn status_mapping() {
        use tonic::Code;
        assert_eq!(http_status_from_code(Code::Unavailable), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(http_status_from_code(Code::DeadlineExceeded), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(http_status_from_code(Code::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(http_status_from_code(Code::Cancelled).as_u16(), 499);
        assert_eq!(http_status_from_code(Code::DataLoss), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn bridge_targets_bound_address() {
        let bridge = GatewayBridge::new("0.0.0.0:9000".parse().unwrap(), None).unwrap();
        assert_eq!(bridge.target(), "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
    }
}
