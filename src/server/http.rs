//! Plain HTTP transport binding.
//!
//! Serves an axum [`Router`]. Used directly in `gin` mode and as the
//! listener of the gateway bridge in `grpc-gateway` mode.

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::Router;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tracing::info;

use super::binding::{Binding, StopSignal, bind_listener};
use super::interceptor::{REQUEST_ID_HEADER, RequestId};
use super::marshal::{GatewayJson, MarshalOptions, status_body};
use super::mode::BindingKind;
use super::service::CoreService;
use crate::config::ListenOptions;
use crate::{OpsxError, Result};

/// Serves a router on its own listener.
pub struct HttpBinding {
    kind: BindingKind,
    listener: TcpListener,
    local_addr: SocketAddr,
    router: Router,
}

impl HttpBinding {
    /// Claim the listener now so bind failures surface before serving.
    ///
    /// `kind` is [`BindingKind::Http`] for `gin` mode and
    /// [`BindingKind::Gateway`] when `router` is a gateway bridge.
    pub async fn bind(kind: BindingKind, opts: &ListenOptions, router: Router) -> Result<Self> {
        let (listener, local_addr) = bind_listener(kind, opts.addr).await?;
        Ok(Self {
            kind,
            listener,
            local_addr,
            router: router.layer(middleware::from_fn(propagate_request_id)),
        })
    }
}

#[async_trait]
impl Binding for HttpBinding {
    fn kind(&self) -> BindingKind {
        self.kind
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn start(self: Box<Self>, stop: StopSignal) -> Result<()> {
        let Self {
            kind,
            listener,
            local_addr,
            router,
        } = *self;

        info!(binding = %kind, addr = %local_addr, "serving requests");

        axum::serve(listener, router)
            .with_graceful_shutdown(stop.recv())
            .await
            .map_err(|source| OpsxError::Serve {
                binding: kind,
                source,
            })
    }
}

/// Ensure every request carries `x-request-id` and echo it on the response.
async fn propagate_request_id(mut request: Request, next: Next) -> Response {
    let id = RequestId::from_header(
        request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok()),
    );
    let value = HeaderValue::from_str(id.as_str()).ok();
    if let Some(value) = &value {
        request.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
    }
    request.extensions_mut().insert(id);

    let mut response = next.run(request).await;
    if let Some(value) = value {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Fallback for routes neither router knows.
pub(crate) async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(status_body(tonic::Code::NotFound, "Not Found")),
    )
        .into_response()
}

#[derive(Clone)]
struct LocalState {
    service: CoreService,
    marshal: MarshalOptions,
}

/// Router for `gin` mode: answers from the service directly.
pub fn router(service: CoreService, marshal: MarshalOptions) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .fallback(not_found)
        .with_state(LocalState { service, marshal })
}

async fn healthz(State(state): State<LocalState>) -> Json<serde_json::Value> {
    Json(state.service.health().to_gateway_json(&state.marshal))
}
