//! gRPC transport binding.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::info;

use super::binding::{Binding, StopSignal, bind_listener};
use super::interceptor::InterceptorChain;
use super::mode::BindingKind;
use super::proto::core_server::CoreServer;
use super::service::CoreService;
use crate::config::ListenOptions;
use crate::{OpsxError, Result};

/// Serves [`CoreService`] over gRPC on its own listener.
pub struct GrpcBinding {
    listener: TcpListener,
    local_addr: SocketAddr,
    timeout: Option<Duration>,
    service: CoreService,
    interceptors: InterceptorChain,
}

impl GrpcBinding {
    /// Claim the listener now so bind failures surface before serving.
    pub async fn bind(
        opts: &ListenOptions,
        service: CoreService,
        interceptors: InterceptorChain,
    ) -> Result<Self> {
        let (listener, local_addr) = bind_listener(BindingKind::Grpc, opts.addr).await?;
        Ok(Self {
            listener,
            local_addr,
            timeout: opts.timeout,
            service,
            interceptors,
        })
    }
}

#[async_trait]
impl Binding for GrpcBinding {
    fn kind(&self) -> BindingKind {
        BindingKind::Grpc
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn start(self: Box<Self>, stop: StopSignal) -> Result<()> {
        let Self {
            listener,
            local_addr,
            timeout,
            service,
            interceptors,
        } = *self;

        info!(
            binding = %BindingKind::Grpc,
            addr = %local_addr,
            interceptors = ?interceptors,
            "serving requests"
        );

        let mut builder = Server::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        builder
            .add_service(CoreServer::with_interceptor(service, interceptors))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), stop.recv())
            .await
            .map_err(|source| OpsxError::Transport {
                binding: BindingKind::Grpc,
                source,
            })
    }
}
