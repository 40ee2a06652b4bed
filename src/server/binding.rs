//! The transport binding abstraction.
//!
//! A binding is one bound listener plus the server that drains it. Binding
//! the socket happens at construction so that a listen failure aborts
//! startup before anything serves, and so that dependants can learn the
//! real address (including an OS-assigned port) before they are built.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use super::BindingKind;
use crate::{OpsxError, Result};

/// One live listener with a start/stop lifecycle.
///
/// Owned exclusively by the union server that created it. `start` is
/// called exactly once, on its own task.
#[async_trait]
pub trait Binding: Send + 'static {
    fn kind(&self) -> BindingKind;

    /// Address the listener is actually bound to.
    fn local_addr(&self) -> SocketAddr;

    /// Serve until `stop` fires, then drain in-flight requests and return.
    ///
    /// Returns an error only for failures of the serve loop itself. The
    /// caller enforces the drain deadline by aborting the task.
    async fn start(self: Box<Self>, stop: StopSignal) -> Result<()>;
}

/// Resolves once the owner asks the binding to stop.
///
/// Also resolves if the owner goes away, so an orphaned binding never
/// serves forever.
#[derive(Debug)]
pub struct StopSignal(oneshot::Receiver<()>);

impl StopSignal {
    /// A trigger and the signal it fires.
    pub fn channel() -> (oneshot::Sender<()>, StopSignal) {
        let (tx, rx) = oneshot::channel();
        (tx, StopSignal(rx))
    }

    pub async fn recv(self) {
        let _ = self.0.await;
    }
}

/// Bind a TCP listener, tagging failures with the binding kind.
pub async fn bind_listener(
    kind: BindingKind,
    addr: SocketAddr,
) -> Result<(TcpListener, SocketAddr)> {
    let bind_err = |source| OpsxError::Bind {
        binding: kind,
        addr: addr.to_string(),
        source,
    };
    let listener = TcpListener::bind(addr).await.map_err(bind_err)?;
    let local_addr = listener.local_addr().map_err(bind_err)?;
    Ok((listener, local_addr))
}
