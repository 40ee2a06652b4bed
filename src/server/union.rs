//! The union server: one lifecycle over every binding a mode needs.
//!
//! Construction binds every listener in dependency order, so a bind
//! failure aborts startup before anything serves and before any dependant
//! dials it. [`UnionServer::run`] serves all bindings concurrently and
//! returns once they have all been stopped, either on request through a
//! [`ServerHandle`] or because one of them failed.
//!
//! Shutdown has a single writer: the first stop request (or the first
//! fatal error) fixes the drain timeout, and every later caller observes
//! the same [`ShutdownReport`].

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::join_all;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, error, info, warn};

use super::binding::{Binding, StopSignal};
use super::gateway::GatewayBridge;
use super::grpc::GrpcBinding;
use super::http::{self, HttpBinding};
use super::interceptor::default_chain;
use super::marshal::MarshalOptions;
use super::mode::{self, BindingKind};
use super::service::CoreService;
use crate::config::{Config, ListenOptions};
use crate::telemetry;
use crate::{OpsxError, Result};

/// Extra time a stop caller waits past the drain timeout for aborted
/// bindings to be reaped.
pub const STOP_GRACE: Duration = Duration::from_secs(1);

/// How each binding ended during shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Finished draining within the timeout.
    pub drained: Vec<BindingKind>,
    /// Serve loop had already returned an error.
    pub failed: Vec<BindingKind>,
    /// Still draining at the deadline and aborted.
    pub forced: Vec<BindingKind>,
    pub panicked: Vec<BindingKind>,
}

impl ShutdownReport {
    /// Every binding drained on its own.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.forced.is_empty() && self.panicked.is_empty()
    }

    fn record(&mut self, kind: BindingKind, outcome: StopOutcome) {
        match outcome {
            StopOutcome::Drained => self.drained.push(kind),
            StopOutcome::Failed => self.failed.push(kind),
            StopOutcome::Forced => self.forced.push(kind),
            StopOutcome::Panicked => self.panicked.push(kind),
        }
    }
}

/// Lifecycle of a [`UnionServer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerState {
    Constructed,
    Running,
    Stopping,
    Stopped(ShutdownReport),
}

/// Cloneable remote control for a server that is about to run or running.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    stop_tx: Arc<watch::Sender<Option<Duration>>>,
    state_rx: watch::Receiver<ServerState>,
}

impl ServerHandle {
    pub fn state(&self) -> ServerState {
        self.state_rx.borrow().clone()
    }

    /// Ask every binding to drain within `timeout`, then wait until the
    /// server has stopped.
    ///
    /// Only the first request sets the timeout; later ones wait on it.
    /// Returns [`OpsxError::ShutdownIncomplete`] if the server is not
    /// stopped within the effective timeout plus [`STOP_GRACE`], or was
    /// dropped without running.
    pub async fn graceful_stop(&self, timeout: Duration) -> Result<ShutdownReport> {
        let claimed = claim_stop(&self.stop_tx, timeout);
        let effective = self.stop_tx.borrow().unwrap_or(timeout);
        if claimed {
            info!(timeout = ?effective, "graceful stop requested");
        } else {
            debug!(timeout = ?effective, "graceful stop already in progress");
        }

        let mut state_rx = self.state_rx.clone();
        let deadline = Instant::now() + effective + STOP_GRACE;
        let stopped = timeout_at(deadline, async {
            state_rx
                .wait_for(|s| matches!(s, ServerState::Stopped(_)))
                .await
                .ok()
                .and_then(|state| match &*state {
                    ServerState::Stopped(report) => Some(report.clone()),
                    _ => None,
                })
        })
        .await;
        match stopped {
            Ok(Some(report)) => Ok(report),
            _ => Err(OpsxError::ShutdownIncomplete),
        }
    }
}

/// Set the stop slot if nobody has; true for the caller that set it.
fn claim_stop(stop_tx: &watch::Sender<Option<Duration>>, timeout: Duration) -> bool {
    stop_tx.send_if_modified(|slot| {
        if slot.is_some() {
            return false;
        }
        *slot = Some(timeout);
        true
    })
}

/// Bindings for one mode plus their shared stop coordination.
pub struct UnionServer {
    bindings: Vec<Box<dyn Binding>>,
    shutdown_timeout: Duration,
    stop_tx: Arc<watch::Sender<Option<Duration>>>,
    state_tx: watch::Sender<ServerState>,
}

impl UnionServer {
    /// Bind every listener the configured mode needs, in dependency order.
    ///
    /// Fails on the first bind error; listeners bound before it are closed
    /// and no gateway bridge is built against a missing target.
    pub async fn new(cfg: Config) -> Result<Self> {
        let service = CoreService::new();
        let plan = mode::resolve(cfg.server_mode);
        let mut bindings: Vec<Box<dyn Binding>> = Vec::with_capacity(plan.len());

        for step in plan {
            let dependency = match step.depends_on {
                Some(depends_on) => Some(
                    bindings
                        .iter()
                        .find(|b| b.kind() == depends_on)
                        .map(|b| b.local_addr())
                        .ok_or(OpsxError::MissingDependency {
                            binding: step.kind,
                            depends_on,
                        })?,
                ),
                None => None,
            };

            let binding: Box<dyn Binding> = match step.kind {
                BindingKind::Grpc => {
                    let opts = listen_options(cfg.grpc.as_ref(), step.kind)?;
                    Box::new(GrpcBinding::bind(opts, service.clone(), default_chain()).await?)
                }
                BindingKind::Gateway => {
                    let opts = listen_options(cfg.http.as_ref(), step.kind)?;
                    let target = dependency.ok_or(OpsxError::MissingDependency {
                        binding: step.kind,
                        depends_on: BindingKind::Grpc,
                    })?;
                    let bridge = GatewayBridge::new(target, opts.timeout)?;
                    debug!(grpc_addr = %bridge.target(), "gateway bridge dials gRPC binding");
                    Box::new(HttpBinding::bind(step.kind, opts, bridge.router()).await?)
                }
                BindingKind::Http => {
                    let opts = listen_options(cfg.http.as_ref(), step.kind)?;
                    let router = http::router(service.clone(), MarshalOptions::gateway());
                    Box::new(HttpBinding::bind(step.kind, opts, router).await?)
                }
            };
            info!(binding = %binding.kind(), addr = %binding.local_addr(), "listener bound");
            bindings.push(binding);
        }

        Ok(Self::with_bindings(cfg.shutdown_timeout, bindings))
    }

    /// Wrap already-bound bindings. They start in the given order.
    ///
    /// `shutdown_timeout` is the drain timeout used when a fatal binding
    /// error, rather than a stop request, ends the run.
    pub fn with_bindings(shutdown_timeout: Duration, bindings: Vec<Box<dyn Binding>>) -> Self {
        let (stop_tx, _) = watch::channel(None);
        let (state_tx, _) = watch::channel(ServerState::Constructed);
        Self {
            bindings,
            shutdown_timeout,
            stop_tx: Arc::new(stop_tx),
            state_tx,
        }
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            stop_tx: self.stop_tx.clone(),
            state_rx: self.state_tx.subscribe(),
        }
    }

    /// Every bound listener, in start order.
    pub fn local_addrs(&self) -> Vec<(BindingKind, SocketAddr)> {
        self.bindings
            .iter()
            .map(|b| (b.kind(), b.local_addr()))
            .collect()
    }

    pub fn local_addr(&self, kind: BindingKind) -> Option<SocketAddr> {
        self.bindings
            .iter()
            .find(|b| b.kind() == kind)
            .map(|b| b.local_addr())
    }

    /// Serve every binding until a stop request or the first fatal error.
    ///
    /// A binding that errors, panics or returns before a stop was
    /// requested is fatal: all bindings are stopped and that error is
    /// returned. Returns `Ok(())` after a requested stop, including one
    /// that had to force-close a binding.
    pub async fn run(self) -> Result<()> {
        let Self {
            bindings,
            shutdown_timeout,
            stop_tx,
            state_tx,
        } = self;
        let mut stop_rx = stop_tx.subscribe();

        let (exit_tx, mut exit_rx) = mpsc::unbounded_channel();
        let running: Vec<RunningBinding> = bindings
            .into_iter()
            .map(|binding| RunningBinding::spawn(binding, exit_tx.clone()))
            .collect();
        drop(exit_tx);
        state_tx.send_replace(ServerState::Running);

        let fatal = tokio::select! {
            _ = stop_requested(&mut stop_rx) => None,
            Some((kind, result)) = exit_rx.recv() => Some(match result {
                Err(e) => e,
                Ok(()) => OpsxError::UnexpectedExit(kind),
            }),
        };

        if let Some(e) = &fatal {
            error!(error = %e, "binding failed, stopping every binding");
            claim_stop(&stop_tx, shutdown_timeout);
        }
        let drain_timeout = stop_tx.borrow().unwrap_or(shutdown_timeout);

        state_tx.send_replace(ServerState::Stopping);
        info!(timeout = ?drain_timeout, bindings = running.len(), "stopping bindings");
        let deadline = Instant::now() + drain_timeout;
        let outcomes = join_all(running.into_iter().map(|b| b.stop(deadline))).await;

        while let Ok((kind, result)) = exit_rx.try_recv() {
            if let Err(e) = result {
                warn!(binding = %kind, error = %e, "binding error while stopping");
            }
        }

        let mut report = ShutdownReport::default();
        for (kind, outcome) in outcomes {
            report.record(kind, outcome);
        }
        if report.is_clean() {
            info!("server stopped");
        } else {
            warn!(
                failed = ?report.failed,
                forced = ?report.forced,
                panicked = ?report.panicked,
                "server stopped uncleanly"
            );
        }
        state_tx.send_replace(ServerState::Stopped(report));

        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskExit {
    Clean,
    Failed,
    Panicked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopOutcome {
    Drained,
    Failed,
    Forced,
    Panicked,
}

impl StopOutcome {
    fn as_str(self) -> &'static str {
        match self {
            StopOutcome::Drained => "drained",
            StopOutcome::Failed => "failed",
            StopOutcome::Forced => "forced",
            StopOutcome::Panicked => "panicked",
        }
    }
}

impl From<TaskExit> for StopOutcome {
    fn from(exit: TaskExit) -> Self {
        match exit {
            TaskExit::Clean => StopOutcome::Drained,
            TaskExit::Failed => StopOutcome::Failed,
            TaskExit::Panicked => StopOutcome::Panicked,
        }
    }
}

type ExitSender = mpsc::UnboundedSender<(BindingKind, Result<()>)>;

/// A binding serving on its own task.
struct RunningBinding {
    kind: BindingKind,
    stop: oneshot::Sender<()>,
    task: JoinHandle<TaskExit>,
}

impl RunningBinding {
    fn spawn(binding: Box<dyn Binding>, exits: ExitSender) -> Self {
        let kind = binding.kind();
        let (stop, signal) = StopSignal::channel();
        let task = tokio::spawn(async move {
            let started = AssertUnwindSafe(binding.start(signal)).catch_unwind().await;
            let (exit, result) = match started {
                Ok(Ok(())) => (TaskExit::Clean, Ok(())),
                Ok(Err(e)) => (TaskExit::Failed, Err(e)),
                Err(_) => (TaskExit::Panicked, Err(OpsxError::BindingPanicked(kind))),
            };
            let _ = exits.send((kind, result));
            exit
        });
        Self { kind, stop, task }
    }

    /// Signal the binding, then wait for it until `deadline`.
    async fn stop(self, deadline: Instant) -> (BindingKind, StopOutcome) {
        let Self {
            kind,
            stop,
            mut task,
        } = self;
        // Already gone if the binding exited first.
        let _ = stop.send(());

        let outcome = match timeout_at(deadline, &mut task).await {
            Ok(Ok(exit)) => exit.into(),
            Ok(Err(e)) if e.is_panic() => StopOutcome::Panicked,
            Ok(Err(_)) => StopOutcome::Forced,
            Err(_) => {
                warn!(binding = %kind, "drain deadline exceeded, forcing close");
                task.abort();
                if timeout(STOP_GRACE, task).await.is_err() {
                    warn!(binding = %kind, "aborted binding did not finish");
                }
                StopOutcome::Forced
            }
        };
        debug!(binding = %kind, outcome = outcome.as_str(), "binding stopped");
        metrics::counter!(
            telemetry::BINDING_STOPS_TOTAL,
            "binding" => kind.as_str(),
            "outcome" => outcome.as_str()
        )
        .increment(1);
        (kind, outcome)
    }
}

async fn stop_requested(stop_rx: &mut watch::Receiver<Option<Duration>>) {
    let _ = stop_rx.wait_for(Option::is_some).await;
}

fn listen_options(opts: Option<&ListenOptions>, kind: BindingKind) -> Result<&ListenOptions> {
    opts.ok_or_else(|| {
        OpsxError::Configuration(format!("no listen address for the {kind} binding"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Idle {
        addr: SocketAddr,
    }

    #[async_trait]
    impl Binding for Idle {
        fn kind(&self) -> BindingKind {
            BindingKind::Http
        }

        fn local_addr(&self) -> SocketAddr {
            self.addr
        }

        async fn start(self: Box<Self>, stop: StopSignal) -> Result<()> {
            stop.recv().await;
            Ok(())
        }
    }

    fn idle() -> Box<dyn Binding> {
        Box::new(Idle {
            addr: "127.0.0.1:1".parse().unwrap(),
        })
    }

    #[test]
    fn report_cleanliness() {
        let mut report = ShutdownReport::default();
        report.record(BindingKind::Grpc, StopOutcome::Drained);
        assert!(report.is_clean());
        report.record(BindingKind::Gateway, StopOutcome::Forced);
        assert!(!report.is_clean());
        assert_eq!(report.forced, vec![BindingKind::Gateway]);
    }

    #[test]
    fn only_first_stop_claims_the_slot() {
        let (tx, _) = watch::channel(None);
        assert!(claim_stop(&tx, Duration::from_secs(1)));
        assert!(!claim_stop(&tx, Duration::from_secs(9)));
        assert_eq!(*tx.borrow(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn addresses_reported_in_start_order() {
        let server = UnionServer::with_bindings(Duration::from_secs(1), vec![idle()]);
        assert_eq!(
            server.local_addrs(),
            vec![(BindingKind::Http, "127.0.0.1:1".parse().unwrap())]
        );
        assert_eq!(server.local_addr(BindingKind::Grpc), None);
        assert_eq!(server.handle().state(), ServerState::Constructed);
    }

    #[tokio::test]
    async fn stop_before_run_stops_immediately() {
        let server = UnionServer::with_bindings(Duration::from_secs(1), vec![idle()]);
        let handle = server.handle();
        let stopper = tokio::spawn({
            let handle = handle.clone();
            async move { handle.graceful_stop(Duration::from_secs(1)).await }
        });
        server.run().await.unwrap();
        let report = stopper.await.unwrap().unwrap();
        assert_eq!(report.drained, vec![BindingKind::Http]);
        assert_eq!(handle.state(), ServerState::Stopped(report));
    }

    #[tokio::test]
    async fn dropped_server_reports_incomplete() {
        let server = UnionServer::with_bindings(Duration::from_secs(1), vec![idle()]);
        let handle = server.handle();
        drop(server);
        assert!(matches!(
            handle.graceful_stop(Duration::from_millis(10)).await,
            Err(OpsxError::ShutdownIncomplete)
        ));
    }
}
