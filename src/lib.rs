//! opsx - union server for the `opsx-core` RPC service
//!
//! One RPC service, reachable over one or more transports chosen at startup
//! by a single mode selector:
//!
//! - `grpc`: gRPC only
//! - `grpc-gateway`: gRPC plus an HTTP+JSON gateway that forwards into it
//! - `gin`: a plain HTTP router
//!
//! [`UnionServer`] binds every listener the mode needs in dependency order,
//! serves them concurrently, and stops them together within a deadline.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use opsx::ServerOptions;
//! use opsx::UnionServer;
//!
//! #[tokio::main]
//! async fn main() -> opsx::Result<()> {
//!     let cfg = ServerOptions::default().config()?;
//!     let server = UnionServer::new(cfg).await?;
//!     let handle = server.handle();
//!
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         let _ = handle.graceful_stop(Duration::from_secs(10)).await;
//!     });
//!
//!     server.run().await
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod server;
pub mod telemetry;
pub mod version;

// Re-export main types at crate root
pub use config::{Config, ServerOptions};
pub use error::{OpsxError, Result};
pub use server::{ServerHandle, ServerMode, ServerState, ShutdownReport, UnionServer};
pub use version::{PKG_VERSION, version_string};
