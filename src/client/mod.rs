//! Client library for calling the `Core` service.
//!
//! Provides [`ServiceClient`], a typed gRPC client used by the gateway
//! bridge and usable by any other caller of `opsx-core`.

mod service_client;

pub use service_client::ServiceClient;
