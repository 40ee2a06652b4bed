//! The union server and everything it is built from.
//!
//! This module provides:
//! - Generated protobuf types (`proto`) shared by server and client
//! - The mode resolver (`mode`): which bindings a mode creates, in order
//! - The binding abstraction (`binding`) and its gRPC (`grpc`) and HTTP
//!   (`http`) variants
//! - The gateway bridge (`gateway`) that transcodes HTTP+JSON into gRPC
//! - The union server itself (`union`): startup order, lifetimes and
//!   coordinated graceful shutdown
//!
//! # Transport Extensibility
//!
//! Only TCP listeners are supported. New transports implement
//! [`Binding`] and are slotted into [`mode::resolve`].

pub mod binding;
pub mod gateway;
pub mod grpc;
pub mod http;
pub mod interceptor;
pub mod marshal;
pub mod mode;
pub mod service;
pub mod union;

/// Re-exported generated proto types.
pub mod proto {
    tonic::include_proto!("opsx.core.v1");
}

pub use binding::{Binding, StopSignal};
pub use gateway::GatewayBridge;
pub use grpc::GrpcBinding;
pub use http::HttpBinding;
pub use interceptor::{InterceptorChain, RequestId};
pub use marshal::{GatewayJson, MarshalOptions};
pub use mode::{BindingKind, BindingPlan, ServerMode};
pub use service::CoreService;
pub use union::{ServerHandle, ServerState, ShutdownReport, UnionServer};
