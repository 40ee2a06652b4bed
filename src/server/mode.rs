//! Server modes and the bindings each one needs.
//!
//! [`resolve`] is the single place that knows which listeners a mode creates
//! and in what order. Anything that depends on another binding (the
//! gateway bridge dials the gRPC binding) is always listed after it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::OpsxError;

/// Which transports a process instance exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServerMode {
    /// gRPC server only.
    Grpc,
    /// gRPC server plus an HTTP+JSON gateway bridged into it.
    GrpcGateway,
    /// Plain HTTP router, no gRPC.
    Gin,
}

impl ServerMode {
    /// Every supported mode, in the order they are listed to users.
    pub const ALL: [ServerMode; 3] = [ServerMode::Grpc, ServerMode::GrpcGateway, ServerMode::Gin];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServerMode::Grpc => "grpc",
            ServerMode::GrpcGateway => "grpc-gateway",
            ServerMode::Gin => "gin",
        }
    }

    /// Whether this mode opens a gRPC listener.
    pub fn needs_grpc(&self) -> bool {
        matches!(self, ServerMode::Grpc | ServerMode::GrpcGateway)
    }

    /// Whether this mode opens an HTTP listener.
    pub fn needs_http(&self) -> bool {
        matches!(self, ServerMode::GrpcGateway | ServerMode::Gin)
    }

    /// Comma-separated list of mode names, for help text and errors.
    pub fn available() -> String {
        Self::ALL
            .iter()
            .map(ServerMode::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerMode {
    type Err = OpsxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| OpsxError::InvalidMode(s.to_string()))
    }
}

/// The kind of listener a binding owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindingKind {
    /// tonic gRPC server.
    Grpc,
    /// HTTP server whose router is the gateway bridge into a gRPC binding.
    Gateway,
    /// HTTP server serving application handlers directly.
    Http,
}

impl BindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindingKind::Grpc => "grpc",
            BindingKind::Gateway => "gateway",
            BindingKind::Http => "http",
        }
    }
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a mode's startup plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingPlan {
    pub kind: BindingKind,
    /// Binding that must be listening before this one is constructed.
    pub depends_on: Option<BindingKind>,
}

impl BindingPlan {
    const fn standalone(kind: BindingKind) -> Self {
        Self {
            kind,
            depends_on: None,
        }
    }
}

/// Bindings to construct for `mode`, in dependency order.
pub fn resolve(mode: ServerMode) -> Vec<BindingPlan> {
    match mode {
        ServerMode::Grpc => vec![BindingPlan::standalone(BindingKind::Grpc)],
        ServerMode::GrpcGateway => vec![
            BindingPlan::standalone(BindingKind::Grpc),
            BindingPlan {
                kind: BindingKind::Gateway,
                depends_on: Some(BindingKind::Grpc),
            },
        ],
        ServerMode::Gin => vec![BindingPlan::standalone(BindingKind::Http)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_modes() {
        assert_eq!("grpc".parse::<ServerMode>().unwrap(), ServerMode::Grpc);
        assert_eq!(
            "grpc-gateway".parse::<ServerMode>().unwrap(),
            ServerMode::GrpcGateway
        );
        assert_eq!("gin".parse::<ServerMode>().unwrap(), ServerMode::Gin);
    }

    #[test]
    fn parse_rejects_unknown_mode() {
        let err = "grpc_gateway".parse::<ServerMode>().unwrap_err();
        assert!(matches!(err, OpsxError::InvalidMode(ref m) if m == "grpc_gateway"));
        assert!(err.to_string().contains("grpc, grpc-gateway, gin"));
    }

    #[test]
    fn parse_is_case_sensitive() {
        assert!("GRPC".parse::<ServerMode>().is_err());
    }

    #[test]
    fn display_round_trips() {
        for mode in ServerMode::ALL {
            assert_eq!(mode.to_string().parse::<ServerMode>().unwrap(), mode);
        }
    }

    #[test]
    fn grpc_mode_has_single_binding() {
        let plan = resolve(ServerMode::Grpc);
        assert_eq!(plan, vec![BindingPlan::standalone(BindingKind::Grpc)]);
    }

    #[test]
    fn gateway_mode_orders_grpc_first() {
        let plan = resolve(ServerMode::GrpcGateway);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].kind, BindingKind::Grpc);
        assert_eq!(plan[1].kind, BindingKind::Gateway);
        assert_eq!(plan[1].depends_on, Some(BindingKind::Grpc));
    }

    #[test]
    fn gin_mode_has_no_grpc() {
        let plan = resolve(ServerMode::Gin);
        assert_eq!(plan, vec![BindingPlan::standalone(BindingKind::Http)]);
    }

    #[test]
    fn dependencies_always_precede_dependents() {
        for mode in ServerMode::ALL {
            let plan = resolve(mode);
            for (idx, step) in plan.iter().enumerate() {
                if let Some(dep) = step.depends_on {
                    let dep_idx = plan.iter().position(|s| s.kind == dep);
                    assert!(
                        matches!(dep_idx, Some(d) if d < idx),
                        "{mode}: {} must come after {dep}",
                        step.kind
                    );
                }
            }
        }
    }

    #[test]
    fn transport_needs_match_plan() {
        for mode in ServerMode::ALL {
            let plan = resolve(mode);
            let has_grpc = plan.iter().any(|s| s.kind == BindingKind::Grpc);
            let has_http = plan
                .iter()
                .any(|s| matches!(s.kind, BindingKind::Gateway | BindingKind::Http));
            assert_eq!(mode.needs_grpc(), has_grpc, "{mode}");
            assert_eq!(mode.needs_http(), has_http, "{mode}");
        }
    }
}
