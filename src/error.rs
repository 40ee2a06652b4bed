//! opsx error types

use crate::server::BindingKind;

/// opsx error types
#[derive(Debug, thiserror::Error)]
pub enum OpsxError {
    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Every violation found during validation, not just the first.
    #[error("invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    #[error("invalid server mode {0:?}: must be one of [grpc, grpc-gateway, gin]")]
    InvalidMode(String),

    // Listener errors
    #[error("{binding} binding failed to listen on {addr}: {source}")]
    Bind {
        binding: BindingKind,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{binding} binding requires a {depends_on} binding constructed before it")]
    MissingDependency {
        binding: BindingKind,
        depends_on: BindingKind,
    },

    // Runtime transport errors
    #[error("{binding} transport error: {source}")]
    Transport {
        binding: BindingKind,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("{binding} server error: {source}")]
    Serve {
        binding: BindingKind,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} binding stopped serving without a stop request")]
    UnexpectedExit(BindingKind),

    #[error("{0} binding task panicked")]
    BindingPanicked(BindingKind),

    // Request-local errors
    #[error("upstream error: {0}")]
    Upstream(#[from] tonic::Status),

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error("server did not reach a stopped state within the shutdown deadline")]
    ShutdownIncomplete,
}

impl OpsxError {
    /// Whether the error was raised before any binding began serving.
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            OpsxError::Configuration(_)
                | OpsxError::InvalidConfig(_)
                | OpsxError::InvalidMode(_)
                | OpsxError::Bind { .. }
                | OpsxError::MissingDependency { .. }
        )
    }
}

/// Result type alias for opsx operations
pub type Result<T> = std::result::Result<T, OpsxError>;
