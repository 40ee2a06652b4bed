//! Server options and the runtime configuration built from them.
//!
//! [`ServerOptions`] is the loosely-typed, user-facing shape: every field
//! has a default and can come from the YAML file, an `OPSX_*` environment
//! variable or a command-line flag (see [`source`] and [`flags`]).
//! [`ServerOptions::config`] validates it and produces the immutable
//! [`Config`] that is handed to the union server.

pub mod flags;
pub mod source;

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::time::Duration;

use serde::Deserialize;

use crate::logging::LogOptions;
use crate::server::ServerMode;
use crate::{OpsxError, Result};

pub use flags::ServerFlags;
pub use source::{ConfigSource, LoadedOptions};

/// Shortest accepted JWT signing key, in bytes.
pub const MIN_JWT_KEY_LEN: usize = 6;

const DEFAULT_JWT_KEY: &str = "Rtg8BPKNEf2mB4mgvKONGPZZQSaJWNLijxR42qRgq0iB31";

/// User-facing server options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ServerOptions {
    /// One of `grpc`, `grpc-gateway`, `gin`.
    pub server_mode: String,
    /// JWT signing key.
    pub jwt_key: String,
    /// JWT token lifetime.
    #[serde(with = "humantime_serde")]
    pub expiration: Duration,
    /// Upper bound on graceful shutdown.
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    pub grpc: GrpcOptions,
    pub http: HttpOptions,
    pub log: LogOptions,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            server_mode: ServerMode::GrpcGateway.to_string(),
            jwt_key: DEFAULT_JWT_KEY.to_string(),
            expiration: Duration::from_secs(2 * 60 * 60),
            shutdown_timeout: Duration::from_secs(10),
            grpc: GrpcOptions::default(),
            http: HttpOptions::default(),
            log: LogOptions::default(),
        }
    }
}

/// gRPC listener options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GrpcOptions {
    /// Listen address (default: ":7701").
    pub addr: String,
    /// Per-call server timeout.
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl Default for GrpcOptions {
    fn default() -> Self {
        Self {
            addr: ":7701".to_string(),
            timeout: None,
        }
    }
}

/// HTTP listener options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct HttpOptions {
    /// Listen address (default: ":7700").
    pub addr: String,
    /// Deadline applied to each upstream call made by the gateway.
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            addr: ":7700".to_string(),
            timeout: None,
        }
    }
}

impl ServerOptions {
    /// Check every option, reporting all violations at once.
    pub fn validate(&self) -> Result<()> {
        let mut errs = Vec::new();

        let mode = match self.server_mode.parse::<ServerMode>() {
            Ok(mode) => Some(mode),
            Err(_) => {
                errs.push(format!(
                    "invalid server mode {:?}: must be one of [{}]",
                    self.server_mode,
                    ServerMode::available()
                ));
                None
            }
        };

        if self.jwt_key.len() < MIN_JWT_KEY_LEN {
            errs.push(format!(
                "jwt-key must be at least {MIN_JWT_KEY_LEN} characters long"
            ));
        }

        if self.shutdown_timeout.is_zero() {
            errs.push("shutdown-timeout must be greater than zero".to_string());
        }

        // Listener options are only checked for the transports the mode opens.
        if let Some(mode) = mode {
            let grpc = mode
                .needs_grpc()
                .then(|| parse_listen_addr(&self.grpc.addr))
                .transpose()
                .unwrap_or_else(|e| {
                    errs.push(format!("grpc.addr: {e}"));
                    None
                });
            let http = mode
                .needs_http()
                .then(|| parse_listen_addr(&self.http.addr))
                .transpose()
                .unwrap_or_else(|e| {
                    errs.push(format!("http.addr: {e}"));
                    None
                });

            if let (Some(grpc), Some(http)) = (grpc, http) {
                if grpc.port() != 0 && grpc.port() == http.port() {
                    errs.push(format!(
                        "grpc.addr and http.addr must use different ports (both use {})",
                        grpc.port()
                    ));
                }
            }
        }

        if errs.is_empty() {
            Ok(())
        } else {
            Err(OpsxError::InvalidConfig(errs))
        }
    }

    /// Validate and convert into the runtime [`Config`].
    pub fn config(&self) -> Result<Config> {
        self.validate()?;

        let server_mode: ServerMode = self.server_mode.parse()?;
        let grpc = if server_mode.needs_grpc() {
            Some(ListenOptions::new(&self.grpc.addr, self.grpc.timeout)?)
        } else {
            None
        };
        let http = if server_mode.needs_http() {
            Some(ListenOptions::new(&self.http.addr, self.http.timeout)?)
        } else {
            None
        };

        Ok(Config {
            server_mode,
            jwt_key: self.jwt_key.clone(),
            expiration: self.expiration,
            shutdown_timeout: self.shutdown_timeout,
            grpc,
            http,
        })
    }
}

/// A resolved listen address plus its timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenOptions {
    pub addr: SocketAddr,
    pub timeout: Option<Duration>,
}

impl ListenOptions {
    pub fn new(addr: &str, timeout: Option<Duration>) -> Result<Self> {
        let addr = parse_listen_addr(addr).map_err(OpsxError::Configuration)?;
        Ok(Self { addr, timeout })
    }
}

/// Runtime configuration. Built once at startup and never mutated.
///
/// `grpc` and `http` are present exactly when the mode opens that
/// transport.
#[derive(Clone)]
pub struct Config {
    pub server_mode: ServerMode,
    pub jwt_key: String,
    pub expiration: Duration,
    pub shutdown_timeout: Duration,
    pub grpc: Option<ListenOptions>,
    pub http: Option<ListenOptions>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("server_mode", &self.server_mode)
            .field("jwt_key", &"<redacted>")
            .field("expiration", &self.expiration)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("grpc", &self.grpc)
            .field("http", &self.http)
            .finish()
    }
}

/// Parse a listen address.
///
/// Accepts `ip:port`, `host:port` and the all-interfaces shorthand `:port`.
/// Host names are resolved once, here; IPv4 results are preferred.
pub fn parse_listen_addr(raw: &str) -> std::result::Result<SocketAddr, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("address must not be empty".to_string());
    }
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return Ok(addr);
    }

    let Some((host, port)) = raw.rsplit_once(':') else {
        return Err(format!("invalid address {raw:?}: missing port"));
    };
    let port = port
        .parse::<u16>()
        .map_err(|e| format!("invalid port in address {raw:?}: {e}"))?;
    if host.is_empty() {
        return Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)));
    }
    if host.contains(':') {
        return Err(format!("invalid address {raw:?}: IPv6 hosts need brackets"));
    }

    let resolved: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| format!("cannot resolve {host:?} in address {raw:?}: {e}"))?
        .collect();
    resolved
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| resolved.first())
        .copied()
        .ok_or_else(|| format!("{host:?} in address {raw:?} resolved to nothing"))
}
