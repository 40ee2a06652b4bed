//! Command-line flags mirroring the option keys.
//!
//! Every flag also reads an `OPSX_*` environment variable named after its
//! key (`grpc.addr` → `OPSX_GRPC_ADDR`). A flag on the command line beats
//! its variable; either beats the config file.

use clap::Args;
use serde_yaml::Value;

/// Per-option flags. Unset flags leave lower layers untouched.
#[derive(Debug, Clone, Default, Args)]
pub struct ServerFlags {
    /// Server mode: grpc, grpc-gateway or gin.
    #[arg(long, env = "OPSX_SERVER_MODE", value_name = "MODE")]
    pub server_mode: Option<String>,

    /// JWT signing key. Must be at least 6 characters long.
    #[arg(long, env = "OPSX_JWT_KEY", value_name = "KEY", hide_env_values = true)]
    pub jwt_key: Option<String>,

    /// The expiration duration of JWT tokens (e.g. "2h").
    #[arg(long, env = "OPSX_EXPIRATION", value_name = "DURATION")]
    pub expiration: Option<String>,

    /// Upper bound on graceful shutdown (e.g. "10s").
    #[arg(long, env = "OPSX_SHUTDOWN_TIMEOUT", value_name = "DURATION")]
    pub shutdown_timeout: Option<String>,

    /// gRPC listen address (e.g. ":7701").
    #[arg(long = "grpc.addr", env = "OPSX_GRPC_ADDR", value_name = "ADDR")]
    pub grpc_addr: Option<String>,

    /// gRPC per-call timeout.
    #[arg(long = "grpc.timeout", env = "OPSX_GRPC_TIMEOUT", value_name = "DURATION")]
    pub grpc_timeout: Option<String>,

    /// HTTP listen address (e.g. ":7700").
    #[arg(long = "http.addr", env = "OPSX_HTTP_ADDR", value_name = "ADDR")]
    pub http_addr: Option<String>,

    /// Deadline for each gateway call into gRPC.
    #[arg(long = "http.timeout", env = "OPSX_HTTP_TIMEOUT", value_name = "DURATION")]
    pub http_timeout: Option<String>,

    /// Log level or filter directive (overridden by RUST_LOG).
    #[arg(long = "log.level", env = "OPSX_LOG_LEVEL", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Log output format: console or json.
    #[arg(long = "log.format", env = "OPSX_LOG_FORMAT", value_name = "FORMAT")]
    pub log_format: Option<String>,

    /// Omit source file and line from log events.
    #[arg(
        long = "log.disable-caller",
        env = "OPSX_LOG_DISABLE_CALLER",
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub log_disable_caller: Option<bool>,

    /// Omit the event target and span context from log events.
    #[arg(
        long = "log.disable-stacktrace",
        env = "OPSX_LOG_DISABLE_STACKTRACE",
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub log_disable_stacktrace: Option<bool>,

    /// Colorize console output.
    #[arg(
        long = "log.enable-color",
        env = "OPSX_LOG_ENABLE_COLOR",
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub log_enable_color: Option<bool>,

    /// Log destinations: stdout, stderr or file paths, comma separated.
    #[arg(
        long = "log.output-paths",
        env = "OPSX_LOG_OUTPUT_PATHS",
        value_name = "PATH",
        value_delimiter = ','
    )]
    pub log_output_paths: Option<Vec<String>>,
}

impl ServerFlags {
    /// `(option key, value)` pairs for every flag that was given.
    pub fn overrides(&self) -> Vec<(&'static str, Value)> {
        let strings = [
            ("server-mode", &self.server_mode),
            ("jwt-key", &self.jwt_key),
            ("expiration", &self.expiration),
            ("shutdown-timeout", &self.shutdown_timeout),
            ("grpc.addr", &self.grpc_addr),
            ("grpc.timeout", &self.grpc_timeout),
            ("http.addr", &self.http_addr),
            ("http.timeout", &self.http_timeout),
            ("log.level", &self.log_level),
            ("log.format", &self.log_format),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.clone().map(|v| (key, Value::String(v))));

        let bools = [
            ("log.disable-caller", self.log_disable_caller),
            ("log.disable-stacktrace", self.log_disable_stacktrace),
            ("log.enable-color", self.log_enable_color),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, Value::Bool(v))));

        let paths = self.log_output_paths.iter().map(|paths| {
            let seq = paths.iter().cloned().map(Value::String).collect();
            ("log.output-paths", Value::Sequence(seq))
        });

        strings.chain(bools).chain(paths).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{CommandFactory, Parser};

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        flags: ServerFlags,
    }

    /// `.` and `-` both map to `_`: `log.output-paths` → `OPSX_LOG_OUTPUT_PATHS`.
    fn env_var_name(key: &str) -> String {
        format!("OPSX_{}", key.replace(['.', '-'], "_").to_uppercase())
    }

    fn text(value: &str) -> Value {
        Value::String(value.to_string())
    }

    #[test]
    fn no_flags_no_overrides() {
        assert!(ServerFlags::default().overrides().is_empty());
    }

    #[test]
    fn dotted_flags_parse() {
        let cli = Cli::try_parse_from([
            "opsx-core",
            "--server-mode",
            "grpc",
            "--grpc.addr",
            ":9000",
            "--http.timeout",
            "2s",
        ])
        .unwrap();
        assert_eq!(
            cli.flags.overrides(),
            vec![
                ("server-mode", text("grpc")),
                ("grpc.addr", text(":9000")),
                ("http.timeout", text("2s")),
            ]
        );
    }

    #[test]
    fn unknown_mode_is_left_to_validation() {
        // Rejected later together with every other violation.
        let cli = Cli::try_parse_from(["opsx-core", "--server-mode", "rest"]).unwrap();
        assert_eq!(cli.flags.server_mode.as_deref(), Some("rest"));
    }

    #[test]
    fn bare_bool_flag_means_true() {
        let cli = Cli::try_parse_from([
            "opsx-core",
            "--log.disable-caller",
            "--log.enable-color=false",
        ])
        .unwrap();
        assert_eq!(cli.flags.log_disable_caller, Some(true));
        assert_eq!(cli.flags.log_enable_color, Some(false));
        assert_eq!(cli.flags.log_disable_stacktrace, None);
        assert_eq!(
            cli.flags.overrides(),
            vec![
                ("log.disable-caller", Value::Bool(true)),
                ("log.enable-color", Value::Bool(false)),
            ]
        );
    }

    #[test]
    fn output_paths_split_on_commas() {
        let cli =
            Cli::try_parse_from(["opsx-core", "--log.output-paths", "stdout,/var/log/opsx.log"])
                .unwrap();
        assert_eq!(
            cli.flags.overrides(),
            vec![(
                "log.output-paths",
                Value::Sequence(vec![text("stdout"), text("/var/log/opsx.log")]),
            )]
        );
    }

    #[test]
    fn every_flag_reads_its_env_var() {
        let cmd = Cli::command();
        let mut seen = 0;
        for arg in cmd.get_arguments() {
            let Some(long) = arg.get_long() else { continue };
            if matches!(long, "help" | "version") {
                continue;
            }
            let env = arg.get_env().and_then(|e| e.to_str());
            assert_eq!(env, Some(env_var_name(long).as_str()), "--{long}");
            seen += 1;
        }
        assert_eq!(seen, 14);
    }

    #[test]
    fn env_var_names() {
        assert_eq!(env_var_name("server-mode"), "OPSX_SERVER_MODE");
        assert_eq!(env_var_name("grpc.addr"), "OPSX_GRPC_ADDR");
        assert_eq!(env_var_name("log.output-paths"), "OPSX_LOG_OUTPUT_PATHS");
    }
}
