//! Structured logging setup.
//!
//! Installs a global `tracing-subscriber` fmt subscriber. `RUST_LOG` always
//! wins over the configured level so operators can raise verbosity without
//! editing the config file.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

use crate::{OpsxError, Result};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Console,
    /// One JSON object per event.
    Json,
}

/// Logging options (`log.*` keys).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LogOptions {
    /// Level or filter directive, e.g. `info` or `opsx=debug,tower=warn`.
    pub level: String,
    pub format: LogFormat,
    /// Drop source file and line from events.
    pub disable_caller: bool,
    /// Drop the event target and, in JSON, the enclosing spans.
    pub disable_stacktrace: bool,
    /// ANSI colors in console output.
    pub enable_color: bool,
    /// `stdout`, `stderr` or file paths (appended to). Every event goes to
    /// each destination.
    pub output_paths: Vec<String>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Console,
            disable_caller: false,
            disable_stacktrace: false,
            enable_color: false,
            output_paths: vec!["stdout".to_string()],
        }
    }
}

impl LogOptions {
    /// Filter from `RUST_LOG`, falling back to the configured level.
    pub fn filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .map_err(|e| OpsxError::Logging(format!("invalid log level {:?}: {e}", self.level)))
    }

    /// Writer fanning out to every output path. No paths means stdout.
    pub fn writer(&self) -> Result<BoxMakeWriter> {
        let mut combined: Option<BoxMakeWriter> = None;
        for path in &self.output_paths {
            let next = match path.as_str() {
                "stdout" => BoxMakeWriter::new(std::io::stdout),
                "stderr" => BoxMakeWriter::new(std::io::stderr),
                file => open_log_file(Path::new(file))?,
            };
            combined = Some(match combined {
                Some(prev) => BoxMakeWriter::new(prev.and(next)),
                None => next,
            });
        }
        Ok(combined.unwrap_or_else(|| BoxMakeWriter::new(std::io::stdout)))
    }
}

fn open_log_file(path: &Path) -> Result<BoxMakeWriter> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| OpsxError::Logging(format!("cannot open log file {path:?}: {e}")))?;
    Ok(BoxMakeWriter::new(Arc::new(file)))
}

/// Install the global subscriber.
pub fn init(opts: &LogOptions) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(opts.filter()?)
        .with_writer(opts.writer()?)
        .with_ansi(opts.enable_color)
        .with_file(!opts.disable_caller)
        .with_line_number(!opts.disable_caller)
        .with_target(!opts.disable_stacktrace);
    match opts.format {
        LogFormat::Console => builder.try_init(),
        LogFormat::Json => builder
            .json()
            .with_current_span(!opts.disable_stacktrace)
            .with_span_list(!opts.disable_stacktrace)
            .try_init(),
    }
    .map_err(|e| OpsxError::Logging(e.to_string()))
}
