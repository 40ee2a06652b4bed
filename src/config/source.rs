//! Where options come from.
//!
//! Layers, lowest precedence first:
//! 1. built-in defaults ([`ServerOptions::default`])
//! 2. the YAML file: `--config <path>`, else `~/.opsx/<service>.yaml`,
//!    else `./<service>.yaml`
//! 3. [`ServerFlags`], each filled from its command-line flag or, failing
//!    that, its `OPSX_*` environment variable
//!
//! Layers 2-3 are merged as a YAML value tree before a single
//! deserialisation, so every layer goes through the same parsing rules.

use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use tracing::{debug, info};

use super::{ServerFlags, ServerOptions};
use crate::{OpsxError, Result};

/// Directory under `$HOME` holding per-service config files.
pub const DEFAULT_CONFIG_DIR: &str = ".opsx";

/// Options together with the file they were read from.
#[derive(Debug, Clone)]
pub struct LoadedOptions {
    pub options: ServerOptions,
    /// `None` when no config file was found and only defaults and flags
    /// apply.
    pub path: Option<PathBuf>,
}

/// Config file lookup for one service binary.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    service: String,
    explicit: Option<PathBuf>,
    home: Option<PathBuf>,
    cwd: PathBuf,
}

impl ConfigSource {
    /// Lookup for `service` (e.g. `opsx-core`), honouring an explicit path.
    pub fn new(service: impl Into<String>, explicit: Option<PathBuf>) -> Self {
        Self {
            service: service.into(),
            explicit,
            home: dirs::home_dir(),
            cwd: PathBuf::from("."),
        }
    }

    /// Override the home and working directories used for the search.
    pub fn with_search_roots(mut self, home: Option<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        self.home = home;
        self.cwd = cwd.into();
        self
    }

    /// `<service>.yaml`
    pub fn file_name(&self) -> String {
        format!("{}.yaml", self.service)
    }

    /// Directories searched when no explicit path is given, in order.
    pub fn search_dirs(&self) -> Vec<PathBuf> {
        self.home
            .iter()
            .map(|home| home.join(DEFAULT_CONFIG_DIR))
            .chain(std::iter::once(self.cwd.clone()))
            .collect()
    }

    /// Resolve the config file path.
    ///
    /// An explicit path that does not exist is an error; a missing file in
    /// the search directories is not.
    pub fn resolve(&self) -> Result<Option<PathBuf>> {
        if let Some(path) = &self.explicit {
            if path.exists() {
                return Ok(Some(path.clone()));
            }
            return Err(OpsxError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        let name = self.file_name();
        Ok(self
            .search_dirs()
            .into_iter()
            .map(|dir| dir.join(&name))
            .find(|candidate| candidate.exists()))
    }

    /// Load options: the config file overlaid with `flags`.
    pub fn load(&self, flags: &ServerFlags) -> Result<LoadedOptions> {
        let path = self.resolve()?;
        let mut tree = match &path {
            Some(path) => {
                info!(path = %path.display(), "using config file");
                read_tree(path)?
            }
            None => {
                info!(file = %self.file_name(), "no config file found, using defaults");
                Mapping::new()
            }
        };

        for (key, value) in flags.overrides() {
            debug!(key, "option overridden by flag or environment");
            set_path(&mut tree, key, value);
        }

        let options = serde_yaml::from_value(Value::Mapping(tree)).map_err(|e| {
            OpsxError::Configuration(match &path {
                Some(path) => format!("Failed to parse config file {path:?}: {e}"),
                None => format!("Failed to parse options: {e}"),
            })
        })?;

        Ok(LoadedOptions { options, path })
    }
}

fn read_tree(path: &Path) -> Result<Mapping> {
    let content = fs::read_to_string(path).map_err(|e| {
        OpsxError::Configuration(format!("Failed to read config file {path:?}: {e}"))
    })?;
    let value: Value = serde_yaml::from_str(&content).map_err(|e| {
        OpsxError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
    })?;
    match value {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(map) => Ok(map),
        _ => Err(OpsxError::Configuration(format!(
            "Config file {path:?} must contain a mapping at the top level"
        ))),
    }
}

/// Set a dotted key (`grpc.addr`) in a mapping, creating parents as needed.
fn set_path(root: &mut Mapping, dotted: &str, value: Value) {
    let mut parts = dotted.split('.').peekable();
    let mut current = root;
    while let Some(part) = parts.next() {
        let key = Value::String(part.to_string());
        if parts.peek().is_none() {
            current.insert(key, value);
            return;
        }
        if !matches!(current.get(&key), Some(Value::Mapping(_))) {
            current.insert(key.clone(), Value::Mapping(Mapping::new()));
        }
        let Some(Value::Mapping(next)) = current.get_mut(&key) else {
            return;
        };
        current = next;
    }
}
