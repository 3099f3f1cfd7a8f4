//! Dotted-key configuration store
//!
//! Configuration files use the same object syntax as test files, without
//! method blocks:
//!
//! ```text
//! url = "http://localhost:8080"
//! http {
//!   timeout: 10
//!   verify: off
//! }
//! ```
//!
//! `@name` references in test files read from this store. It is built once
//! before any test runs and only read afterwards.

use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::errors::{VouchError, VouchResult};
use crate::evaluator::value::Value;
use crate::parser::Parser;
use crate::resolver::resolve_node;

/// Base URL prepended to every request path
pub const URL: &str = "url";
/// Directory or file to run when none is given on the command line
pub const PATH: &str = "path";
/// Request timeout in seconds
pub const HTTP_TIMEOUT: &str = "http.timeout";
/// Whether TLS certificates are verified
pub const HTTP_VERIFY: &str = "http.verify";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration values addressed by dotted keys such as `http.timeout`
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    root: Value,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

fn split(key: &str) -> Vec<&str> {
    key.split('.').collect()
}

impl Config {
    pub fn new() -> Self {
        Self {
            root: Value::Object(IndexMap::new()),
        }
    }

    /// Parse configuration source text
    pub fn from_source(source: &str) -> VouchResult<Self> {
        let entries = Parser::new(source).parse_entries()?;
        let mut config = Config::new();
        for entry in entries {
            if !entry.op.is_assignment() {
                return Err(VouchError::config_error(format!(
                    "'{}' uses '{}'; configuration entries take ':' or '='",
                    entry.key.text, entry.op
                )));
            }
            let value = resolve_node(&entry.value).to_plain_value();
            config.merge_at(&entry.key.text, value);
        }
        Ok(config)
    }

    /// Load a configuration file; a missing file is an empty configuration
    pub fn load(path: &Path) -> VouchResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Config::new());
        }
        let source = std::fs::read_to_string(path).map_err(|e| {
            VouchError::io_error(format!("failed to read '{}': {}", path.display(), e))
        })?;
        debug!(path = %path.display(), "loaded configuration");
        Config::from_source(&source)
    }

    /// Get the value at a dotted key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.root.get_path(&split(key))
    }

    /// Get the value at a dotted key, or `default` when absent
    pub fn get_or<'a>(&'a self, key: &str, default: &'a Value) -> &'a Value {
        self.get(key).unwrap_or(default)
    }

    /// Set a value, creating intermediate objects
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.root.set_path(&split(key), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.root.remove_path(&split(key))
    }

    /// Deep-merge another configuration into this one; `other` wins
    pub fn merge(&mut self, other: Config) {
        self.root.merge(other.root);
    }

    /// Number of top-level keys
    pub fn len(&self) -> usize {
        self.root.as_object().map_or(0, IndexMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every leaf key in dotted form
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        collect_keys(&self.root, String::new(), &mut keys);
        keys
    }

    /// Base URL, empty when not configured
    pub fn url(&self) -> String {
        self.get(URL).map(Value::to_text).unwrap_or_default()
    }

    /// Request timeout; non-positive or out-of-range values use the default
    pub fn timeout(&self) -> Duration {
        let default = Duration::from_secs(DEFAULT_TIMEOUT_SECS);
        let secs = match self.get(HTTP_TIMEOUT) {
            Some(Value::Int(n)) if *n > 0 => *n as f64,
            Some(Value::Float(f)) if *f > 0.0 => *f,
            _ => return default,
        };
        Duration::try_from_secs_f64(secs).unwrap_or_else(|e| {
            warn!(secs, error = %e, "ignoring unusable {}", HTTP_TIMEOUT);
            default
        })
    }

    pub fn verify(&self) -> bool {
        !matches!(self.get(HTTP_VERIFY), Some(Value::Bool(false)))
    }

    fn merge_at(&mut self, key: &str, value: Value) {
        let mut overlay = Value::Object(IndexMap::new());
        overlay.set_path(&split(key), value);
        self.root.merge(overlay);
    }
}

fn collect_keys(value: &Value, prefix: String, keys: &mut Vec<String>) {
    match value {
        Value::Object(obj) if !obj.is_empty() => {
            for (k, v) in obj {
                let path = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{}.{}", prefix, k)
                };
                collect_keys(v, path, keys);
            }
        }
        _ if !prefix.is_empty() => keys.push(prefix),
        _ => {}
    }
}
