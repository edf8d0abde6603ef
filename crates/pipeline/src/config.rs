//! Dynamic configuration: feature flags and tunables looked up at runtime.
//!
//! Properties are dotted keys such as
//! `tasks.monitor-kato-task.kubernetes.deploy-manifest.retry-task`. They come
//! from a YAML document (nested maps are flattened) and, when enabled, from
//! environment variables named after the key with `.` and `-` replaced by `_`
//! (`TASKS_MONITOR_KATO_TASK_..._RETRY_TASK`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Config root must be a mapping")]
    NotAMapping,
}

/// Runtime lookups of flags and tunables.
pub trait DynamicConfig: Send + Sync {
    /// Whether `flag` is on. Reads `<flag>.enabled`, then `<flag>`.
    fn is_enabled(&self, flag: &str, default: bool) -> bool;

    fn get_bool(&self, key: &str, default: bool) -> bool;

    fn get_i64(&self, key: &str, default: i64) -> i64;

    fn get_string(&self, key: &str, default: &str) -> String;
}

/// [`DynamicConfig`] backed by a flat property map.
#[derive(Debug, Clone, Default)]
pub struct PropertyConfig {
    properties: HashMap<String, Value>,
    env_overrides: bool,
}

impl PropertyConfig {
    /// Empty config: every lookup returns its default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten a JSON/YAML tree into dotted properties.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let mut properties = HashMap::new();
        if let Value::Object(map) = value {
            for (key, value) in map {
                flatten_into(&mut properties, key, value);
            }
        }
        Self {
            properties,
            env_overrides: false,
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_yaml::from_str(yaml)?;
        match value {
            Value::Null => Ok(Self::new()),
            Value::Object(_) => Ok(Self::from_value(&value)),
            _ => Err(ConfigError::NotAMapping),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded dynamic config");
        Self::from_yaml_str(&contents)
    }

    /// Let environment variables override file properties.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        self.env_overrides = true;
        self
    }

    /// Set a property.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Number of file/explicit properties.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    fn lookup(&self, key: &str) -> Option<Value> {
        if self.env_overrides {
            if let Ok(value) = std::env::var(env_key(key)) {
                return Some(Value::String(value));
            }
        }
        self.properties.get(key).cloned()
    }
}

impl DynamicConfig for PropertyConfig {
    fn is_enabled(&self, flag: &str, default: bool) -> bool {
        self.lookup(&format!("{flag}.enabled"))
            .or_else(|| self.lookup(flag))
            .and_then(|value| as_bool(&value))
            .unwrap_or(default)
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.lookup(key)
            .and_then(|value| as_bool(&value))
            .unwrap_or(default)
    }

    fn get_i64(&self, key: &str, default: i64) -> i64 {
        self.lookup(key)
            .and_then(|value| match value {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .unwrap_or(default)
    }

    fn get_string(&self, key: &str, default: &str) -> String {
        match self.lookup(key) {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => default.to_string(),
        }
    }
}

fn flatten_into(properties: &mut HashMap<String, Value>, prefix: &str, value: &Value) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, nested) in map {
                flatten_into(properties, &format!("{prefix}.{key}"), nested);
            }
        }
        _ => {
            properties.insert(prefix.to_string(), value.clone());
        }
    }
}

fn env_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '.' | '-' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
