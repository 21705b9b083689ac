//! Layered configuration.
//!
//! Values start from built-in defaults, are replaced by the first JSON config
//! file found, and finally by `DATABUS_*` environment variables.
//!
//! ```json
//! {
//!   "api": { "base_url": "https://api.databus.cr", "timeout": 30, "api_key": "..." },
//!   "logging": { "level": "debug" }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{DatabusError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.databus.cr";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout: u64,
    pub max_retries: u32,
    pub api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: 30,
            max_retries: 3,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_path: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Default lookup locations, in priority order.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(home) = std::env::var_os("HOME") {
            paths.push(PathBuf::from(home).join(".databus").join("config.json"));
        }
        paths.push(PathBuf::from("databus.json"));
        paths.push(PathBuf::from(".databusrc"));
        paths
    }

    /// Loads configuration from `explicit` or the default locations, then
    /// applies process environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_from(explicit, &Self::search_paths(), |key| std::env::var(key).ok())
    }

    /// Same as [`Config::load`] with the search list and environment supplied
    /// by the caller.
    pub fn load_from(
        explicit: Option<&Path>,
        search_paths: &[PathBuf],
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let candidate = explicit
            .map(Path::to_path_buf)
            .into_iter()
            .chain(search_paths.iter().cloned())
            .find(|p| p.is_file());

        let mut config = match candidate {
            Some(path) => Self::from_file(&path)?,
            None => {
                if let Some(path) = explicit {
                    warn!(path = %path.display(), "Config file not found, using defaults");
                }
                Self::default()
            }
        };

        config.apply_env(env);
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content).map_err(|e| {
            DatabusError::Configuration(format!("Failed to load config from {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(url) = env("DATABUS_API_URL") {
            self.api.base_url = url;
        }
        if let Some(key) = env("DATABUS_API_KEY") {
            self.api.api_key = Some(key);
        }
        if let Some(timeout) = env("DATABUS_API_TIMEOUT") {
            match timeout.trim().parse() {
                Ok(t) => self.api.timeout = t,
                Err(_) => warn!(value = %timeout, "Ignoring non-integer DATABUS_API_TIMEOUT"),
            }
        }
        if let Some(level) = env("DATABUS_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Writes the configuration as pretty JSON, creating parent directories.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Looks up a dotted key such as `api.timeout`.
    pub fn get(&self, key: &str) -> Option<Value> {
        let root = serde_json::to_value(self).ok()?;
        key.split('.')
            .try_fold(&root, |node, part| node.get(part))
            .cloned()
    }

    /// Sets a dotted key such as `api.timeout`. The key must already exist and
    /// the value must fit its type.
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let mut root = serde_json::to_value(&*self)?;
        let slot = key
            .split('.')
            .try_fold(&mut root, |node, part| node.get_mut(part))
            .ok_or_else(|| DatabusError::Configuration(format!("unknown config key '{key}'")))?;
        *slot = value;

        *self = serde_json::from_value(root).map_err(|e| {
            DatabusError::Configuration(format!("invalid value for '{key}': {e}"))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::env;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(name)
    }

    #[test]
    fn test_defaults() {
        let config = Config::load_from(None, &[], no_env).unwrap();
        assert_eq!(config.api.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.api.timeout, 30);
        assert_eq!(config.api.max_retries, 3);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let path = temp_path("databus_test_partial.json");
        fs::write(&path, r#"{"api": {"timeout": 5}}"#).unwrap();

        let config = Config::load_from(Some(path.as_path()), &[], no_env).unwrap();
        assert_eq!(config.api.timeout, 5);
        assert_eq!(config.api.base_url, DEFAULT_BASE_URL);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_first_existing_search_path_wins() {
        let first = temp_path("databus_test_missing.json");
        let second = temp_path("databus_test_second.json");
        let _ = fs::remove_file(&first);
        fs::write(&second, r#"{"logging": {"level": "debug"}}"#).unwrap();

        let config = Config::load_from(None, &[first, second.clone()], no_env).unwrap();
        assert_eq!(config.logging.level, "debug");

        fs::remove_file(&second).unwrap();
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("DATABUS_API_URL", "http://localhost:8080"),
            ("DATABUS_API_KEY", "secret"),
            ("DATABUS_API_TIMEOUT", "abc"),
            ("DATABUS_LOG_LEVEL", "warn"),
        ]
        .into_iter()
        .collect();

        let config =
            Config::load_from(None, &[], |k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.api.base_url, "http://localhost:8080");
        assert_eq!(config.api.api_key.as_deref(), Some("secret"));
        assert_eq!(config.api.timeout, 30);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_invalid_file_is_configuration_error() {
        let path = temp_path("databus_test_invalid.json");
        fs::write(&path, "{ not json").unwrap();

        let err = Config::load_from(Some(path.as_path()), &[], no_env).unwrap_err();
        assert!(matches!(err, DatabusError::Configuration(_)));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_set() {
        let mut config = Config::default();
        config.set("api.timeout", Value::from(45)).unwrap();
        assert_eq!(config.api.timeout, 45);
        assert_eq!(config.get("api.timeout"), Some(Value::from(45)));

        assert!(config.set("api.timeout", Value::from("soon")).is_err());
        assert!(config.set("api.missing", Value::from(1)).is_err());
        assert_eq!(config.api.timeout, 45);
    }

    #[test]
    fn test_save_and_get() {
        let path = temp_path("databus_test_dir/config.json");
        let mut config = Config::default();
        config.api.max_retries = 7;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.get("api.max_retries"), Some(Value::from(7)));
        assert_eq!(loaded.get("logging.level"), Some(Value::from("info")));
        assert_eq!(loaded.get("api.nope"), None);

        fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }
}
