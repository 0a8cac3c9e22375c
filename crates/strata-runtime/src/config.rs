// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Runtime configuration.
//!
//! Layers, later ones winning: built-in defaults, the user file
//! (`<config dir>/strata/strata.toml`), `./strata.toml`, then `STRATA_*`
//! environment variables.

use crate::error::{Result, RuntimeError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the project configuration file
pub const CONFIG_FILE: &str = "strata.toml";

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "STRATA_";

/// Configuration for a runtime instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Whether hot updates are accepted
    pub hot_reload: bool,

    /// Install the tracing plugin on construction
    pub log_plugin: bool,

    /// Maximum number of modules on the execution stack
    pub max_execution_depth: usize,

    /// Suffixes tried when a path does not match exactly
    pub extensions: Vec<String>,

    /// Exact aliases (request -> target)
    pub aliases: BTreeMap<String, String>,

    /// Prefix aliases (prefix -> replacement)
    pub prefix_aliases: BTreeMap<String, String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            hot_reload: true,
            log_plugin: false,
            max_execution_depth: 1024,
            extensions: vec![".js".to_string(), "/index.js".to_string()],
            aliases: BTreeMap::new(),
            prefix_aliases: BTreeMap::new(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from default locations.
    pub fn load() -> Result<Self> {
        let mut config = RuntimeConfig::default();

        if let Some(user_config_path) = user_config_path() {
            if user_config_path.exists() {
                config.merge_from_file(&user_config_path)?;
            }
        }

        let project_config = PathBuf::from(CONFIG_FILE);
        if project_config.exists() {
            config.merge_from_file(&project_config)?;
        }

        config.apply_env(std::env::vars());
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from one file on top of the defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut config = RuntimeConfig::default();
        config.merge_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a complete TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: RuntimeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| RuntimeError::Config(e.to_string()))
    }

    /// Merge configuration from a file. Alias tables are extended; scalar
    /// keys present in the file replace the current value.
    pub fn merge_from_file(&mut self, path: &Path) -> Result<()> {
        debug!("Merging configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        let table: toml::Table = toml::from_str(&content)?;
        self.merge_table(table)
    }

    fn merge_table(&mut self, table: toml::Table) -> Result<()> {
        for (key, value) in table {
            match key.as_str() {
                "aliases" => self.aliases.extend(string_table(&key, value)?),
                "prefix_aliases" => self.prefix_aliases.extend(string_table(&key, value)?),
                "extensions" => {
                    self.extensions = value
                        .try_into()
                        .map_err(|e: toml::de::Error| RuntimeError::Config(format!("extensions: {}", e)))?;
                }
                "max_execution_depth" => {
                    let depth = value
                        .as_integer()
                        .filter(|n| *n > 0)
                        .ok_or_else(|| RuntimeError::Config("max_execution_depth must be a positive integer".into()))?;
                    self.max_execution_depth = depth as usize;
                }
                "hot_reload" => self.hot_reload = bool_value(&key, &value)?,
                "log_plugin" => self.log_plugin = bool_value(&key, &value)?,
                _ => warn!("Ignoring unknown configuration key '{}'", key),
            }
        }
        Ok(())
    }

    /// Apply `STRATA_*` variables from an iterator of `(name, value)`
    pub fn apply_env<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix(ENV_PREFIX) {
                self.set(&config_key.to_lowercase(), &value);
            }
        }
    }

    /// Set a scalar configuration value from its string form
    pub fn set(&mut self, key: &str, value: &str) {
        match key {
            "hot_reload" => self.hot_reload = value == "true" || value == "1",
            "log_plugin" => self.log_plugin = value == "true" || value == "1",
            "max_execution_depth" => {
                if let Ok(n) = value.parse() {
                    self.max_execution_depth = n;
                }
            }
            "extensions" => {
                self.extensions = value
                    .split(',')
                    .map(str::trim)
                    .filter(|ext| !ext.is_empty())
                    .map(String::from)
                    .collect();
            }
            _ => debug!("Ignoring unknown configuration variable '{}'", key),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_execution_depth == 0 {
            return Err(RuntimeError::Config("max_execution_depth must be at least 1".into()));
        }
        if self.aliases.keys().any(|k| k.is_empty()) || self.prefix_aliases.keys().any(|k| k.is_empty()) {
            return Err(RuntimeError::Config("alias keys must not be empty".into()));
        }
        Ok(())
    }
}

fn string_table(key: &str, value: toml::Value) -> Result<BTreeMap<String, String>> {
    value
        .try_into()
        .map_err(|e: toml::de::Error| RuntimeError::Config(format!("{}: {}", key, e)))
}

fn bool_value(key: &str, value: &toml::Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| RuntimeError::Config(format!("{} must be a boolean", key)))
}

/// Per-user configuration file
fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("strata").join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert!(config.hot_reload);
        assert_eq!(config.extensions, vec![".js", "/index.js"]);
        assert_eq!(config.max_execution_depth, 1024);
    }

    #[test]
    fn test_from_toml_str() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            hot_reload = false

            [prefix_aliases]
            "@components/" = "src/components/"
            "#,
        )
        .unwrap();
        assert!(!config.hot_reload);
        assert_eq!(config.prefix_aliases["@components/"], "src/components/");
        // Untouched keys keep their defaults
        assert_eq!(config.max_execution_depth, 1024);
    }

    #[test]
    fn test_merge_from_file_extends_aliases() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            max_execution_depth = 16
            [aliases]
            dog = "3"
            "#
        )
        .unwrap();

        let mut config = RuntimeConfig::default();
        config.aliases.insert("cat".into(), "4".into());
        config.merge_from_file(file.path()).unwrap();

        assert_eq!(config.aliases.len(), 2);
        assert_eq!(config.max_execution_depth, 16);
    }

    #[test]
    fn test_merge_rejects_bad_types() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "hot_reload = \"yes\"").unwrap();
        assert!(matches!(
            RuntimeConfig::from_file(file.path()),
            Err(RuntimeError::Config(_))
        ));
    }

    #[test]
    fn test_apply_env() {
        let mut config = RuntimeConfig::default();
        config.apply_env(vec![
            ("STRATA_HOT_RELOAD".to_string(), "false".to_string()),
            ("STRATA_EXTENSIONS".to_string(), ".mjs, .js".to_string()),
            ("OTHER_VAR".to_string(), "ignored".to_string()),
        ]);
        assert!(!config.hot_reload);
        assert_eq!(config.extensions, vec![".mjs", ".js"]);
    }

    #[test]
    fn test_zero_depth_rejected() {
        assert!(RuntimeConfig::from_toml_str("max_execution_depth = 0").is_err());
    }

    #[test]
    fn test_toml_round_trip_of_defaults() {
        let text = RuntimeConfig::default().to_toml_string().unwrap();
        assert_eq!(RuntimeConfig::from_toml_str(&text).unwrap(), RuntimeConfig::default());
    }
}
