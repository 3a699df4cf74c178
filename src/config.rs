// SPDX-License-Identifier: MIT

//! Configuration - storage layout and server settings
//!
//! The storage layout can come from an optional YAML file; every key is
//! optional and falls back to the defaults below. Server settings come from
//! the command line (see `main.rs`).

use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Where and under which names the state record lives on disk
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Directory holding the state file
    pub data_dir: PathBuf,
    /// Current file name inside `data_dir`
    pub state_file: String,
    /// Earlier file names, checked in order when `state_file` is absent
    pub legacy_files: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            state_file: "state.json".to_string(),
            legacy_files: vec!["state.jsonq".to_string(), "state.txt".to_string()],
        }
    }
}

impl StoreConfig {
    /// Default layout rooted at `data_dir`
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self::default().with_data_dir(data_dir)
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Load a layout from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse_yaml(&content)
    }

    /// Parse and validate a layout from a YAML string
    pub fn parse_yaml(content: &str) -> Result<Self, ConfigError> {
        // An empty document means "all defaults"
        let config = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str::<Self>(content)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_file_name("state_file", &self.state_file)?;
        for legacy in &self.legacy_files {
            check_file_name("legacy_files", legacy)?;
            if legacy == &self.state_file {
                return Err(ConfigError::Invalid(format!(
                    "legacy_files must not contain the state file '{}'",
                    legacy
                )));
            }
        }
        Ok(())
    }

    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join(&self.state_file)
    }

    /// Legacy candidates in lookup order
    pub fn legacy_paths(&self) -> Vec<PathBuf> {
        self.legacy_files
            .iter()
            .map(|name| self.data_dir.join(name))
            .collect()
    }
}

fn check_file_name(key: &str, name: &str) -> Result<(), ConfigError> {
    let bare = Path::new(name).file_name() == Some(OsStr::new(name));
    if name.is_empty() || !bare {
        return Err(ConfigError::Invalid(format!(
            "{} entry '{}' must be a plain file name",
            key, name
        )));
    }
    Ok(())
}

/// HTTP listener and surface settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory of front-end assets served for non-API paths
    pub static_dir: Option<PathBuf>,
    /// Origins allowed to call `/api/*`; empty allows any origin
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            static_dir: None,
            allowed_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("invalid listen address '{}': {}", self.host, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let config = StoreConfig::default();
        assert_eq!(config.state_path(), PathBuf::from("data/state.json"));
        assert_eq!(
            config.legacy_paths(),
            vec![
                PathBuf::from("data/state.jsonq"),
                PathBuf::from("data/state.txt")
            ]
        );
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
data_dir: /var/lib/ledstate
legacy_files:
  - led.json
"#;
        let config = StoreConfig::parse_yaml(yaml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/ledstate"));
        assert_eq!(config.state_file, "state.json");
        assert_eq!(config.legacy_files, vec!["led.json"]);
    }

    #[test]
    fn test_parse_empty_yaml_is_default() {
        assert_eq!(StoreConfig::parse_yaml("").unwrap(), StoreConfig::default());
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let err = StoreConfig::parse_yaml("stat_file: x.json").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn test_rejects_paths_as_names() {
        let err = StoreConfig::parse_yaml("state_file: ../state.json").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = StoreConfig::parse_yaml("legacy_files: [\"old/state.txt\"]").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_state_file_in_legacy_list() {
        let yaml = "state_file: a.json\nlegacy_files: [b.json, a.json]";
        let err = StoreConfig::parse_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("a.json"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = StoreConfig::load("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_socket_addr() {
        let config = ServerConfig::default();
        assert_eq!(config.socket_addr().unwrap().port(), 5000);

        let bad = ServerConfig {
            host: "not a host".into(),
            ..ServerConfig::default()
        };
        assert!(bad.socket_addr().is_err());
    }
}
