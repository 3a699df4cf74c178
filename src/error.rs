// SPDX-License-Identifier: MIT

//! Typed error handling for ledstate-rs
//!
//! `StateError` is what the state service hands back to its callers.
//! `ConfigError` covers loading the store layout, and `LedError` is what
//! starting the HTTP server can fail with.

use std::io;
use std::path::Path;

use thiserror::Error;

/// Top-level error type for serving ledstate-rs
#[derive(Debug, Error)]
pub enum LedError {
    /// Configuration errors (bad YAML, invalid layout)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors outside the store (listener bind, accept loop)
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors returned by the state service
#[derive(Debug, Error)]
pub enum StateError {
    /// Proposed color or count failed validation; nothing was read or written
    #[error("{0}")]
    InvalidInput(String),

    /// The stored revision is already the largest representable one
    #[error("revision {0} cannot be advanced further")]
    RevisionExhausted(u64),

    /// The filesystem could not complete a required write
    #[error("storage unavailable: {context}: {source}")]
    StorageUnavailable {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl StateError {
    /// Create an invalid input error
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput(reason.into())
    }

    /// Create a storage error for an operation on `path`
    pub fn storage(action: &str, path: &Path, source: io::Error) -> Self {
        Self::StorageUnavailable {
            context: format!("{} {}", action, path.display()),
            source,
        }
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

/// Reasons a persisted record was discarded and reinitialized.
///
/// Never returned as an error; carried inside the store's load outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Corruption {
    /// The file exists but could not be read
    #[error("state file unreadable: {0}")]
    Unreadable(String),

    /// The content is not valid JSON
    #[error("state file is not valid JSON: {0}")]
    Malformed(String),

    /// Valid JSON, but not an object
    #[error("state file does not contain a JSON object")]
    NotAnObject,

    /// A present field has the wrong type or an out-of-domain value
    #[error("field '{field}' is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Parsed but semantically invalid
    #[error("{0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_storage_error_message() {
        let err = StateError::storage(
            "replace",
            &PathBuf::from("data/state.json"),
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.starts_with("storage unavailable: replace data/state.json"));
        assert!(msg.ends_with("denied"));
        assert!(!err.is_invalid_input());
    }

    #[test]
    fn test_invalid_input_is_bare_reason() {
        let err = StateError::invalid_input("invalid color, use format #RRGGBB");
        assert_eq!(err.to_string(), "invalid color, use format #RRGGBB");
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_led_error_from_config_error() {
        let err: LedError = ConfigError::Invalid("bad listen address".into()).into();
        assert!(matches!(err, LedError::Config(ConfigError::Invalid(_))));
        assert_eq!(err.to_string(), "Configuration error: bad listen address");
    }

    #[test]
    fn test_corruption_display() {
        let c = Corruption::InvalidField {
            field: "count",
            reason: "expected an integer".into(),
        };
        assert_eq!(c.to_string(), "field 'count' is invalid: expected an integer");
    }
}
