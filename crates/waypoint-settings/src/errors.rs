//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why the relay's settings could not be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The file (or the merged result) is not valid settings JSON.
    #[error("malformed settings: {0}")]
    Json(#[from] serde_json::Error),
    /// A setting parsed but would leave the relay unable to run.
    #[error("{setting} {requirement}")]
    InvalidValue {
        /// Dotted camelCase key, as written in `settings.json`.
        setting: &'static str,
        /// What the value must satisfy.
        requirement: &'static str,
    },
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_value_names_the_setting() {
        let err = SettingsError::InvalidValue {
            setting: "relay.targetUpdateRate",
            requirement: "must be at least 1",
        };
        assert_eq!(err.to_string(), "relay.targetUpdateRate must be at least 1");
    }

    #[test]
    fn read_error_includes_path() {
        let err = SettingsError::Read {
            path: PathBuf::from("/etc/waypoint/settings.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let text = err.to_string();
        assert!(text.contains("/etc/waypoint/settings.json"));
        assert!(text.contains("denied"));
    }
}
