mod channels;
mod identity;
mod timeouts;

pub use channels::*;
pub use identity::*;
pub use timeouts::*;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub channels: ChannelConfig,
}

impl Config {
    /// Load a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&raw).map_err(|e| Error::Config(e.to_string()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.identity.jid.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "identity.jid".into(),
                message: "no jid configured; local status echoes key under an empty contact"
                    .into(),
            });
        }

        if self.identity.caps_node.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "identity.caps_node".into(),
                message: "caps node URI must not be empty".into(),
            });
        }

        if self.identity.category.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "identity.category".into(),
                message: "identity category must not be empty".into(),
            });
        }

        if self.timeouts.iq_secs == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "timeouts.iq_secs".into(),
                message: "iq timeout must be greater than 0".into(),
            });
        }

        if self.timeouts.request_secs == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "timeouts.request_secs".into(),
                message: "request timeout must be greater than 0".into(),
            });
        }

        if self.channels.max_pending_per_contact == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "channels.max_pending_per_contact".into(),
                message: "per-contact channel cap must be greater than 0".into(),
            });
        }

        if self.channels.max_pending_global < self.channels.max_pending_per_contact {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "channels.max_pending_global".into(),
                message: "global channel cap is below the per-contact cap".into(),
            });
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_reads_a_full_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overlay.toml");
        std::fs::write(
            &path,
            r#"
            [identity]
            jid = "laptop@example.com/desk"
            name = "My Client 2.0"

            [timeouts]
            request_secs = 5

            [channels]
            max_pending_per_contact = 4
        "#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.identity.jid, "laptop@example.com/desk");
        assert_eq!(config.identity.name, "My Client 2.0");
        assert_eq!(config.identity.category, "client");
        assert_eq!(config.identity.caps_node, "http://ytstenut.org/overlay");
        assert_eq!(config.timeouts.request_secs, 5);
        assert_eq!(config.timeouts.iq_secs, 30);
        assert_eq!(config.channels.max_pending_per_contact, 4);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn load_surfaces_missing_file_and_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::load(dir.path().join("nope.toml")),
            Err(Error::Io(_))
        ));

        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "identity = 12").unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Config(_))));
    }
}
