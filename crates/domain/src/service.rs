use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A service discovered on (or published by) a contact: an application
/// exposing a bundle of capabilities. The service id itself
/// (e.g. `org.gnome.Banshee`) is the key under which descriptors are
/// stored, not a field here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Service type, `"application"` unless the capability form says otherwise.
    pub service_type: String,
    /// Localized display names, locale tag → name.
    pub names: BTreeMap<String, String>,
    /// Capability URNs the service exposes.
    pub capabilities: BTreeSet<String>,
}

impl ServiceDescriptor {
    pub fn new(service_type: impl Into<String>) -> Self {
        Self {
            service_type: service_type.into(),
            names: BTreeMap::new(),
            capabilities: BTreeSet::new(),
        }
    }

    pub fn with_name(mut self, locale: impl Into<String>, name: impl Into<String>) -> Self {
        self.names.insert(locale.into(), name.into());
        self
    }

    pub fn with_capability(mut self, urn: impl Into<String>) -> Self {
        self.capabilities.insert(urn.into());
        self
    }
}

/// A service registered by the local peer for publication, together with
/// the remote capabilities it wants pubsub notifications for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalService {
    pub id: String,
    #[serde(flatten)]
    pub descriptor: ServiceDescriptor,
    /// Capability URNs this service subscribes to; each one is advertised
    /// as a `{urn}+notify` feature so peers' servers fan events our way.
    #[serde(default)]
    pub interests: BTreeSet<String>,
}

fn service_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Reverse-DNS tokens: dot-separated identifier segments, at least two.
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*(\.[A-Za-z_][A-Za-z0-9_-]*)+$").unwrap()
    })
}

/// Validate a service name (`org.gnome.Banshee`, `the.target.service`).
///
/// Slashes, spaces, and other punctuation are rejected, as are single-segment
/// names and segments starting with a digit.
pub fn validate_service_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Validation("service name is empty".into()));
    }
    if !service_name_re().is_match(name) {
        return Err(Error::Validation(format!(
            "invalid service name: {name:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_reverse_dns_names() {
        for name in [
            "org.gnome.Banshee",
            "the.target.service",
            "com.example.app-2",
            "a.b",
        ] {
            assert!(validate_service_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_bad_names() {
        for name in [
            "",
            "banshee",
            "lol/bags/what's this?!!!!",
            "org..gnome",
            ".org.gnome",
            "org.gnome.",
            "org gnome",
            "9th.service",
        ] {
            assert!(validate_service_name(name).is_err(), "{name:?}");
        }
    }

    #[test]
    fn descriptor_builder() {
        let d = ServiceDescriptor::new("application")
            .with_name("en_GB", "Banshee Media Player")
            .with_capability("urn:ytstenut:capabilities:yts-caps-audio");
        assert_eq!(d.service_type, "application");
        assert_eq!(d.names["en_GB"], "Banshee Media Player");
        assert!(d
            .capabilities
            .contains("urn:ytstenut:capabilities:yts-caps-audio"));
    }
}
