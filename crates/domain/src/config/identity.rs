use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Local identity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How the local peer introduces itself in disco#info replies and the
/// presence caps element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Our own address. Used to key the local echo of status
    /// advertisements; stanza routing itself belongs to the transport.
    #[serde(default)]
    pub jid: String,
    /// Client node URI advertised in `<c node="…"/>`; the disco query for
    /// our capabilities targets `{caps_node}#{ver}`.
    #[serde(default = "d_caps_node")]
    pub caps_node: String,
    /// Disco identity category (`client` for end-user peers).
    #[serde(default = "d_category")]
    pub category: String,
    /// Disco identity type within the category.
    #[serde(default = "d_client_type")]
    pub client_type: String,
    /// Human-readable client name for the identity element.
    #[serde(default = "d_client_name")]
    pub name: String,
    /// Language tag for the identity element; empty means untagged.
    #[serde(default = "d_lang")]
    pub lang: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            jid: String::new(),
            caps_node: d_caps_node(),
            category: d_category(),
            client_type: d_client_type(),
            name: d_client_name(),
            lang: d_lang(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_caps_node() -> String {
    "http://ytstenut.org/overlay".into()
}
fn d_category() -> String {
    "client".into()
}
fn d_client_type() -> String {
    "pc".into()
}
fn d_client_name() -> String {
    "yts-overlay".into()
}
fn d_lang() -> String {
    "en".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_defaults() {
        let cfg = IdentityConfig::default();
        assert_eq!(cfg.caps_node, "http://ytstenut.org/overlay");
        assert_eq!(cfg.category, "client");
        assert_eq!(cfg.client_type, "pc");
    }

    #[test]
    fn identity_parses_overrides() {
        let toml_str = r#"
            caps_node = "http://example.com/my-client"
            name = "My Client 2.0"
        "#;
        let cfg: IdentityConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.caps_node, "http://example.com/my-client");
        assert_eq!(cfg.name, "My Client 2.0");
        // untouched fields keep their defaults
        assert_eq!(cfg.category, "client");
    }
}
