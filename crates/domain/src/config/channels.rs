use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Channels
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// In-flight message-channel limits. A request past either cap is
/// rejected locally before any stanza goes out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "d_max_per_contact")]
    pub max_pending_per_contact: usize,
    #[serde(default = "d_max_global")]
    pub max_pending_global: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_pending_per_contact: d_max_per_contact(),
            max_pending_global: d_max_global(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_max_per_contact() -> usize {
    32
}
fn d_max_global() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_defaults() {
        let cfg = ChannelConfig::default();
        assert_eq!(cfg.max_pending_per_contact, 32);
        assert_eq!(cfg.max_pending_global, 256);
    }

    #[test]
    fn channel_parses_caps() {
        let cfg: ChannelConfig = toml::from_str(
            r#"
            max_pending_per_contact = 4
            max_pending_global = 16
        "#,
        )
        .unwrap();
        assert_eq!(cfg.max_pending_per_contact, 4);
        assert_eq!(cfg.max_pending_global, 16);
    }
}
