use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Timeouts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How long suspended round trips wait before surfacing a timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Plain iq round trips: disco#info queries and status publishes.
    #[serde(default = "d_iq_secs")]
    pub iq_secs: u64,
    /// Outbound channel requests awaiting their reply or error.
    #[serde(default = "d_request_secs")]
    pub request_secs: u64,
}

impl TimeoutConfig {
    pub fn iq(&self) -> Duration {
        Duration::from_secs(self.iq_secs)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            iq_secs: d_iq_secs(),
            request_secs: d_request_secs(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_iq_secs() -> u64 {
    30
}
fn d_request_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_defaults() {
        let cfg = TimeoutConfig::default();
        assert_eq!(cfg.iq(), Duration::from_secs(30));
        assert_eq!(cfg.request(), Duration::from_secs(60));
    }

    #[test]
    fn timeout_parses_partial_override() {
        let cfg: TimeoutConfig = toml::from_str("request_secs = 5").unwrap();
        assert_eq!(cfg.request_secs, 5);
        assert_eq!(cfg.iq_secs, 30);
    }
}
