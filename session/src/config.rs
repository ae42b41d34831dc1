use serde::{Deserialize, Serialize};

fn default_history_limit() -> usize {
    32
}

/// Session tuning, deserializable from the embedding server's TOML config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Snapshot generations retained for backtracking. The oldest are
    /// evicted beyond this; rewinding to an evicted generation fails.
    /// Full-tree snapshots are cheap here (recording is opt-in per field),
    /// but long sessions still need a bound.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
        }
    }
}

impl SessionConfig {
    pub fn from_toml(source: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(source)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::from_toml("").unwrap();
        assert_eq!(config.history_limit, 32);
    }

    #[test]
    fn test_from_toml() {
        let config = SessionConfig::from_toml("history_limit = 5").unwrap();
        assert_eq!(config.history_limit, 5);
    }
}
