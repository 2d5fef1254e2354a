//! Group configuration loaded from TOML.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::gameloop::GameLoopGroup;

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Configuration for one game loop group.
///
/// ```toml
/// id = "world"
/// loops = 8
///
/// [tick]
/// initial_delay_ms = 0
/// period_ms = 50
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Group id; member loops are named `"<id>-<index>"`.
    #[serde(default = "default_group_id")]
    pub id: String,

    /// Number of loops; omitted means one per available CPU.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loops: Option<usize>,

    /// Periodic tick cadence.
    #[serde(default)]
    pub tick: TickConfig,
}

/// Cadence of the periodic tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickConfig {
    #[serde(default)]
    pub initial_delay_ms: u64,

    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
}

fn default_group_id() -> String {
    "gyre".to_string()
}

fn default_period_ms() -> u64 {
    50
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            id: default_group_id(),
            loops: None,
            tick: TickConfig::default(),
        }
    }
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 0,
            period_ms: default_period_ms(),
        }
    }
}

impl GroupConfig {
    /// Parse a group config from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Spawn the configured group. Ticking is not started; call
    /// [`GroupConfig::start`] or run each loop yourself.
    pub fn build(&self) -> GameLoopGroup {
        match self.loops {
            Some(count) => GameLoopGroup::with_loop_count(&self.id, count),
            None => GameLoopGroup::new(&self.id),
        }
    }

    /// Spawn the configured group and start the periodic tick on every
    /// member loop.
    pub fn start(&self) -> GameLoopGroup {
        let group = self.build();
        for game_loop in group.select_all() {
            game_loop.run(self.tick.initial_delay(), self.tick.period());
        }
        group
    }
}

impl TickConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GroupConfig::from_toml("").unwrap();
        assert_eq!(config.id, "gyre");
        assert_eq!(config.loops, None);
        assert_eq!(config.tick.period(), Duration::from_millis(50));
        assert_eq!(config.tick.initial_delay(), Duration::ZERO);
    }

    #[test]
    fn test_explicit_values() {
        let config = GroupConfig::from_toml(
            r#"
            id = "world"
            loops = 2

            [tick]
            initial_delay_ms = 10
            period_ms = 25
            "#,
        )
        .unwrap();
        assert_eq!(config.id, "world");
        assert_eq!(config.loops, Some(2));
        assert_eq!(config.tick.initial_delay(), Duration::from_millis(10));
        assert_eq!(config.tick.period(), Duration::from_millis(25));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        assert!(GroupConfig::from_toml("loops = \"many\"").is_err());
    }

    #[tokio::test]
    async fn test_start_spawns_ticking_group() {
        let config = GroupConfig::from_toml(
            r#"
            id = "cfg"
            loops = 2

            [tick]
            period_ms = 20
            "#,
        )
        .unwrap();

        let group = config.start();
        assert_eq!(group.len(), 2);
        for game_loop in group.select_all() {
            assert_eq!(game_loop.tick_period(), Some(Duration::from_millis(20)));
        }
        group.shutdown();
        assert!(group.await_termination(Duration::from_secs(5)).await);
    }
}
