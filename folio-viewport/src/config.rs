use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

/// Timing and sizing knobs for the engine. Durations are written as integer
/// milliseconds in the TOML form.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// How many pages on each side of a visible page get materialized.
    pub preload_buffer: u32,
    /// User scrolling is considered finished after this much quiet time.
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub scroll_quiet_period: Duration,
    /// Debounce applied before a visible-page candidate becomes the current page.
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub visible_report_delay: Duration,
    /// How long an explicit scroll target suppresses repeat requests to it.
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub scroll_target_reset: Duration,
    /// Wait before retrying a fit that is missing page geometry.
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub geometry_retry_delay: Duration,
    /// Minimum visible ratio for a page to count as a current-page candidate.
    pub visibility_threshold: f32,
    pub min_zoom_percent: f32,
    pub max_zoom_percent: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            preload_buffer: 2,
            scroll_quiet_period: Duration::from_millis(300),
            visible_report_delay: Duration::from_millis(200),
            scroll_target_reset: Duration::from_millis(300),
            geometry_retry_delay: Duration::from_millis(125),
            visibility_threshold: 0.5,
            min_zoom_percent: 10.0,
            max_zoom_percent: 1600.0,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("failed to parse engine config as TOML")
    }

    /// Missing file means defaults, matching a fresh install.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml_str(&raw)
    }

    pub fn clamp_percent(&self, percent: f32) -> f32 {
        percent.clamp(self.min_zoom_percent, self.max_zoom_percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.preload_buffer, 2);
        assert_eq!(config.scroll_quiet_period, Duration::from_millis(300));
        assert_eq!(config.visible_report_delay, Duration::from_millis(200));
        assert_eq!(config.scroll_target_reset, Duration::from_millis(300));
        assert_eq!(config.geometry_retry_delay, Duration::from_millis(125));
        assert_eq!(config.visibility_threshold, 0.5);
    }

    #[test]
    fn partial_toml_overrides_keep_remaining_defaults() {
        let config = EngineConfig::from_toml_str(
            "preload_buffer = 4\nscroll_quiet_period = 450\n",
        )
        .unwrap();
        assert_eq!(config.preload_buffer, 4);
        assert_eq!(config.scroll_quiet_period, Duration::from_millis(450));
        assert_eq!(config.visible_report_delay, Duration::from_millis(200));
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(EngineConfig::from_toml_str("preload_buffer = \"lots\"").is_err());
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn config_round_trips_through_toml() {
        let mut config = EngineConfig::default();
        config.preload_buffer = 3;
        config.visible_report_delay = Duration::from_millis(250);
        let raw = toml::to_string(&config).unwrap();
        assert_eq!(EngineConfig::from_toml_str(&raw).unwrap(), config);
    }

    #[test]
    fn percent_clamp_uses_configured_bounds() {
        let config = EngineConfig::default();
        assert_eq!(config.clamp_percent(5.0), 10.0);
        assert_eq!(config.clamp_percent(150.0), 150.0);
        assert_eq!(config.clamp_percent(5000.0), 1600.0);
    }
}
