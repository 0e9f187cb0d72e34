use std::time::Duration;

use crate::attention::{bounded_cap, DEFAULT_ATTENTION_CAP};
use crate::slo::DEFAULT_SLO_TARGET;

/// Runtime configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: String,
    pub api_token: Option<String>,
    pub refresh_secs: u64,
    pub feed_timeout_ms: u64,
    pub history_window: usize,
    pub attention_cap: usize,
    pub slo_target: f64,
    pub debounce_ms: u64,
    pub hit_radius_px: f64,
    pub prefs_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000".to_string(),
            api_token: None,
            refresh_secs: 60,
            feed_timeout_ms: 8_000,
            history_window: 20,
            attention_cap: DEFAULT_ATTENTION_CAP,
            slo_target: DEFAULT_SLO_TARGET,
            debounce_ms: 200,
            hit_radius_px: 20.0,
            prefs_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            api_base: std::env::var("PIPEWATCH_API_BASE").unwrap_or(d.api_base),
            api_token: std::env::var("API_TOKEN").ok().filter(|t| !t.is_empty()),
            refresh_secs: std::env::var("REFRESH_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.refresh_secs),
            feed_timeout_ms: std::env::var("FEED_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.feed_timeout_ms),
            history_window: std::env::var("HISTORY_WINDOW").ok().and_then(|v| v.parse().ok()).filter(|w| *w > 0).unwrap_or(d.history_window),
            attention_cap: bounded_cap(std::env::var("ATTENTION_CAP").ok().and_then(|v| v.parse().ok()).unwrap_or(d.attention_cap)),
            slo_target: std::env::var("SLO_TARGET").ok().and_then(|v| v.parse().ok()).unwrap_or(d.slo_target),
            debounce_ms: std::env::var("DEBOUNCE_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.debounce_ms),
            hit_radius_px: std::env::var("HIT_RADIUS_PX").ok().and_then(|v| v.parse().ok()).unwrap_or(d.hit_radius_px),
            prefs_path: std::env::var("PREFS_PATH").ok().filter(|p| !p.is_empty()),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_secs.max(1))
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_millis(self.feed_timeout_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.refresh_interval(), Duration::from_secs(60));
        assert_eq!(cfg.feed_timeout(), Duration::from_secs(8));
        assert_eq!(cfg.history_window, 20);
        assert_eq!(cfg.attention_cap, 8);
        assert_eq!(cfg.debounce(), Duration::from_millis(200));
        assert_eq!(cfg.hit_radius_px, 20.0);
    }

    #[test]
    fn test_attention_cap_env_is_bounded() {
        std::env::set_var("ATTENTION_CAP", "50");
        assert_eq!(Config::from_env().attention_cap, 8);
        std::env::set_var("ATTENTION_CAP", "0");
        assert_eq!(Config::from_env().attention_cap, 1);
        std::env::set_var("ATTENTION_CAP", "5");
        assert_eq!(Config::from_env().attention_cap, 5);
        std::env::remove_var("ATTENTION_CAP");
    }
}
