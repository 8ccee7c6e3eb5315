//! Crate configuration.
//!
//! Defaults come from environment variables (`DIALECTIC_*`); a TOML file can
//! override any subset of fields.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::protocol::HardLimits;
use crate::selection::SelectorConfig;

/// Top-level configuration for the dialectic service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DialecticConfig {
    /// Directory for the durable session store.
    pub store_path: PathBuf,
    /// Synthesis round limit for new sessions.
    pub max_synthesis_rounds: u32,
    /// A session idle longer than this is reaped (seconds).
    pub inactivity_threshold_secs: i64,
    /// Background reaper cadence (seconds).
    pub reaper_interval_secs: u64,
    /// TTL for the eligibility read cache (seconds).
    pub cache_ttl_secs: u64,
    /// Reviewer eligibility thresholds and windows.
    pub selector: SelectorConfig,
    /// Absolute safety thresholds checked at finalize.
    pub hard_limits: HardLimits,
}

impl Default for DialecticConfig {
    fn default() -> Self {
        Self {
            store_path: std::env::var("DIALECTIC_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./dialectic-state")),
            max_synthesis_rounds: std::env::var("DIALECTIC_MAX_ROUNDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            inactivity_threshold_secs: std::env::var("DIALECTIC_INACTIVITY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            reaper_interval_secs: 60,
            cache_ttl_secs: 30,
            selector: SelectorConfig::default(),
            hard_limits: HardLimits::default(),
        }
    }
}

impl DialecticConfig {
    /// Load configuration from a TOML file, filling unset fields from the
    /// environment-aware defaults.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    /// Inactivity threshold as a chrono duration.
    pub fn inactivity_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.inactivity_threshold_secs)
    }

    /// Cache TTL as a std duration.
    pub fn cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cache_ttl_secs)
    }

    /// Reaper cadence as a std duration.
    pub fn reaper_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.reaper_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DialecticConfig::default();
        assert_eq!(config.max_synthesis_rounds, 3);
        assert_eq!(config.inactivity_threshold_secs, 300);
        assert_eq!(config.cache_ttl_secs, 30);
        assert_eq!(config.selector.anti_collusion_window_secs, 24 * 60 * 60);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let parsed: DialecticConfig = toml::from_str(
            r#"
            max_synthesis_rounds = 5
            inactivity_threshold_secs = 120

            [hard_limits]
            min_coherence = 0.4
            max_attention_score = 0.8
            block_on_void = true
            "#,
        )
        .unwrap();
        assert_eq!(parsed.max_synthesis_rounds, 5);
        assert_eq!(parsed.inactivity_threshold_secs, 120);
        assert!((parsed.hard_limits.min_coherence - 0.4).abs() < f64::EPSILON);
        // Untouched fields keep their defaults.
        assert_eq!(parsed.cache_ttl_secs, 30);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let err = DialecticConfig::load(std::path::Path::new("/nonexistent/dialectic.toml"))
            .unwrap_err();
        assert!(err.to_string().contains("reading config file"));
    }

    #[test]
    fn test_duration_accessors() {
        let config = DialecticConfig::default();
        assert_eq!(config.inactivity_threshold().num_seconds(), 300);
        assert_eq!(config.cache_ttl().as_secs(), 30);
        assert_eq!(config.reaper_interval().as_secs(), 60);
    }
}
