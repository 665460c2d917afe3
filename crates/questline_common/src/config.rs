//! Engine configuration.
//!
//! TOML file with every field optional; missing fields fall back to
//! defaults so an empty file is a valid config. Values are sanitized after
//! load: the confidence threshold is clamped to [0, 1] and the leveling
//! step to at least 1.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::leveling::{LevelCurve, DEFAULT_XP_PER_LEVEL};

/// Default acceptance threshold for oracle confidence.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.75;

fn default_xp_per_level() -> u64 {
    DEFAULT_XP_PER_LEVEL
}

fn default_confidence_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_oracle_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_oracle_model() -> String {
    "llama3.2:3b".to_string()
}

fn default_oracle_timeout_secs() -> u64 {
    30
}

/// Leveling curve settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelingConfig {
    #[serde(default = "default_xp_per_level")]
    pub xp_per_level: u64,
}

impl Default for LevelingConfig {
    fn default() -> Self {
        Self {
            xp_per_level: default_xp_per_level(),
        }
    }
}

/// Verification policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Applied uniformly regardless of mission difficulty.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

/// Oracle backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_oracle_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_oracle_model")]
    pub model: String,
    #[serde(default = "default_oracle_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoint: default_oracle_endpoint(),
            model: default_oracle_model(),
            timeout_secs: default_oracle_timeout_secs(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub leveling: LevelingConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
}

impl EngineConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        let config: EngineConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config: {}", path.display()))?;
        Ok(config.sanitized())
    }

    /// Clamp values into their valid ranges.
    pub fn sanitized(mut self) -> Self {
        self.leveling.xp_per_level = self.leveling.xp_per_level.max(1);
        let threshold = self.verification.confidence_threshold;
        self.verification.confidence_threshold = if threshold.is_finite() {
            threshold.clamp(0.0, 1.0)
        } else {
            DEFAULT_CONFIDENCE_THRESHOLD
        };
        self
    }

    pub fn level_curve(&self) -> LevelCurve {
        LevelCurve::new(self.leveling.xp_per_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.leveling.xp_per_level, 100);
        assert_eq!(config.verification.confidence_threshold, 0.75);
        assert_eq!(config.oracle.timeout_secs, 30);
    }

    #[test]
    fn test_empty_file_is_valid() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config.leveling.xp_per_level, 100);
    }

    #[test]
    fn test_partial_file_overrides() {
        let config: EngineConfig = toml::from_str(
            r#"
            [verification]
            confidence_threshold = 0.9

            [oracle]
            model = "qwen3:8b"
            "#,
        )
        .unwrap();
        assert_eq!(config.verification.confidence_threshold, 0.9);
        assert_eq!(config.oracle.model, "qwen3:8b");
        assert_eq!(config.oracle.endpoint, "http://localhost:11434");
    }

    #[test]
    fn test_sanitize_clamps_threshold_and_step() {
        let config: EngineConfig = toml::from_str(
            r#"
            [leveling]
            xp_per_level = 0

            [verification]
            confidence_threshold = 3.5
            "#,
        )
        .unwrap();

        let config = config.sanitized();
        assert_eq!(config.leveling.xp_per_level, 1);
        assert_eq!(config.verification.confidence_threshold, 1.0);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[leveling]\nxp_per_level = 250").unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.leveling.xp_per_level, 250);
        assert_eq!(config.level_curve().xp_required_for_level(2), 500);
    }

    #[test]
    fn test_missing_file_errors() {
        assert!(EngineConfig::load(Path::new("/nonexistent/questline.toml")).is_err());
    }
}
