//! Engine configuration
//!
//! Every tunable of the scorers, the emitter and the offload bridge lives
//! here. Files are TOML; any omitted field falls back to its default, so an
//! empty file is a valid configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{ConfigError, WEIGHT_TOLERANCE};

/// CII component weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CiiWeights {
    pub unrest: f64,
    pub conflict: f64,
    pub security: f64,
    pub information: f64,
}

impl Default for CiiWeights {
    fn default() -> Self {
        Self {
            unrest: 0.25,
            conflict: 0.30,
            security: 0.20,
            information: 0.25,
        }
    }
}

impl CiiWeights {
    pub fn sum(&self) -> f64 {
        self.unrest + self.conflict + self.security + self.information
    }
}

/// Escalation component weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationWeights {
    pub news: f64,
    pub cii: f64,
    pub geo: f64,
    pub military: f64,
}

impl Default for EscalationWeights {
    fn default() -> Self {
        Self {
            news: 0.35,
            cii: 0.25,
            geo: 0.25,
            military: 0.15,
        }
    }
}

impl EscalationWeights {
    pub fn sum(&self) -> f64 {
        self.news + self.cii + self.geo + self.military
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstabilityConfig {
    pub weights: CiiWeights,
    /// Baseline share of the blend once a country is active
    pub baseline_weight: f64,
    /// Baseline share of the blend during warmup
    pub warmup_baseline_weight: f64,
    pub warmup_minutes: i64,
    pub trend_deadband: f64,
    pub warmup_trend_deadband: f64,
    /// Hotspot proximity boost fades to zero at this distance
    pub proximity_radius_km: f64,
    pub history_hours: i64,
    pub history_max_samples: usize,
}

impl Default for InstabilityConfig {
    fn default() -> Self {
        Self {
            weights: CiiWeights::default(),
            baseline_weight: 0.4,
            warmup_baseline_weight: 0.6,
            warmup_minutes: 15,
            trend_deadband: 5.0,
            warmup_trend_deadband: 10.0,
            proximity_radius_km: 200.0,
            history_hours: 24,
            history_max_samples: 96,
        }
    }
}

impl InstabilityConfig {
    pub fn warmup(&self) -> Duration {
        Duration::minutes(self.warmup_minutes)
    }

    pub fn history_window(&self) -> Duration {
        Duration::hours(self.history_hours)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    pub weights: EscalationWeights,
    /// Static baseline share of the combined score
    pub baseline_weight: f64,
    /// CII value assumed when the hotspot's country has no score
    pub default_cii: f64,
    pub history_hours: i64,
    pub max_samples: usize,
    /// Alert-scale level that triggers on upward crossing
    pub critical_score: f64,
    /// Alert-scale floor below which nothing is emitted
    pub minimum_emit_score: f64,
    /// Alert-scale slope per sample counted as rapid increase
    pub rapid_increase: f64,
    /// Alert-scale slope per sample separating stable from trending
    pub trend_threshold: f64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            weights: EscalationWeights::default(),
            baseline_weight: 0.3,
            default_cii: 30.0,
            history_hours: 24,
            max_samples: 48,
            critical_score: 4.5,
            minimum_emit_score: 2.0,
            rapid_increase: 0.5,
            trend_threshold: 0.1,
        }
    }
}

impl EscalationConfig {
    pub fn history_window(&self) -> Duration {
        Duration::hours(self.history_hours)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergenceConfig {
    pub threshold_km: f64,
    pub min_types: usize,
    /// Events older than this are not clustered
    pub event_window_hours: i64,
    /// Clusters at or above this score become signal candidates
    pub signal_min_score: f64,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            threshold_km: 100.0,
            min_types: crate::GEO_CONVERGENCE_THRESHOLD,
            event_window_hours: 24,
            signal_min_score: 75.0,
        }
    }
}

impl ConvergenceConfig {
    pub fn event_window(&self) -> Duration {
        Duration::hours(self.event_window_hours)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurgeConfig {
    pub baseline_hours: i64,
    pub retention_hours: i64,
    pub purge_interval_minutes: i64,
    /// Below this many samples the category floors apply
    pub min_samples: usize,
    pub surge_multiple: f64,
    pub base_radius_km: f64,
    pub foreign_presence_min: u32,
}

impl Default for SurgeConfig {
    fn default() -> Self {
        Self {
            baseline_hours: 48,
            retention_hours: 72,
            purge_interval_minutes: 60,
            min_samples: 6,
            surge_multiple: 2.0,
            base_radius_km: 150.0,
            foreign_presence_min: 2,
        }
    }
}

impl SurgeConfig {
    pub fn baseline_window(&self) -> Duration {
        Duration::hours(self.baseline_hours)
    }

    pub fn retention(&self) -> Duration {
        Duration::hours(self.retention_hours)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::minutes(self.purge_interval_minutes)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterConfig {
    /// Identical dedupe keys are suppressed for this long
    pub dedupe_ttl_minutes: i64,
    pub default_cooldown_minutes: i64,
    pub escalation_cooldown_minutes: i64,
    pub surge_cooldown_minutes: i64,
    /// Published signals kept for inspection
    pub max_recent: usize,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            dedupe_ttl_minutes: 30,
            default_cooldown_minutes: 30,
            escalation_cooldown_minutes: 120,
            surge_cooldown_minutes: 120,
            max_recent: 200,
        }
    }
}

impl EmitterConfig {
    pub fn dedupe_ttl(&self) -> Duration {
        Duration::minutes(self.dedupe_ttl_minutes)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OffloadConfig {
    /// Round-trip timeout per request
    pub timeout_ms: u64,
    /// Retries after a timeout before giving up
    pub max_retries: u32,
    /// How long to wait for a unit's ready frame
    pub ready_timeout_ms: u64,
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_retries: 1,
            ready_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Refresh cadence of the run loop
    pub tick_interval_ms: u64,
    /// Ship CII and convergence batches to offload units
    pub use_offload: bool,
    /// Capacity of the signal broadcast channel
    pub signal_channel_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 60_000,
            use_offload: true,
            signal_channel_capacity: 256,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub engine: EngineSettings,
    pub instability: InstabilityConfig,
    pub escalation: EscalationConfig,
    pub convergence: ConvergenceConfig,
    pub surge: SurgeConfig,
    pub emitter: EmitterConfig,
    pub offload: OffloadConfig,
}

impl EngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_weights("instability.weights", self.instability.weights.sum())?;
        check_weights("escalation.weights", self.escalation.weights.sum())?;

        check_fraction("instability.baseline_weight", self.instability.baseline_weight)?;
        check_fraction(
            "instability.warmup_baseline_weight",
            self.instability.warmup_baseline_weight,
        )?;
        check_fraction("escalation.baseline_weight", self.escalation.baseline_weight)?;

        check_positive("instability.history_hours", self.instability.history_hours as f64)?;
        check_positive("escalation.history_hours", self.escalation.history_hours as f64)?;
        check_positive("convergence.threshold_km", self.convergence.threshold_km)?;
        check_positive("surge.baseline_hours", self.surge.baseline_hours as f64)?;
        check_positive("surge.retention_hours", self.surge.retention_hours as f64)?;
        check_positive("surge.surge_multiple", self.surge.surge_multiple)?;
        check_positive("offload.timeout_ms", self.offload.timeout_ms as f64)?;
        check_positive("engine.tick_interval_ms", self.engine.tick_interval_ms as f64)?;

        if self.escalation.max_samples == 0 {
            return Err(ConfigError::InvalidValue {
                field: "escalation.max_samples",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.surge.retention_hours < self.surge.baseline_hours {
            return Err(ConfigError::InvalidValue {
                field: "surge.retention_hours",
                reason: "must cover the baseline window".to_string(),
            });
        }

        Ok(())
    }
}

fn check_weights(section: &'static str, sum: f64) -> Result<(), ConfigError> {
    if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(ConfigError::WeightSum { section, sum });
    }
    Ok(())
}

fn check_fraction(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::InvalidValue {
            field,
            reason: format!("{} is outside [0, 1]", value),
        });
    }
    Ok(())
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_nan() || value <= 0.0 {
        return Err(ConfigError::InvalidValue {
            field,
            reason: format!("{} must be positive", value),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_sum_to_one() {
        assert!((CiiWeights::default().sum() - 1.0).abs() < WEIGHT_TOLERANCE);
        assert!((EscalationWeights::default().sum() - 1.0).abs() < WEIGHT_TOLERANCE);
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = EngineConfig::from_toml_str(
            r#"
            [convergence]
            threshold_km = 50.0

            [offload]
            max_retries = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.convergence.threshold_km, 50.0);
        assert_eq!(config.convergence.min_types, 3);
        assert_eq!(config.offload.max_retries, 3);
        assert_eq!(config.offload.timeout_ms, 10_000);
    }

    #[test]
    fn test_rejects_bad_weights() {
        let err = EngineConfig::from_toml_str(
            r#"
            [instability.weights]
            unrest = 0.5
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::WeightSum { .. }));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let rendered = EngineConfig::default().to_toml_string().unwrap();
        let parsed = EngineConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed, EngineConfig::default());
    }
}
