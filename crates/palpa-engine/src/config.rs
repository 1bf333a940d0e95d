//! Engine configuration.

use palpa_core::{AnalysisKind, Error, PulsePosition, Result};
use palpa_signal::{DeviceConfig, FeatureConfig, PreprocessConfig};
use palpa_tcm::{AbdominalConfig, ClassifierConfig, FusionConfig, PatternMapperConfig, TrendConfig};
use serde::{Deserialize, Serialize};

/// Complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Session lifecycle rules
    pub session: SessionConfig,

    /// Device registration policy
    pub device: DeviceConfig,

    /// Waveform conditioning
    pub preprocess: PreprocessConfig,

    /// Feature extraction
    pub features: FeatureConfig,

    /// Pulse classification
    pub classifier: ClassifierConfig,

    /// Pattern mapping
    pub mapper: PatternMapperConfig,

    /// Abdominal palpation thresholds
    pub abdominal: AbdominalConfig,

    /// Multi-modality fusion and alerts
    pub fusion: FusionConfig,

    /// Trend and comparison
    pub trend: TrendConfig,

    /// Worker pool
    pub workers: WorkerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Positions that must have packets before features can be extracted
    pub required_positions: Vec<PulsePosition>,

    /// Minimum packets per required position
    pub min_packets_per_position: usize,

    /// Analyses a new session must complete before it counts as analyzed
    pub requested_analyses: Vec<AnalysisKind>,

    /// Accepted packets are written to the store in chunks of this size
    pub ingest_chunk_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            required_positions: PulsePosition::ALL.to_vec(),
            min_packets_per_position: 1,
            requested_analyses: vec![AnalysisKind::Pulse],
            ingest_chunk_size: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Concurrent CPU-bound jobs (extraction, classification, mapping)
    pub max_concurrent_jobs: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
        }
    }
}

impl EngineConfig {
    /// Load configuration from file, with `PALPA_` environment overrides
    pub fn from_file(path: &str) -> std::result::Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("PALPA")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        settings.try_deserialize()
    }

    /// Load from environment variables, e.g. `PALPA_WORKERS__MAX_CONCURRENT_JOBS=8`
    pub fn from_env() -> std::result::Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("PALPA")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        settings.try_deserialize()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.workers.max_concurrent_jobs == 0 {
            return Err(Error::Config("workers.max_concurrent_jobs must be at least 1".into()));
        }
        if self.session.ingest_chunk_size == 0 {
            return Err(Error::Config("session.ingest_chunk_size must be at least 1".into()));
        }
        if self.device.calibration_interval_days <= 0 {
            return Err(Error::Config("device.calibration_interval_days must be positive".into()));
        }
        if self.session.requested_analyses.is_empty() {
            return Err(Error::Config("session.requested_analyses must not be empty".into()));
        }
        for (name, v) in [
            ("classifier.threshold", self.classifier.threshold),
            ("mapper.threshold", self.mapper.threshold),
            ("fusion.alert_threshold", self.fusion.alert_threshold),
            ("fusion.critical_threshold", self.fusion.critical_threshold),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(Error::Config(format!("{} must be within [0, 1], got {}", name, v)));
            }
        }
        if self.preprocess.low_cutoff_hz >= self.preprocess.high_cutoff_hz {
            return Err(Error::Config(format!(
                "preprocess band {}..{} Hz is empty",
                self.preprocess.low_cutoff_hz, self.preprocess.high_cutoff_hz
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.session.required_positions.len(), 6);
        assert_eq!(config.session.min_packets_per_position, 1);
        assert_eq!(config.workers.max_concurrent_jobs, 4);
        assert_eq!(config.fusion.critical_threshold, 0.9);
        assert_eq!(config.device.calibration_interval_days, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"workers": {"max_concurrent_jobs": 2}, "trend": {"min_delta": 0.1}}"#)
                .unwrap();
        assert_eq!(config.workers.max_concurrent_jobs, 2);
        assert_eq!(config.trend.min_delta, 0.1);
        assert_eq!(config.classifier.max_results, 3);
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = EngineConfig::default();
        config.workers.max_concurrent_jobs = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
