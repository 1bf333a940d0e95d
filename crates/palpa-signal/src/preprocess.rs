//! Packet assembly and waveform conditioning for one session+position.

use palpa_core::{Error, PulsePosition, Result};
use serde::{Deserialize, Serialize};

use crate::filtering::{remove_baseline, resample_linear, BandpassFilter};
use crate::packet::RawPacket;

/// Preprocessing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Band-pass low cutoff (Hz)
    pub low_cutoff_hz: f64,
    /// Band-pass high cutoff (Hz)
    pub high_cutoff_hz: f64,
    /// Baseline estimate window (seconds)
    pub baseline_window_s: f64,
    /// Rate every waveform is resampled to (Hz)
    pub canonical_rate_hz: f64,
    /// Pressure at or above which the sensor is considered saturated (mmHg)
    pub saturation_level_mmhg: f64,
    /// Clipped-sample fraction that makes a recording unusable
    pub max_clipping_ratio: f64,
    /// Packet gap, in packet durations, counted as a dropout
    pub dropout_gap_factor: f64,
    /// Minimum recording length (seconds)
    pub min_duration_s: f64,
    /// SNR below which the recording is flagged (dB)
    pub min_snr_db: f64,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            low_cutoff_hz: 0.1,
            high_cutoff_hz: 20.0,
            baseline_window_s: 1.5,
            canonical_rate_hz: 200.0,
            saturation_level_mmhg: 300.0,
            max_clipping_ratio: 0.05,
            dropout_gap_factor: 1.5,
            min_duration_s: 2.0,
            min_snr_db: 10.0,
        }
    }
}

/// Signal problems detected while preprocessing or extracting features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityIssue {
    TooShort,
    FlatSignal,
    Clipping,
    Saturated,
    Dropout,
    LowSnr,
    FewBeats,
    IrregularBeatShape,
    /// Longer than the spectral window; frequency features cover the start only
    Truncated,
}

impl QualityIssue {
    pub fn description(&self) -> &'static str {
        match self {
            QualityIssue::TooShort => "Recording is shorter than the minimum duration",
            QualityIssue::FlatSignal => "No pulsatile component detected",
            QualityIssue::Clipping => "Some samples hit the sensor range limit",
            QualityIssue::Saturated => "Too many samples hit the sensor range limit",
            QualityIssue::Dropout => "Gaps detected between packets",
            QualityIssue::LowSnr => "Signal-to-noise ratio is low",
            QualityIssue::FewBeats => "Fewer than three beats detected",
            QualityIssue::IrregularBeatShape => "Adjacent beats have dissimilar shapes",
            QualityIssue::Truncated => "Recording exceeds the spectral window and was truncated",
        }
    }

    /// Issues that make the feature set unusable for classification
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            QualityIssue::TooShort
                | QualityIssue::FlatSignal
                | QualityIssue::Saturated
                | QualityIssue::FewBeats
        )
    }
}

/// Signal validity indicators attached to a feature set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Overall quality in [0, 1]
    pub signal_quality: f64,
    /// `1 - signal_quality`
    pub noise_level: f64,
    pub is_valid: bool,
    pub quality_issues: Vec<QualityIssue>,
    pub snr_db: f64,
    pub clipping_ratio: f64,
    pub dropout_count: usize,
}

impl QualityMetrics {
    /// Derive the summary scores from raw indicators.
    ///
    /// `quality = min(1, snr/20) * (1 - 0.2 * issues)`, valid iff no blocking
    /// issue and SNR above `min_snr_db`.
    pub fn from_parts(
        snr_db: f64,
        clipping_ratio: f64,
        dropout_count: usize,
        mut quality_issues: Vec<QualityIssue>,
        min_snr_db: f64,
    ) -> Self {
        quality_issues.sort_by_key(|i| *i as u8);
        quality_issues.dedup();

        let snr_score = (snr_db / 20.0).clamp(0.0, 1.0);
        let penalty = (1.0 - 0.2 * quality_issues.len() as f64).max(0.0);
        let signal_quality = (snr_score * penalty).clamp(0.0, 1.0);
        let is_valid =
            !quality_issues.iter().any(|i| i.is_blocking()) && snr_db > min_snr_db;

        Self {
            signal_quality,
            noise_level: 1.0 - signal_quality,
            is_valid,
            quality_issues,
            snr_db,
            clipping_ratio,
            dropout_count,
        }
    }

    /// Same metrics with extra issues folded in
    pub fn with_issues(&self, extra: &[QualityIssue], min_snr_db: f64) -> Self {
        let mut issues = self.quality_issues.clone();
        issues.extend_from_slice(extra);
        Self::from_parts(
            self.snr_db,
            self.clipping_ratio,
            self.dropout_count,
            issues,
            min_snr_db,
        )
    }
}

/// Conditioned waveform for one position, at the canonical rate
#[derive(Debug, Clone)]
pub struct PreprocessedWaveform {
    pub position: PulsePosition,
    pub samples: Vec<f64>,
    pub sample_rate_hz: f64,
    pub source_rate_hz: f64,
    pub packet_count: usize,
    /// Mean calibrated hold-down pressure (mmHg)
    pub contact_pressure_mmhg: f64,
    /// Mean of per-packet peak velocity (mmHg/s)
    pub velocity_peak_mean: f64,
    pub skin_temperature_c: f64,
    pub skin_moisture: Option<f64>,
    pub quality: QualityMetrics,
}

impl PreprocessedWaveform {
    pub fn duration_s(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate_hz
    }
}

/// Assembles packets into one conditioned waveform
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Sort, concatenate and condition packets for a single position.
    ///
    /// Packet order on input does not matter; packets sharing a timestamp
    /// are treated as re-deliveries and only the first is kept.
    pub fn process(&self, packets: &[RawPacket]) -> Result<PreprocessedWaveform> {
        let first = packets.first().ok_or_else(|| Error::InsufficientData {
            context: "preprocessing".into(),
            required: 1,
            available: 0,
        })?;
        let position = first.position;
        if packets.iter().any(|p| p.position != position) {
            return Err(Error::InvalidInput(
                "packets from more than one position".into(),
            ));
        }

        let mut ordered: Vec<&RawPacket> = packets.iter().collect();
        ordered.sort_by_key(|p| p.timestamp);
        ordered.dedup_by_key(|p| p.timestamp);

        let source_rate = first.sample_rate_hz;
        if source_rate <= 0.0 {
            return Err(Error::Signal(format!("invalid sample rate {}", source_rate)));
        }

        let raw: Vec<f64> = ordered
            .iter()
            .flat_map(|p| p.pressure_series.iter().copied())
            .collect();
        if raw.is_empty() {
            return Err(Error::InsufficientData {
                context: format!("{} waveform", position),
                required: 1,
                available: 0,
            });
        }

        let dropout_count = self.count_dropouts(&ordered);
        let clipping_ratio = self.clipping_ratio(&raw);
        let contact_pressure_mmhg = raw.iter().sum::<f64>() / raw.len() as f64;

        let velocity_peak_mean = ordered
            .iter()
            .map(|p| p.velocity_series.iter().copied().fold(0.0_f64, f64::max))
            .sum::<f64>()
            / ordered.len() as f64;
        let skin_temperature_c =
            ordered.iter().map(|p| p.skin_temperature).sum::<f64>() / ordered.len() as f64;
        let moisture: Vec<f64> = ordered.iter().filter_map(|p| p.skin_moisture).collect();
        let skin_moisture = if moisture.is_empty() {
            None
        } else {
            Some(moisture.iter().sum::<f64>() / moisture.len() as f64)
        };

        // 1. baseline correction
        let window = ((self.config.baseline_window_s * source_rate).round() as usize) | 1;
        let detrended = remove_baseline(&raw, window);

        // 2. zero-phase band-pass
        let mut bandpass = BandpassFilter::new(
            self.config.low_cutoff_hz,
            self.config.high_cutoff_hz,
            source_rate,
        );
        let filtered = bandpass.filter_signal(&detrended);
        let snr_db = estimate_snr_db(&filtered, &detrended);

        // 3. resample to canonical rate
        let samples = resample_linear(&filtered, source_rate, self.config.canonical_rate_hz);

        let mut issues = Vec::new();
        let duration_s = raw.len() as f64 / source_rate;
        if duration_s < self.config.min_duration_s {
            issues.push(QualityIssue::TooShort);
        }
        if variance(&filtered) < 1e-6 {
            issues.push(QualityIssue::FlatSignal);
        }
        if clipping_ratio > self.config.max_clipping_ratio {
            issues.push(QualityIssue::Saturated);
        } else if clipping_ratio > 0.0 {
            issues.push(QualityIssue::Clipping);
        }
        if dropout_count > 0 {
            issues.push(QualityIssue::Dropout);
        }
        if snr_db <= self.config.min_snr_db {
            issues.push(QualityIssue::LowSnr);
        }

        let quality = QualityMetrics::from_parts(
            snr_db,
            clipping_ratio,
            dropout_count,
            issues,
            self.config.min_snr_db,
        );

        tracing::debug!(
            %position,
            packets = ordered.len(),
            samples = samples.len(),
            snr_db,
            quality = quality.signal_quality,
            "Preprocessed waveform"
        );

        Ok(PreprocessedWaveform {
            position,
            samples,
            sample_rate_hz: self.config.canonical_rate_hz,
            source_rate_hz: source_rate,
            packet_count: ordered.len(),
            contact_pressure_mmhg,
            velocity_peak_mean,
            skin_temperature_c,
            skin_moisture,
            quality,
        })
    }

    fn count_dropouts(&self, ordered: &[&RawPacket]) -> usize {
        ordered
            .windows(2)
            .filter(|w| {
                let expected = w[0].duration_us() as f64;
                let gap = (w[1].timestamp.as_micros() - w[0].timestamp.as_micros()) as f64;
                expected > 0.0 && gap > expected * self.config.dropout_gap_factor
            })
            .count()
    }

    /// Fraction of samples at the saturation level or stuck on a flat top
    fn clipping_ratio(&self, raw: &[f64]) -> f64 {
        const MIN_FLAT_RUN: usize = 5;

        let max = raw.iter().copied().fold(f64::MIN, f64::max);
        let mut clipped = raw
            .iter()
            .filter(|p| **p >= self.config.saturation_level_mmhg)
            .count();

        if max < self.config.saturation_level_mmhg {
            let mut run = 0usize;
            for &p in raw {
                if p == max {
                    run += 1;
                } else {
                    if run >= MIN_FLAT_RUN {
                        clipped += run;
                    }
                    run = 0;
                }
            }
            if run >= MIN_FLAT_RUN {
                clipped += run;
            }
            // a constant signal is flat, not clipped
            if clipped == raw.len() {
                clipped = 0;
            }
        }

        clipped as f64 / raw.len() as f64
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(PreprocessConfig::default())
    }
}

fn variance(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    let mean = signal.iter().sum::<f64>() / signal.len() as f64;
    signal.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / signal.len() as f64
}

/// SNR of the band-limited signal against what the band-pass removed
fn estimate_snr_db(filtered: &[f64], detrended: &[f64]) -> f64 {
    const MAX_SNR_DB: f64 = 60.0;

    let residual: Vec<f64> = detrended
        .iter()
        .zip(filtered.iter())
        .map(|(d, f)| d - f)
        .collect();
    let signal_power = variance(filtered);
    let noise_power = variance(&residual);

    if signal_power <= 0.0 {
        return 0.0;
    }
    if noise_power <= signal_power * 1e-6 {
        return MAX_SNR_DB;
    }
    (10.0 * (signal_power / noise_power).log10()).min(MAX_SNR_DB)
}
