//! Feature extraction: packets for one position in, named feature set out.

use palpa_core::{PulsePosition, Result, SessionId};
use serde::{Deserialize, Serialize};

use crate::features::{time_features, PeakDetection, MIN_BEAT_SPACING_S};
use crate::packet::RawPacket;
use crate::preprocess::{PreprocessConfig, PreprocessedWaveform, Preprocessor, QualityIssue, QualityMetrics};
use crate::spectrum::{SpectrumAnalyzer, MAX_FFT_SIZE};
use crate::wavelet::{MotherWavelet, WaveletTransform};

/// Beat-shape correlation below which beats are flagged as inconsistent
const MIN_BEAT_SIMILARITY: f64 = 0.7;

/// Domain a feature belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureDomain {
    Time,
    Frequency,
    Wavelet,
}

/// One named scalar feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    pub domain: FeatureDomain,
    pub value: f64,
}

/// Feature extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub wavelet: MotherWavelet,
    pub wavelet_depth: usize,
    /// Peak threshold above the mean, in standard deviations
    pub peak_threshold_std: f64,
    /// Minimum beat spacing (seconds)
    pub min_peak_distance_s: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            wavelet: MotherWavelet::Daubechies4,
            wavelet_depth: 5,
            peak_threshold_std: 0.3,
            min_peak_distance_s: MIN_BEAT_SPACING_S,
        }
    }
}

/// Features for one session+position, immutable once computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub session_id: SessionId,
    pub position: PulsePosition,
    pub features: Vec<Feature>,
    pub quality: QualityMetrics,
    pub packet_count: usize,
    pub sample_count: usize,
    pub sample_rate_hz: f64,
    /// Denoised canonical-rate waveform, only when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waveform: Option<Vec<f64>>,
}

impl FeatureSet {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.features
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value)
    }

    /// Value of a feature, 0 if absent
    pub fn value(&self, name: &str) -> f64 {
        self.get(name).unwrap_or(0.0)
    }

    pub fn by_domain(&self, domain: FeatureDomain) -> impl Iterator<Item = &Feature> {
        self.features.iter().filter(move |f| f.domain == domain)
    }

    pub fn is_valid(&self) -> bool {
        self.quality.is_valid
    }
}

/// Preprocessor plus the three feature groups
pub struct FeatureExtractor {
    preprocessor: Preprocessor,
    config: FeatureConfig,
}

impl FeatureExtractor {
    pub fn new(preprocess: PreprocessConfig, config: FeatureConfig) -> Self {
        Self {
            preprocessor: Preprocessor::new(preprocess),
            config,
        }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Extract a feature set from every packet of one session+position.
    ///
    /// Deterministic: the same packets (in any delivery order) and the same
    /// configuration always produce identical values.
    pub fn extract(
        &self,
        session_id: SessionId,
        packets: &[RawPacket],
        include_raw: bool,
    ) -> Result<FeatureSet> {
        let waveform = self.preprocessor.process(packets)?;
        Ok(self.extract_waveform(session_id, waveform, include_raw))
    }

    /// Extract from an already conditioned waveform
    pub fn extract_waveform(
        &self,
        session_id: SessionId,
        waveform: PreprocessedWaveform,
        include_raw: bool,
    ) -> FeatureSet {
        let rate = waveform.sample_rate_hz;
        let samples = &waveform.samples;
        let mut features = Vec::with_capacity(40);

        let params = PeakDetection {
            threshold_std: self.config.peak_threshold_std,
            min_distance_s: self.config.min_peak_distance_s,
        };
        let t = time_features(samples, rate, params);
        let mut push = |name: &str, domain: FeatureDomain, value: f64| {
            features.push(Feature {
                name: name.to_string(),
                domain,
                value: if value.is_finite() { value } else { 0.0 },
            });
        };

        use FeatureDomain::*;
        push("peak_count", Time, t.peak_count as f64);
        push("heart_rate_bpm", Time, t.heart_rate_bpm);
        push("mean_ibi_s", Time, t.mean_ibi_s);
        push("ibi_std_s", Time, t.ibi_std_s);
        push("rmssd_ms", Time, t.rmssd_ms);
        push("rhythm_regularity", Time, t.rhythm_regularity);
        push("missed_beat_ratio", Time, t.missed_beat_ratio);
        push("amplitude_mean", Time, t.amplitude_mean);
        push("amplitude_cv", Time, t.amplitude_cv);
        push("dicrotic_ratio", Time, t.dicrotic_ratio);
        push("rise_slope", Time, t.rise_slope);
        push("fall_slope", Time, t.fall_slope);
        push("rise_time_ratio", Time, t.rise_time_ratio);
        push("pulse_width_ratio", Time, t.pulse_width_ratio);
        push("skewness", Time, t.skewness);
        push("kurtosis", Time, t.kurtosis);
        push("beat_similarity", Time, t.beat_similarity);
        push("contact_pressure_mmhg", Time, waveform.contact_pressure_mmhg);
        push("velocity_peak_mean", Time, waveform.velocity_peak_mean);

        let spectral = SpectrumAnalyzer::for_length(samples.len(), rate).analyze(samples);
        push("dominant_frequency_hz", Frequency, spectral.dominant_frequency_hz);
        push("dominant_power", Frequency, spectral.dominant_power);
        push("spectral_centroid_hz", Frequency, spectral.spectral_centroid_hz);
        push("total_power", Frequency, spectral.total_power);
        push("band_low_ratio", Frequency, spectral.band_low_ratio);
        push("band_mid_ratio", Frequency, spectral.band_mid_ratio);
        push("band_high_ratio", Frequency, spectral.band_high_ratio);
        push("spectral_entropy", Frequency, spectral.spectral_entropy);

        let depth = self.config.wavelet_depth.max(1);
        let decomposition =
            WaveletTransform::new(self.config.wavelet, depth).decompose(samples);
        let (detail_ratios, approx_ratio) = decomposition.energy_ratios(depth);
        for (level, ratio) in detail_ratios.iter().enumerate() {
            push(&format!("wavelet_detail_{}_ratio", level + 1), Wavelet, *ratio);
        }
        push("wavelet_approx_ratio", Wavelet, approx_ratio);
        push("wavelet_entropy", Wavelet, decomposition.entropy(depth));

        let mut extra = Vec::new();
        if SpectrumAnalyzer::truncates(samples.len()) {
            tracing::warn!(
                session = %session_id,
                position = %waveform.position,
                samples = samples.len(),
                window = MAX_FFT_SIZE,
                "Waveform truncated for spectral analysis"
            );
            extra.push(QualityIssue::Truncated);
        }
        if t.peak_count < 3 {
            extra.push(QualityIssue::FewBeats);
        } else if t.beat_similarity < MIN_BEAT_SIMILARITY {
            extra.push(QualityIssue::IrregularBeatShape);
        }
        let quality = waveform
            .quality
            .with_issues(&extra, self.preprocessor.config().min_snr_db);

        tracing::debug!(
            session = %session_id,
            position = %waveform.position,
            features = features.len(),
            heart_rate = t.heart_rate_bpm,
            valid = quality.is_valid,
            "Extracted features"
        );

        FeatureSet {
            session_id,
            position: waveform.position,
            features,
            quality,
            packet_count: waveform.packet_count,
            sample_count: samples.len(),
            sample_rate_hz: rate,
            waveform: include_raw.then(|| waveform.samples.clone()),
        }
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(PreprocessConfig::default(), FeatureConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{synthetic_packets, SyntheticPulse};

    #[test]
    fn test_feature_groups_present() {
        let session = SessionId::new();
        let packets = synthetic_packets(session, PulsePosition::LeftGuan, 72.0, 10.0);
        let set = FeatureExtractor::default().extract(session, &packets, false).unwrap();

        assert_eq!(set.position, PulsePosition::LeftGuan);
        assert!(set.by_domain(FeatureDomain::Time).count() >= 15);
        assert_eq!(set.by_domain(FeatureDomain::Frequency).count(), 8);
        assert_eq!(set.by_domain(FeatureDomain::Wavelet).count(), 7);
        assert!(set.waveform.is_none());
        assert!(set.is_valid(), "{:?}", set.quality);
        assert!((set.value("heart_rate_bpm") - 72.0).abs() < 2.0);
        assert!((set.value("dominant_frequency_hz") - 1.2).abs() < 0.15);
    }

    #[test]
    fn test_overlong_waveform_flagged_truncated() {
        let rate = 200.0;
        let samples: Vec<f64> = (0..MAX_FFT_SIZE + 2000)
            .map(|i| 10.0 * (2.0 * std::f64::consts::PI * 1.2 * i as f64 / rate).sin())
            .collect();
        let waveform = PreprocessedWaveform {
            position: PulsePosition::LeftCun,
            samples,
            sample_rate_hz: rate,
            source_rate_hz: 1000.0,
            packet_count: 1,
            contact_pressure_mmhg: 80.0,
            velocity_peak_mean: 0.0,
            skin_temperature_c: 36.5,
            skin_moisture: None,
            quality: QualityMetrics::from_parts(30.0, 0.0, 0, Vec::new(), 10.0),
        };

        let set = FeatureExtractor::default().extract_waveform(SessionId::new(), waveform, false);
        assert!(set.quality.quality_issues.contains(&QualityIssue::Truncated));
        assert!(set.is_valid());
        assert!((set.value("dominant_frequency_hz") - 1.2).abs() < 0.05);
    }

    #[test]
    fn test_default_beat_spacing() {
        assert_eq!(FeatureConfig::default().min_peak_distance_s, 0.33);
        assert_eq!(PeakDetection::default().min_distance_s, 0.33);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let session = SessionId::new();
        let packets = synthetic_packets(session, PulsePosition::RightCun, 80.0, 8.0);
        let mut reversed = packets.clone();
        reversed.reverse();

        let extractor = FeatureExtractor::default();
        let a = extractor.extract(session, &packets, true).unwrap();
        let b = extractor.extract(session, &reversed, true).unwrap();
        assert_eq!(a, b);
        assert!(a.waveform.is_some());
    }

    #[test]
    fn test_resampling_from_other_rates() {
        let session = SessionId::new();
        let packets = SyntheticPulse::default()
            .with_sampling(250.0, 25)
            .with_rate(90.0)
            .packets(session, PulsePosition::RightChi, 8.0);
        let set = FeatureExtractor::default().extract(session, &packets, false).unwrap();
        assert_eq!(set.sample_rate_hz, 200.0);
        assert!((set.value("heart_rate_bpm") - 90.0).abs() < 3.0);
    }

    #[test]
    fn test_haar_configuration() {
        let session = SessionId::new();
        let packets = synthetic_packets(session, PulsePosition::LeftCun, 72.0, 6.0);
        let config = FeatureConfig {
            wavelet: MotherWavelet::Haar,
            wavelet_depth: 3,
            ..FeatureConfig::default()
        };
        let set = FeatureExtractor::new(PreprocessConfig::default(), config)
            .extract(session, &packets, false)
            .unwrap();
        assert_eq!(set.by_domain(FeatureDomain::Wavelet).count(), 5);
        assert!(set.get("wavelet_detail_4_ratio").is_none());
    }
}
