//! Pulse classification against the 28 canonical pulse qualities.
//!
//! ## Descriptors
//!
//! A feature set is reduced to nine normalised descriptors in [0, 1]:
//!
//! | Descriptor | Source feature | High value means |
//! |------------|----------------|------------------|
//! | depth | contact pressure | pulse found only with deep pressure |
//! | rate | heart rate | fast |
//! | strength | beat amplitude | forceful |
//! | width | fraction of beat above half amplitude | broad |
//! | length | low-band spectral share | long, sustained |
//! | smoothness | beat similarity, spectral entropy | fluid, rounded |
//! | tension | upstroke speed relative to amplitude | taut, string-like |
//! | regularity | inter-beat regularity | even rhythm |
//! | missed | missed-beat ratio | dropped beats |
//!
//! ## Scoring
//!
//! Each pulse type owns a prototype: centres for the descriptors it
//! constrains. Similarity is a Gaussian of the mean squared distance over
//! those descriptors. Similarities are sharpened and normalised so that the
//! confidences of one position never sum above 1:
//!
//! `c_i = q · s_max · s_i^γ / Σ s_j^γ`, with `q = 0.5 + 0.5 · signal_quality`.

use palpa_core::{PulsePosition, PulseType};
use palpa_signal::FeatureSet;
use serde::{Deserialize, Serialize};

/// Classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Minimum confidence (inclusive) for a hypothesis to be retained
    pub threshold: f64,
    /// Maximum hypotheses per position
    pub max_results: usize,
    /// Sharpening exponent γ applied before normalisation
    pub sharpness: f64,
    /// Gaussian bandwidth of the prototype distance
    pub bandwidth: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            max_results: 3,
            sharpness: 4.0,
            bandwidth: 0.15,
        }
    }
}

/// Normalised pulse descriptors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PulseDescriptors {
    pub depth: f64,
    pub rate: f64,
    pub strength: f64,
    pub width: f64,
    pub length: f64,
    pub smoothness: f64,
    pub tension: f64,
    pub regularity: f64,
    pub missed: f64,
}

impl PulseDescriptors {
    /// Descriptors of an unremarkable pulse: mid depth, ~70 bpm, even rhythm
    pub fn neutral() -> Self {
        Self {
            depth: 0.5,
            rate: 0.3,
            strength: 0.5,
            width: 0.5,
            length: 0.5,
            smoothness: 0.7,
            tension: 0.4,
            regularity: 1.0,
            missed: 0.0,
        }
    }

    pub fn from_features(set: &FeatureSet) -> Self {
        let amplitude = set.value("amplitude_mean");
        let upstroke = if amplitude > 0.0 {
            set.value("rise_slope") / amplitude
        } else {
            0.0
        };

        Self {
            depth: unit(set.value("contact_pressure_mmhg") / 160.0),
            rate: unit((set.value("heart_rate_bpm") - 40.0) / 100.0),
            strength: unit(amplitude / 24.0),
            width: unit(set.value("pulse_width_ratio") / 0.4),
            length: unit(set.value("band_low_ratio")),
            smoothness: unit(
                0.5 * set.value("beat_similarity") + 0.5 * (1.0 - set.value("spectral_entropy")),
            ),
            tension: unit(upstroke / 25.0),
            regularity: unit(set.value("rhythm_regularity")),
            missed: unit(set.value("missed_beat_ratio") * 4.0),
        }
    }

    fn get(&self, descriptor: Descriptor) -> f64 {
        match descriptor {
            Descriptor::Depth => self.depth,
            Descriptor::Rate => self.rate,
            Descriptor::Strength => self.strength,
            Descriptor::Width => self.width,
            Descriptor::Length => self.length,
            Descriptor::Smoothness => self.smoothness,
            Descriptor::Tension => self.tension,
            Descriptor::Regularity => self.regularity,
            Descriptor::Missed => self.missed,
        }
    }
}

fn unit(x: f64) -> f64 {
    if x.is_finite() {
        x.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy)]
enum Descriptor {
    Depth,
    Rate,
    Strength,
    Width,
    Length,
    Smoothness,
    Tension,
    Regularity,
    Missed,
}

struct Prototype {
    pulse: PulseType,
    centres: &'static [(Descriptor, f64)],
}

use Descriptor::*;

/// One prototype per canonical type, in table order
static PROTOTYPES: [Prototype; 28] = [
    Prototype { pulse: PulseType::Floating, centres: &[(Depth, 0.15), (Regularity, 1.0), (Missed, 0.0)] },
    Prototype { pulse: PulseType::Sunken, centres: &[(Depth, 0.8), (Regularity, 1.0), (Missed, 0.0)] },
    Prototype { pulse: PulseType::Slow, centres: &[(Rate, 0.1), (Regularity, 1.0), (Missed, 0.0)] },
    Prototype { pulse: PulseType::Rapid, centres: &[(Rate, 0.6), (Regularity, 1.0), (Missed, 0.0)] },
    Prototype { pulse: PulseType::Slippery, centres: &[(Smoothness, 0.9), (Strength, 0.6), (Tension, 0.3), (Regularity, 1.0)] },
    Prototype { pulse: PulseType::Rough, centres: &[(Smoothness, 0.25), (Strength, 0.35), (Regularity, 0.8)] },
    Prototype { pulse: PulseType::Empty, centres: &[(Depth, 0.2), (Strength, 0.2), (Width, 0.7)] },
    Prototype { pulse: PulseType::Full, centres: &[(Strength, 0.85), (Width, 0.7), (Depth, 0.5)] },
    Prototype { pulse: PulseType::Long, centres: &[(Length, 0.85), (Tension, 0.5)] },
    Prototype { pulse: PulseType::Short, centres: &[(Length, 0.2), (Strength, 0.35)] },
    Prototype { pulse: PulseType::Surging, centres: &[(Strength, 0.95), (Depth, 0.25), (Width, 0.8), (Rate, 0.45)] },
    Prototype { pulse: PulseType::Faint, centres: &[(Strength, 0.05), (Width, 0.1), (Depth, 0.6)] },
    Prototype { pulse: PulseType::Tight, centres: &[(Tension, 0.85), (Width, 0.3), (Smoothness, 0.5)] },
    Prototype {
        pulse: PulseType::Moderate,
        centres: &[
            (Depth, 0.5),
            (Rate, 0.3),
            (Strength, 0.5),
            (Smoothness, 0.7),
            (Tension, 0.4),
            (Regularity, 1.0),
            (Missed, 0.0),
        ],
    },
    Prototype { pulse: PulseType::Wiry, centres: &[(Tension, 0.75), (Length, 0.8), (Width, 0.35)] },
    Prototype { pulse: PulseType::Hollow, centres: &[(Depth, 0.2), (Strength, 0.45), (Width, 0.8), (Smoothness, 0.3)] },
    Prototype { pulse: PulseType::Leather, centres: &[(Depth, 0.2), (Tension, 0.9), (Strength, 0.6), (Width, 0.7)] },
    Prototype { pulse: PulseType::Firm, centres: &[(Depth, 0.85), (Strength, 0.8), (Tension, 0.7), (Length, 0.75)] },
    Prototype { pulse: PulseType::Soggy, centres: &[(Depth, 0.2), (Strength, 0.2), (Width, 0.25), (Smoothness, 0.7)] },
    Prototype { pulse: PulseType::Weak, centres: &[(Depth, 0.8), (Strength, 0.2), (Width, 0.25)] },
    Prototype { pulse: PulseType::Scattered, centres: &[(Depth, 0.1), (Strength, 0.1), (Regularity, 0.3), (Missed, 0.4)] },
    Prototype { pulse: PulseType::Thready, centres: &[(Width, 0.1), (Strength, 0.35), (Regularity, 1.0)] },
    Prototype { pulse: PulseType::Hidden, centres: &[(Depth, 1.0), (Strength, 0.1)] },
    Prototype { pulse: PulseType::Moving, centres: &[(Rate, 0.6), (Length, 0.2), (Strength, 0.6), (Tension, 0.7)] },
    Prototype { pulse: PulseType::Hasty, centres: &[(Rate, 0.65), (Regularity, 0.5), (Missed, 0.5)] },
    Prototype { pulse: PulseType::Bound, centres: &[(Rate, 0.15), (Regularity, 0.5), (Missed, 0.5)] },
    Prototype { pulse: PulseType::Intermittent, centres: &[(Rate, 0.3), (Regularity, 0.6), (Missed, 0.8)] },
    Prototype { pulse: PulseType::Racing, centres: &[(Rate, 1.0), (Regularity, 1.0)] },
];

impl Prototype {
    fn similarity(&self, d: &PulseDescriptors, bandwidth: f64) -> f64 {
        let sq: f64 = self
            .centres
            .iter()
            .map(|(descriptor, centre)| (d.get(*descriptor) - centre).powi(2))
            .sum();
        let mean_sq = sq / self.centres.len().max(1) as f64;
        (-mean_sq / (2.0 * bandwidth * bandwidth)).exp()
    }
}

/// A single (pulse type, confidence) pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PulseHypothesis {
    pub pulse_type: PulseType,
    pub confidence: f64,
}

/// Classification result for one position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseClassification {
    pub position: PulsePosition,
    /// Ordered by descending confidence, never empty
    pub hypotheses: Vec<PulseHypothesis>,
    /// No hypothesis cleared the threshold
    pub low_confidence: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptors: Option<PulseDescriptors>,
}

impl PulseClassification {
    /// Result for input that cannot be classified
    pub fn unknown(position: PulsePosition) -> Self {
        Self {
            position,
            hypotheses: vec![PulseHypothesis {
                pulse_type: PulseType::Unknown,
                confidence: 0.0,
            }],
            low_confidence: true,
            descriptors: None,
        }
    }

    pub fn primary(&self) -> Option<&PulseHypothesis> {
        self.hypotheses.first()
    }

    pub fn is_unknown(&self) -> bool {
        self.primary().map_or(true, |h| h.pulse_type.is_unknown())
    }

    pub fn contains(&self, pulse_type: PulseType) -> bool {
        self.hypotheses.iter().any(|h| h.pulse_type == pulse_type)
    }
}

/// Prototype-distance pulse classifier
pub struct PulseClassifier {
    config: ClassifierConfig,
}

impl PulseClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify one position's feature set
    pub fn classify(&self, set: &FeatureSet) -> PulseClassification {
        if set.features.is_empty() || !set.is_valid() {
            tracing::debug!(
                position = %set.position,
                issues = ?set.quality.quality_issues,
                "Feature set not classifiable"
            );
            return PulseClassification::unknown(set.position);
        }

        let descriptors = PulseDescriptors::from_features(set);
        self.classify_descriptors(set.position, descriptors, set.quality.signal_quality)
    }

    pub fn classify_all(&self, sets: &[FeatureSet]) -> Vec<PulseClassification> {
        sets.iter().map(|s| self.classify(s)).collect()
    }

    /// Score descriptors directly; `signal_quality` scales the confidences
    pub fn classify_descriptors(
        &self,
        position: PulsePosition,
        descriptors: PulseDescriptors,
        signal_quality: f64,
    ) -> PulseClassification {
        let bandwidth = self.config.bandwidth.max(1e-3);
        let gamma = self.config.sharpness.max(1.0);
        let quality_factor = 0.5 + 0.5 * unit(signal_quality);

        let similarities: Vec<f64> = PROTOTYPES
            .iter()
            .map(|p| p.similarity(&descriptors, bandwidth))
            .collect();
        let s_max = similarities.iter().cloned().fold(0.0, f64::max);
        let sharpened: Vec<f64> = similarities.iter().map(|s| s.powf(gamma)).collect();
        let total: f64 = sharpened.iter().sum();

        if total <= 0.0 || !total.is_finite() {
            return PulseClassification::unknown(position);
        }

        let mut scored: Vec<PulseHypothesis> = PROTOTYPES
            .iter()
            .zip(sharpened.iter())
            .map(|(p, s)| PulseHypothesis {
                pulse_type: p.pulse,
                confidence: unit(quality_factor * s_max * s / total),
            })
            .collect();

        // Stable sort keeps table order among equal confidences
        scored.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut hypotheses: Vec<PulseHypothesis> = scored
            .iter()
            .filter(|h| h.confidence >= self.config.threshold)
            .take(self.config.max_results.max(1))
            .copied()
            .collect();

        let low_confidence = hypotheses.is_empty();
        if low_confidence {
            hypotheses.extend(scored.first().copied());
        }

        tracing::debug!(
            position = %position,
            primary = ?hypotheses.first().map(|h| h.pulse_type),
            confidence = hypotheses.first().map_or(0.0, |h| h.confidence),
            low_confidence,
            "Classified pulse"
        );

        PulseClassification {
            position,
            hypotheses,
            low_confidence,
            descriptors: Some(descriptors),
        }
    }
}

impl Default for PulseClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palpa_core::SessionId;
    use palpa_signal::{FeatureExtractor, SyntheticPulse};

    #[test]
    fn test_prototype_table_is_canonical_order() {
        for (i, p) in PROTOTYPES.iter().enumerate() {
            assert_eq!(p.pulse, PulseType::CANONICAL[i]);
            assert!(!p.centres.is_empty());
        }
    }

    #[test]
    fn test_racing_pulse() {
        let d = PulseDescriptors {
            rate: 1.0,
            ..PulseDescriptors::neutral()
        };
        let result = PulseClassifier::default().classify_descriptors(PulsePosition::LeftCun, d, 1.0);
        assert_eq!(result.primary().unwrap().pulse_type, PulseType::Racing);
    }

    #[test]
    fn test_confidences_bounded() {
        let config = ClassifierConfig {
            threshold: 0.0,
            max_results: 28,
            ..ClassifierConfig::default()
        };
        let classifier = PulseClassifier::new(config);

        for d in [
            PulseDescriptors::neutral(),
            PulseDescriptors { depth: 0.1, strength: 0.1, ..PulseDescriptors::neutral() },
            PulseDescriptors { rate: 0.65, regularity: 0.5, missed: 0.5, ..PulseDescriptors::neutral() },
        ] {
            let r = classifier.classify_descriptors(PulsePosition::RightChi, d, 1.0);
            assert_eq!(r.hypotheses.len(), 28);
            let sum: f64 = r.hypotheses.iter().map(|h| h.confidence).sum();
            assert!(sum <= 1.0 + 1e-9, "sum {}", sum);
            assert!(r.hypotheses.iter().all(|h| (0.0..=1.0).contains(&h.confidence)));
            assert!(r
                .hypotheses
                .windows(2)
                .all(|w| w[0].confidence >= w[1].confidence));
        }
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let d = PulseDescriptors::neutral();
        let open = PulseClassifier::new(ClassifierConfig {
            threshold: 0.0,
            ..ClassifierConfig::default()
        })
        .classify_descriptors(PulsePosition::LeftGuan, d, 1.0);
        let top = open.hypotheses[0];

        let exact = PulseClassifier::new(ClassifierConfig {
            threshold: top.confidence,
            ..ClassifierConfig::default()
        })
        .classify_descriptors(PulsePosition::LeftGuan, d, 1.0);
        assert!(!exact.low_confidence);
        assert_eq!(exact.hypotheses[0], top);
    }

    #[test]
    fn test_low_confidence_keeps_top_hypothesis() {
        let classifier = PulseClassifier::new(ClassifierConfig {
            threshold: 1.0,
            ..ClassifierConfig::default()
        });
        let r = classifier.classify_descriptors(PulsePosition::LeftChi, PulseDescriptors::neutral(), 0.2);
        assert!(r.low_confidence);
        assert_eq!(r.hypotheses.len(), 1);
        assert!(!r.is_unknown());
    }

    #[test]
    fn test_quality_scales_confidence() {
        let classifier = PulseClassifier::default();
        let d = PulseDescriptors::neutral();
        let good = classifier.classify_descriptors(PulsePosition::RightGuan, d, 1.0);
        let poor = classifier.classify_descriptors(PulsePosition::RightGuan, d, 0.0);
        let ratio = poor.hypotheses[0].confidence / good.hypotheses[0].confidence;
        assert!((ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_feature_set_is_unknown() {
        let session = SessionId::new();
        let packets = SyntheticPulse::default().packets(session, PulsePosition::LeftCun, 6.0);
        let mut set = FeatureExtractor::default().extract(session, &packets, false).unwrap();
        set.quality.is_valid = false;

        let r = PulseClassifier::default().classify(&set);
        assert!(r.is_unknown());
        assert_eq!(r.hypotheses[0].confidence, 0.0);
        assert!(r.low_confidence);
    }

    #[test]
    fn test_synthetic_pulse_yields_hypothesis() {
        let session = SessionId::new();
        let packets = SyntheticPulse::default().packets(session, PulsePosition::LeftGuan, 10.0);
        let set = FeatureExtractor::default().extract(session, &packets, false).unwrap();
        let r = PulseClassifier::default().classify(&set);

        assert!(!r.hypotheses.is_empty());
        assert!(!r.is_unknown());
        let d = r.descriptors.unwrap();
        assert!((d.depth - 0.5).abs() < 0.05);
        assert!(d.regularity > 0.9);
    }

    #[test]
    fn test_deterministic() {
        let d = PulseDescriptors { tension: 0.8, length: 0.8, ..PulseDescriptors::neutral() };
        let c = PulseClassifier::default();
        assert_eq!(
            c.classify_descriptors(PulsePosition::LeftGuan, d, 0.9),
            c.classify_descriptors(PulsePosition::LeftGuan, d, 0.9)
        );
    }
}
