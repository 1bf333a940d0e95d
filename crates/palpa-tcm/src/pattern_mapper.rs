//! Mapping pulse hypotheses (and optional symptom keywords) onto syndrome
//! patterns.
//!
//! For every pattern in the table:
//!
//! ```text
//! evidence   = Σ_positions Σ_matching hypotheses  rule_weight · confidence · affinity(position)
//!            + 0.4 · matched symptom keywords
//! confidence = base_weight · (1 − e^(−evidence))
//! ```
//!
//! Affinity is 1.0 when the position reflects the pattern's organ, 0.5 when
//! the position's element is the five-phase mother of the pattern's element,
//! 0.3 otherwise.

use std::collections::BTreeMap;

use palpa_core::{AnalysisKind, Element, Nature, Organ, PulsePosition};
use serde::{Deserialize, Serialize};

use crate::classifier::PulseClassification;
use crate::findings::{Finding, FindingType};
use crate::patterns::{Pattern, PATTERN_TABLE};

/// Evidence contributed by each matched symptom keyword
const KEYWORD_EVIDENCE: f64 = 0.4;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternMapperConfig {
    /// Minimum confidence (inclusive) for a pattern to be retained
    pub threshold: f64,
    pub same_organ_affinity: f64,
    pub mother_element_affinity: f64,
    pub other_affinity: f64,
}

impl Default for PatternMapperConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            same_organ_affinity: 1.0,
            mother_element_affinity: 0.5,
            other_affinity: 0.3,
        }
    }
}

/// A syndrome pattern with its supporting evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TcmPattern {
    pub pattern: Pattern,
    pub name: String,
    pub element: Element,
    pub nature: Nature,
    pub organ: Organ,
    pub confidence: f64,
    /// Human-readable trace of every piece of evidence
    pub supporting_findings: Vec<String>,
    pub evidence: f64,
    pub evidence_count: usize,
    pub low_confidence: bool,
    /// Modalities that contributed
    pub sources: Vec<AnalysisKind>,
}

impl TcmPattern {
    pub fn new(pattern: Pattern, confidence: f64, source: AnalysisKind) -> Self {
        Self {
            pattern,
            name: pattern.name().to_string(),
            element: pattern.element(),
            nature: pattern.nature(),
            organ: pattern.organ(),
            confidence: confidence.clamp(0.0, 1.0),
            supporting_findings: Vec::new(),
            evidence: 0.0,
            evidence_count: 0,
            low_confidence: false,
            sources: vec![source],
        }
    }

    pub fn acuity(&self) -> f64 {
        self.pattern.acuity()
    }
}

/// Order: confidence desc, evidence count desc, table order
pub(crate) fn rank(patterns: &mut [TcmPattern]) {
    patterns.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then(b.evidence_count.cmp(&a.evidence_count))
            .then(a.pattern.table_index().cmp(&b.pattern.table_index()))
    });
}

/// Organ-level condition derived from retained patterns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganCondition {
    pub organ: Organ,
    pub condition: Nature,
    pub severity: f64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMapping {
    pub patterns: Vec<TcmPattern>,
    pub organ_conditions: Vec<OrganCondition>,
}

pub struct PatternMapper {
    config: PatternMapperConfig,
}

impl PatternMapper {
    pub fn new(config: PatternMapperConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PatternMapperConfig {
        &self.config
    }

    fn affinity(&self, position: PulsePosition, pattern: Pattern) -> f64 {
        if position.organ().zang() == pattern.organ().zang() {
            self.config.same_organ_affinity
        } else if position.element() == pattern.element().mother() {
            self.config.mother_element_affinity
        } else {
            self.config.other_affinity
        }
    }

    /// Score every pattern against the classifications and symptoms
    pub fn map(&self, classifications: &[PulseClassification], symptoms: &[String]) -> PatternMapping {
        let symptoms: Vec<String> = symptoms.iter().map(|s| s.to_lowercase()).collect();
        let mut scored = Vec::new();

        for info in PATTERN_TABLE.iter() {
            let mut evidence = 0.0;
            let mut count = 0;
            let mut trace = Vec::new();

            for classification in classifications {
                let affinity = self.affinity(classification.position, info.pattern);
                for hypothesis in &classification.hypotheses {
                    let Some((_, weight)) = info.rules.iter().find(|(p, _)| *p == hypothesis.pulse_type) else {
                        continue;
                    };
                    if hypothesis.confidence <= 0.0 {
                        continue;
                    }
                    evidence += weight * hypothesis.confidence * affinity;
                    count += 1;
                    trace.push(format!(
                        "{} pulse at {} (confidence {:.2}, affinity {:.1})",
                        hypothesis.pulse_type, classification.position, hypothesis.confidence, affinity
                    ));
                }
            }

            for keyword in info.keywords {
                if let Some(symptom) = symptoms.iter().find(|s| s.contains(keyword)) {
                    evidence += KEYWORD_EVIDENCE;
                    count += 1;
                    trace.push(format!("symptom: {}", symptom));
                }
            }

            if count == 0 {
                continue;
            }

            let mut pattern = TcmPattern::new(
                info.pattern,
                info.base_weight * (1.0 - (-evidence).exp()),
                AnalysisKind::Pulse,
            );
            pattern.evidence = evidence;
            pattern.evidence_count = count;
            pattern.supporting_findings = trace;
            scored.push(pattern);
        }

        rank(&mut scored);

        let mut patterns: Vec<TcmPattern> = scored
            .iter()
            .filter(|p| p.confidence >= self.config.threshold)
            .cloned()
            .collect();
        if patterns.is_empty() {
            if let Some(best) = scored.into_iter().next() {
                patterns.push(TcmPattern {
                    low_confidence: true,
                    ..best
                });
            }
        }

        let organ_conditions = organ_conditions(&patterns);

        tracing::debug!(
            positions = classifications.len(),
            patterns = patterns.len(),
            top = ?patterns.first().map(|p| p.pattern),
            "Mapped patterns"
        );

        PatternMapping {
            patterns,
            organ_conditions,
        }
    }
}

impl Default for PatternMapper {
    fn default() -> Self {
        Self::new(PatternMapperConfig::default())
    }
}

/// Patterns implied by palpation findings: each condition counts once per
/// finding, `confidence = min(0.9, 0.6 + 0.05·count)`. Merged correlation
/// findings are not counted again.
pub fn condition_patterns(findings: &[Finding], source: AnalysisKind) -> Vec<TcmPattern> {
    let mut counts: BTreeMap<Pattern, (usize, Vec<String>)> = BTreeMap::new();
    for f in findings.iter().filter(|f| f.finding_type != FindingType::Correlation) {
        for condition in &f.conditions {
            let entry = counts.entry(condition.pattern()).or_default();
            entry.0 += 1;
            if !entry.1.contains(&f.description) {
                entry.1.push(f.description.clone());
            }
        }
    }

    let mut patterns: Vec<TcmPattern> = counts
        .into_iter()
        .map(|(pattern, (count, supporting))| {
            let mut p = TcmPattern::new(pattern, (0.6 + 0.05 * count as f64).min(0.9), source);
            p.evidence = count as f64;
            p.evidence_count = count;
            p.supporting_findings = supporting;
            p
        })
        .collect();
    rank(&mut patterns);
    patterns
}

/// Strongest pattern per (organ, nature); balanced patterns carry no condition
pub fn organ_conditions(patterns: &[TcmPattern]) -> Vec<OrganCondition> {
    let mut by_organ: BTreeMap<(Organ, Nature), &TcmPattern> = BTreeMap::new();
    for p in patterns.iter().filter(|p| p.nature != Nature::Balanced) {
        by_organ
            .entry((p.organ, p.nature))
            .and_modify(|best| {
                if p.confidence > best.confidence {
                    *best = p;
                }
            })
            .or_insert(p);
    }

    let mut conditions: Vec<OrganCondition> = by_organ
        .into_iter()
        .map(|((organ, nature), p)| OrganCondition {
            organ,
            condition: nature,
            severity: p.confidence,
            description: format!("{} {} ({})", organ, nature, p.name),
        })
        .collect();
    conditions.sort_by(|a, b| b.severity.total_cmp(&a.severity));
    conditions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::PulseHypothesis;
    use palpa_core::PulseType;

    fn classification(position: PulsePosition, pulses: &[(PulseType, f64)]) -> PulseClassification {
        PulseClassification {
            position,
            hypotheses: pulses
                .iter()
                .map(|(pulse_type, confidence)| PulseHypothesis {
                    pulse_type: *pulse_type,
                    confidence: *confidence,
                })
                .collect(),
            low_confidence: false,
            descriptors: None,
        }
    }

    #[test]
    fn test_wiry_at_liver_position() {
        let mapping = PatternMapper::default().map(
            &[classification(PulsePosition::LeftGuan, &[(PulseType::Wiry, 0.8)])],
            &[],
        );
        let top = &mapping.patterns[0];
        assert_eq!(top.pattern, Pattern::LiverQiStagnation);
        // 0.9 · (1 − e^(−0.8))
        assert!((top.confidence - 0.9 * (1.0 - (-0.8f64).exp())).abs() < 1e-12);
        assert!(top.supporting_findings[0].contains("left guan"));
        assert!(mapping
            .organ_conditions
            .iter()
            .any(|c| c.organ == Organ::Liver && c.condition == Nature::Stagnation));
    }

    #[test]
    fn test_affinity() {
        let mapper = PatternMapper::default();
        // left cun reflects the heart
        assert_eq!(mapper.affinity(PulsePosition::LeftCun, Pattern::HeartFire), 1.0);
        // wood (liver, left guan) is the mother of fire
        assert_eq!(mapper.affinity(PulsePosition::LeftGuan, Pattern::HeartFire), 0.5);
        assert_eq!(mapper.affinity(PulsePosition::RightCun, Pattern::HeartFire), 0.3);
        // stomach patterns are read at the spleen position
        assert_eq!(mapper.affinity(PulsePosition::RightGuan, Pattern::DampHeat), 1.0);
    }

    #[test]
    fn test_keywords_add_evidence() {
        let classifications = [classification(PulsePosition::LeftGuan, &[(PulseType::Wiry, 0.5)])];
        let mapper = PatternMapper::default();
        let plain = mapper.map(&classifications, &[]);
        let with_symptoms = mapper.map(&classifications, &["Frequent SIGHING".to_string()]);

        let conf = |m: &PatternMapping| {
            m.patterns
                .iter()
                .find(|p| p.pattern == Pattern::LiverQiStagnation)
                .map(|p| p.confidence)
                .unwrap()
        };
        assert!(conf(&with_symptoms) > conf(&plain));
        let p = with_symptoms
            .patterns
            .iter()
            .find(|p| p.pattern == Pattern::LiverQiStagnation)
            .unwrap();
        assert!((p.evidence - (0.5 + 0.4)).abs() < 1e-12);
        assert_eq!(p.evidence_count, 2);
    }

    #[test]
    fn test_low_confidence_fallback() {
        let mapping = PatternMapper::default().map(
            &[classification(PulsePosition::RightCun, &[(PulseType::Long, 0.2)])],
            &[],
        );
        assert_eq!(mapping.patterns.len(), 1);
        assert!(mapping.patterns[0].low_confidence);
        assert!(mapping.patterns[0].confidence < 0.3);
    }

    #[test]
    fn test_unknown_yields_nothing() {
        let mapping = PatternMapper::default().map(
            &[PulseClassification::unknown(PulsePosition::LeftCun)],
            &[],
        );
        assert!(mapping.patterns.is_empty());
        assert!(mapping.organ_conditions.is_empty());
    }

    #[test]
    fn test_confidence_bounded_and_ranked() {
        let all: Vec<PulseClassification> = PulsePosition::ALL
            .iter()
            .map(|p| classification(*p, &[(PulseType::Rapid, 1.0), (PulseType::Surging, 1.0), (PulseType::Racing, 1.0)]))
            .collect();
        let mapping = PatternMapper::new(PatternMapperConfig {
            threshold: 0.0,
            ..PatternMapperConfig::default()
        })
        .map(&all, &[]);

        for p in &mapping.patterns {
            assert!(p.confidence < 1.0 && p.confidence >= 0.0);
            assert!(p.confidence <= p.pattern.info().base_weight);
        }
        assert!(mapping
            .patterns
            .windows(2)
            .all(|w| w[0].confidence >= w[1].confidence));
        assert_eq!(mapping.patterns[0].pattern, Pattern::HeartFire);
    }

    #[test]
    fn test_tie_breaks_by_table_order() {
        let mut tied = vec![
            TcmPattern::new(Pattern::WindDryness, 0.5, AnalysisKind::Pulse),
            TcmPattern::new(Pattern::ExteriorWindCold, 0.5, AnalysisKind::Pulse),
        ];
        rank(&mut tied);
        assert_eq!(tied[0].pattern, Pattern::ExteriorWindCold);

        tied[1].evidence_count = 3;
        rank(&mut tied);
        assert_eq!(tied[0].pattern, Pattern::WindDryness);
    }
}
