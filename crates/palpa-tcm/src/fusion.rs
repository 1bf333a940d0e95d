//! Fusion of pulse, abdominal and skin evidence into one report.
//!
//! Any modality may be absent. Patterns reported by several modalities are
//! united with the independence combination `1 − (1−a)(1−b)`; palpation
//! findings over an organ the pulse already implicates are corroborated the
//! same way. Contradictory natures on one organ (heat against cold,
//! deficiency against excess) attenuate the weaker pattern by
//! `1 − 0.5 · stronger`.
//!
//! Alerts do not depend on pattern confidence: an acute pattern raises an
//! alert from its table acuity even when its evidence is thin.

use std::collections::{BTreeMap, BTreeSet};

use palpa_core::{AnalysisKind, Error, Organ, PulsePosition, PulseType, Result, SessionId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::classifier::{PulseClassification, PulseDescriptors};
use crate::findings::{combine, Finding};
use crate::pattern_mapper::{condition_patterns, organ_conditions, rank, OrganCondition, PatternMapping, TcmPattern};
use crate::patterns::Pattern;
use crate::skin::SkinAnalysis;

/// Severity of an arrhythmic pulse alert
const ARRHYTHMIA_SEVERITY: f64 = 0.8;
/// Scattered pulses signal a critical loss of rhythm
const SCATTERED_SEVERITY: f64 = 0.92;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Severity (inclusive) at which an alert is raised
    pub alert_threshold: f64,
    /// Severity above which an alert requires immediate attention
    pub critical_threshold: f64,
    /// Share of a pulse pattern's confidence lent to an organ-matching finding
    pub corroboration_weight: f64,
    /// Conflicting patterns are scaled by `1 − conflict_attenuation · stronger`
    pub conflict_attenuation: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            alert_threshold: 0.7,
            critical_threshold: 0.9,
            corroboration_weight: 0.5,
            conflict_attenuation: 0.5,
        }
    }
}

/// Pulse-side inputs: per-position classifications and the mapped patterns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseEvidence {
    pub classifications: Vec<PulseClassification>,
    pub mapping: PatternMapping,
}

/// Everything available for one fusion run
#[derive(Debug, Clone, Default)]
pub struct FusionInputs {
    pub session_id: Option<SessionId>,
    /// Defaults to the time of fusion
    pub created_at: Option<Timestamp>,
    pub pulse: Option<PulseEvidence>,
    pub abdominal: Option<Vec<Finding>>,
    pub skin: Option<SkinAnalysis>,
}

impl FusionInputs {
    pub fn is_empty(&self) -> bool {
        self.pulse.is_none() && self.abdominal.is_none() && self.skin.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Finding,
    Pattern,
    Arrhythmia,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthAlert {
    pub alert_type: AlertType,
    pub severity: f64,
    pub description: String,
    pub recommendation: String,
    pub requires_immediate_attention: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseOverview {
    pub positions: Vec<PulseClassification>,
    /// Most frequent primary pulse type across positions
    pub dominant_pulse: Option<PulseType>,
    /// Mean confidence of each position's primary hypothesis
    pub confidence: f64,
    pub low_confidence_positions: usize,
    pub rhythm_irregular: bool,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingsOverview {
    pub finding_count: usize,
    pub implicated_organs: Vec<Organ>,
    pub max_severity: f64,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PalpationOverview {
    pub pulse: Option<PulseOverview>,
    pub abdominal: Option<FindingsOverview>,
    pub skin: Option<FindingsOverview>,
    pub summary: String,
}

/// Fused report for one session. Re-analysis produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComprehensiveAnalysis {
    pub session_id: Option<SessionId>,
    pub created_at: Timestamp,
    pub overview: PalpationOverview,
    pub patterns: Vec<TcmPattern>,
    pub organ_conditions: Vec<OrganCondition>,
    /// Abdominal and skin findings after corroboration
    pub findings: Vec<Finding>,
    /// Sorted by descending severity
    pub alerts: Vec<HealthAlert>,
    /// Mean confidence of the top three patterns
    pub confidence: f64,
    /// Flat metric map consumed by trend analysis
    pub metrics: BTreeMap<String, f64>,
}

impl ComprehensiveAnalysis {
    pub fn pattern(&self, pattern: Pattern) -> Option<&TcmPattern> {
        self.patterns.iter().find(|p| p.pattern == pattern)
    }

    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).copied()
    }

    pub fn has_critical_alert(&self) -> bool {
        self.alerts.iter().any(|a| a.requires_immediate_attention)
    }
}

pub struct FusionEngine {
    config: FusionConfig,
}

impl FusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Fuse whatever modalities are present; fails only when none are
    pub fn fuse(&self, inputs: FusionInputs) -> Result<ComprehensiveAnalysis> {
        if inputs.is_empty() {
            return Err(Error::AnalysisDependencyMissing(
                "no pulse, abdominal or skin analysis available".to_string(),
            ));
        }

        let FusionInputs {
            session_id,
            created_at,
            pulse,
            abdominal,
            skin,
        } = inputs;

        let pulse_patterns: &[TcmPattern] = pulse
            .as_ref()
            .map_or(&[][..], |p| p.mapping.patterns.as_slice());
        let abdominal_patterns = abdominal
            .as_deref()
            .map(|f| condition_patterns(f, AnalysisKind::Abdominal))
            .unwrap_or_default();
        let skin_patterns: &[TcmPattern] = skin.as_ref().map_or(&[][..], |s| s.patterns.as_slice());

        let mut patterns = unite(&[pulse_patterns, abdominal_patterns.as_slice(), skin_patterns]);
        self.resolve_conflicts(&mut patterns);
        rank(&mut patterns);

        let mut abdominal_findings = abdominal;
        let mut skin_findings = skin.as_ref().map(|s| s.findings.clone());
        for finding in abdominal_findings
            .iter_mut()
            .chain(skin_findings.iter_mut())
            .flat_map(|f| f.iter_mut())
        {
            self.corroborate(finding, pulse_patterns);
        }

        let pulse_overview = pulse.as_ref().map(|p| pulse_overview(&p.classifications));
        let abdominal_overview = abdominal_findings.as_deref().map(|f| findings_overview("abdominal", f));
        let skin_overview = skin_findings.as_deref().map(|f| findings_overview("skin", f));

        let findings: Vec<Finding> = abdominal_findings
            .into_iter()
            .chain(skin_findings)
            .flatten()
            .collect();

        let classifications: &[PulseClassification] = pulse
            .as_ref()
            .map_or(&[][..], |p| p.classifications.as_slice());
        let alerts = self.alerts(&findings, &patterns, classifications);

        let top = patterns.iter().take(3).map(|p| p.confidence).collect::<Vec<_>>();
        let confidence = if top.is_empty() {
            0.0
        } else {
            top.iter().sum::<f64>() / top.len() as f64
        };

        let overview = PalpationOverview {
            summary: overall_summary(&patterns, &alerts),
            pulse: pulse_overview,
            abdominal: abdominal_overview,
            skin: skin_overview,
        };

        let mut analysis = ComprehensiveAnalysis {
            session_id,
            created_at: created_at.unwrap_or_else(Timestamp::now),
            organ_conditions: organ_conditions(&patterns),
            overview,
            patterns,
            findings,
            alerts,
            confidence,
            metrics: BTreeMap::new(),
        };
        analysis.metrics = metrics(&analysis);

        tracing::info!(
            session_id = ?analysis.session_id,
            patterns = analysis.patterns.len(),
            findings = analysis.findings.len(),
            alerts = analysis.alerts.len(),
            confidence = analysis.confidence,
            "Fused comprehensive analysis"
        );

        Ok(analysis)
    }

    /// Lend the strongest organ-matching pulse pattern to a palpation finding
    fn corroborate(&self, finding: &mut Finding, pulse_patterns: &[TcmPattern]) {
        let best = pulse_patterns
            .iter()
            .filter(|p| finding.implicates(p.organ))
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence));
        if let Some(pattern) = best {
            let support = self.config.corroboration_weight * pattern.confidence;
            if support > 0.0 {
                finding.corroborate(
                    support,
                    format!("corroborated by pulse pattern {} ({:.2})", pattern.name, pattern.confidence),
                );
            }
        }
    }

    /// Attenuate the weaker of every pair of contradictory patterns on one
    /// organ. Uses confidences from before any attenuation.
    fn resolve_conflicts(&self, patterns: &mut [TcmPattern]) {
        let snapshot: Vec<(f64, usize)> = patterns
            .iter()
            .map(|p| (p.confidence, p.pattern.table_index()))
            .collect();

        let mut factors = vec![1.0; patterns.len()];
        let mut notes: Vec<Vec<String>> = vec![Vec::new(); patterns.len()];

        for i in 0..patterns.len() {
            for j in (i + 1)..patterns.len() {
                let (a, b) = (&patterns[i], &patterns[j]);
                if a.organ.zang() != b.organ.zang() || a.nature.opposite() != Some(b.nature) {
                    continue;
                }
                // lower confidence loses; on a tie the later table entry does
                let (weak, strong) = if (snapshot[i].0, std::cmp::Reverse(snapshot[i].1))
                    < (snapshot[j].0, std::cmp::Reverse(snapshot[j].1))
                {
                    (i, j)
                } else {
                    (j, i)
                };
                let stronger = snapshot[strong].0;
                factors[weak] *= 1.0 - self.config.conflict_attenuation * stronger;
                notes[weak].push(format!(
                    "conflicts with {} ({:.2}); attenuated",
                    patterns[strong].name, stronger
                ));
            }
        }

        for ((pattern, factor), notes) in patterns.iter_mut().zip(factors).zip(notes) {
            if notes.is_empty() {
                continue;
            }
            tracing::debug!(pattern = %pattern.pattern, factor, "Attenuating conflicting pattern");
            pattern.confidence = (pattern.confidence * factor).clamp(0.0, 1.0);
            pattern.supporting_findings.extend(notes);
        }
    }

    fn alerts(
        &self,
        findings: &[Finding],
        patterns: &[TcmPattern],
        classifications: &[PulseClassification],
    ) -> Vec<HealthAlert> {
        let mut alerts = Vec::new();

        for finding in findings.iter().filter(|f| f.severity >= self.config.alert_threshold) {
            let recommendation = if finding.severity > self.config.critical_threshold {
                format!("Seek prompt in-person examination of the {}", finding.region)
            } else {
                format!("Re-examine the {} at the next visit", finding.region)
            };
            alerts.push(self.alert(
                AlertType::Finding,
                finding.severity,
                finding.description.clone(),
                recommendation,
            ));
        }

        for pattern in patterns.iter().filter(|p| p.acuity() >= self.config.alert_threshold) {
            alerts.push(self.alert(
                AlertType::Pattern,
                pattern.acuity(),
                format!("{} indicated (confidence {:.2})", pattern.name, pattern.confidence),
                pattern.pattern.info().recommendation.to_string(),
            ));
        }

        let mut arrhythmic: BTreeMap<PulseType, Vec<PulsePosition>> = BTreeMap::new();
        for classification in classifications {
            for hypothesis in classification.hypotheses.iter().filter(|h| h.pulse_type.is_arrhythmic()) {
                arrhythmic
                    .entry(hypothesis.pulse_type)
                    .or_default()
                    .push(classification.position);
            }
        }
        for (pulse_type, positions) in arrhythmic {
            let severity = if pulse_type == PulseType::Scattered {
                SCATTERED_SEVERITY
            } else {
                ARRHYTHMIA_SEVERITY
            };
            let positions: Vec<&str> = positions.iter().map(|p| p.name()).collect();
            alerts.push(self.alert(
                AlertType::Arrhythmia,
                severity,
                format!("{} pulse at {}", pulse_type, positions.join(", ")),
                "Irregular rhythm; confirm with an electrocardiogram".to_string(),
            ));
        }

        alerts.sort_by(|a, b| b.severity.total_cmp(&a.severity));
        alerts
    }

    fn alert(&self, alert_type: AlertType, severity: f64, description: String, recommendation: String) -> HealthAlert {
        HealthAlert {
            alert_type,
            severity,
            description,
            recommendation,
            requires_immediate_attention: severity > self.config.critical_threshold,
        }
    }
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self::new(FusionConfig::default())
    }
}

/// Union of pattern lists keyed by pattern
fn unite(sources: &[&[TcmPattern]]) -> Vec<TcmPattern> {
    let mut united: BTreeMap<Pattern, TcmPattern> = BTreeMap::new();
    for pattern in sources.iter().flat_map(|s| s.iter()) {
        match united.get_mut(&pattern.pattern) {
            Some(existing) => {
                existing.confidence = combine(existing.confidence, pattern.confidence);
                existing.evidence += pattern.evidence;
                existing.evidence_count += pattern.evidence_count;
                existing.low_confidence = existing.low_confidence && pattern.low_confidence;
                existing
                    .supporting_findings
                    .extend(pattern.supporting_findings.iter().cloned());
                for source in &pattern.sources {
                    if !existing.sources.contains(source) {
                        existing.sources.push(*source);
                    }
                }
            }
            None => {
                united.insert(pattern.pattern, pattern.clone());
            }
        }
    }
    united.into_values().collect()
}

fn pulse_overview(classifications: &[PulseClassification]) -> PulseOverview {
    let mut counts: BTreeMap<PulseType, usize> = BTreeMap::new();
    let mut total = 0.0;
    for c in classifications {
        if let Some(primary) = c.primary() {
            total += primary.confidence;
            if !primary.pulse_type.is_unknown() {
                *counts.entry(primary.pulse_type).or_default() += 1;
            }
        }
    }

    // BTreeMap iterates in table order, so max_by keeps the last maximum;
    // reverse to prefer the earliest type on a tie
    let dominant_pulse = counts
        .iter()
        .rev()
        .max_by_key(|(_, n)| **n)
        .map(|(t, _)| *t);
    let confidence = if classifications.is_empty() {
        0.0
    } else {
        total / classifications.len() as f64
    };
    let low_confidence_positions = classifications.iter().filter(|c| c.low_confidence).count();
    let rhythm_irregular = classifications
        .iter()
        .any(|c| c.hypotheses.iter().any(|h| h.pulse_type.is_arrhythmic()));

    let summary = match dominant_pulse {
        Some(t) => format!(
            "{} pulse predominant across {} positions (mean confidence {:.2}){}",
            t,
            classifications.len(),
            confidence,
            if rhythm_irregular { "; irregular rhythm" } else { "" }
        ),
        None => "Pulse could not be classified".to_string(),
    };

    PulseOverview {
        positions: classifications.to_vec(),
        dominant_pulse,
        confidence,
        low_confidence_positions,
        rhythm_irregular,
        summary,
    }
}

fn findings_overview(label: &str, findings: &[Finding]) -> FindingsOverview {
    let implicated_organs: Vec<Organ> = findings
        .iter()
        .flat_map(|f| f.organs.iter().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let strongest = findings.iter().max_by(|a, b| a.severity.total_cmp(&b.severity));
    let max_severity = strongest.map_or(0.0, |f| f.severity);

    let summary = match strongest {
        Some(f) => format!(
            "{} {} finding(s); most severe: {}",
            findings.len(),
            label,
            f.description
        ),
        None => format!("No notable {} findings", label),
    };

    FindingsOverview {
        finding_count: findings.len(),
        implicated_organs,
        max_severity,
        summary,
    }
}

fn overall_summary(patterns: &[TcmPattern], alerts: &[HealthAlert]) -> String {
    let mut summary = match patterns.first() {
        Some(p) => format!("Primary pattern: {} (confidence {:.2})", p.name, p.confidence),
        None => "No pattern identified".to_string(),
    };
    let urgent = alerts.iter().filter(|a| a.requires_immediate_attention).count();
    if !alerts.is_empty() {
        summary.push_str(&format!("; {} alert(s)", alerts.len()));
    }
    if urgent > 0 {
        summary.push_str(&format!(", {} requiring immediate attention", urgent));
    }
    summary
}

/// Flat metrics tracked across sessions
fn metrics(analysis: &ComprehensiveAnalysis) -> BTreeMap<String, f64> {
    let mut metrics = BTreeMap::new();
    for p in &analysis.patterns {
        metrics.insert(p.pattern.key(), p.confidence);
    }

    if let Some(pulse) = &analysis.overview.pulse {
        metrics.insert("pulse.confidence".to_string(), pulse.confidence);
        let descriptors: Vec<_> = pulse.positions.iter().filter_map(|c| c.descriptors).collect();
        if !descriptors.is_empty() {
            let n = descriptors.len() as f64;
            let mean = |f: fn(&PulseDescriptors) -> f64| descriptors.iter().map(f).sum::<f64>() / n;
            metrics.insert("pulse.rate".to_string(), mean(|d| d.rate));
            metrics.insert("pulse.strength".to_string(), mean(|d| d.strength));
            metrics.insert("pulse.regularity".to_string(), mean(|d| d.regularity));
        }
    }

    for (label, overview) in [
        ("abdominal", &analysis.overview.abdominal),
        ("skin", &analysis.overview.skin),
    ] {
        if let Some(o) = overview {
            metrics.insert(format!("{}.max_severity", label), o.max_severity);
            metrics.insert(format!("{}.finding_count", label), o.finding_count as f64);
        }
    }

    metrics.insert(
        "alerts.max_severity".to_string(),
        analysis.alerts.first().map_or(0.0, |a| a.severity),
    );
    metrics.insert("overall.confidence".to_string(), analysis.confidence);
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abdominal::{AbdominalAnalyzer, AbdominalObservation, AbdominalRegion};
    use crate::classifier::{PulseClassifier, PulseHypothesis};
    use crate::pattern_mapper::PatternMapper;
    use crate::skin::{SkinAnalyzer, SkinObservation, SkinRegion};
    use crate::findings::FindingType;
    use palpa_signal::{FeatureExtractor, SyntheticPulse};

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

    fn pulse(classifications: Vec<PulseClassification>) -> PulseEvidence {
        let mapping = PatternMapper::default().map(&classifications, &[]);
        PulseEvidence {
            classifications,
            mapping,
        }
    }

    fn pulse_with(patterns: Vec<TcmPattern>) -> PulseEvidence {
        PulseEvidence {
            classifications: Vec::new(),
            mapping: PatternMapping {
                organ_conditions: organ_conditions(&patterns),
                patterns,
            },
        }
    }

    fn tender_liver() -> Vec<Finding> {
        AbdominalAnalyzer::default()
            .analyze(&[AbdominalObservation::new(AbdominalRegion::RightHypochondrium).with_tenderness(0.9)])
            .unwrap()
    }

    #[test]
    fn test_no_inputs_is_dependency_missing() {
        let err = FusionEngine::default().fuse(FusionInputs::default()).unwrap_err();
        assert!(matches!(err, Error::AnalysisDependencyMissing(_)));
    }

    #[test]
    fn test_uncorroborated_tenderness_below_corroborated() {
        let engine = FusionEngine::default();

        let alone = engine
            .fuse(FusionInputs {
                abdominal: Some(tender_liver()),
                ..Default::default()
            })
            .unwrap();
        let with_pulse = engine
            .fuse(FusionInputs {
                abdominal: Some(tender_liver()),
                pulse: Some(pulse(vec![classification(
                    PulsePosition::LeftGuan,
                    &[(PulseType::Wiry, 0.8)],
                )])),
                ..Default::default()
            })
            .unwrap();

        let tenderness = |a: &ComprehensiveAnalysis| {
            a.findings
                .iter()
                .find(|f| f.finding_type == FindingType::Tenderness)
                .cloned()
                .unwrap()
        };
        let uncorroborated = tenderness(&alone);
        let corroborated = tenderness(&with_pulse);

        assert!(uncorroborated.organs.contains(&Organ::Liver));
        assert!((uncorroborated.confidence - 0.85).abs() < 1e-12);
        assert!(uncorroborated.confidence < corroborated.confidence);
        assert!(corroborated
            .potential_causes
            .iter()
            .any(|c| c.contains("corroborated by pulse pattern")));

        let stagnation = with_pulse.pattern(Pattern::LiverQiStagnation).unwrap();
        assert!(stagnation.sources.contains(&AnalysisKind::Pulse));
        assert!(stagnation.sources.contains(&AnalysisKind::Abdominal));
    }

    #[test]
    fn test_pattern_union_combines_confidences() {
        let mut from_pulse = TcmPattern::new(Pattern::LiverQiStagnation, 0.5, AnalysisKind::Pulse);
        from_pulse.evidence_count = 1;
        let analysis = FusionEngine::default()
            .fuse(FusionInputs {
                pulse: Some(pulse_with(vec![from_pulse])),
                abdominal: Some(tender_liver()),
                ..Default::default()
            })
            .unwrap();

        // tenderness yields qi stagnation once: 0.6 + 0.05
        let p = analysis.pattern(Pattern::LiverQiStagnation).unwrap();
        assert!((p.confidence - combine(0.5, 0.65)).abs() < 1e-12);
        assert!(p.confidence <= 1.0);
        assert_eq!(p.evidence_count, 2);
    }

    #[test]
    fn test_union_never_exceeds_one() {
        let strong: Vec<TcmPattern> = (0..3)
            .map(|_| TcmPattern::new(Pattern::SpleenQiDeficiency, 0.99, AnalysisKind::Pulse))
            .collect();
        let united = unite(&[strong.as_slice(), strong.as_slice(), strong.as_slice()]);
        assert_eq!(united.len(), 1);
        assert!(united[0].confidence <= 1.0);
        assert_eq!(united[0].sources, vec![AnalysisKind::Pulse]);
    }

    #[test]
    fn test_conflicting_natures_attenuate_weaker() {
        let analysis = FusionEngine::default()
            .fuse(FusionInputs {
                pulse: Some(pulse_with(vec![
                    TcmPattern::new(Pattern::DampHeat, 0.8, AnalysisKind::Pulse),
                    TcmPattern::new(Pattern::ColdExcess, 0.4, AnalysisKind::Pulse),
                    TcmPattern::new(Pattern::LiverQiStagnation, 0.3, AnalysisKind::Pulse),
                ])),
                ..Default::default()
            })
            .unwrap();

        let heat = analysis.pattern(Pattern::DampHeat).unwrap();
        let cold = analysis.pattern(Pattern::ColdExcess).unwrap();
        assert!((heat.confidence - 0.8).abs() < 1e-12);
        assert!((cold.confidence - 0.4 * (1.0 - 0.5 * 0.8)).abs() < 1e-12);
        assert!(cold.supporting_findings.iter().any(|s| s.contains("conflicts with")));

        // different organ: untouched
        let liver = analysis.pattern(Pattern::LiverQiStagnation).unwrap();
        assert!((liver.confidence - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_deficiency_excess_conflict() {
        let analysis = FusionEngine::default()
            .fuse(FusionInputs {
                pulse: Some(pulse_with(vec![
                    TcmPattern::new(Pattern::LiverYangRising, 0.5, AnalysisKind::Pulse),
                    TcmPattern::new(Pattern::LiverBloodDeficiency, 0.7, AnalysisKind::Pulse),
                ])),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(analysis.patterns[0].pattern, Pattern::LiverBloodDeficiency);
        let rising = analysis.pattern(Pattern::LiverYangRising).unwrap();
        assert!((rising.confidence - 0.5 * 0.65).abs() < 1e-12);
    }

    #[test]
    fn test_acute_pattern_alerts_regardless_of_confidence() {
        let analysis = FusionEngine::default()
            .fuse(FusionInputs {
                pulse: Some(pulse_with(vec![TcmPattern::new(
                    Pattern::QiCollapse,
                    0.1,
                    AnalysisKind::Pulse,
                )])),
                ..Default::default()
            })
            .unwrap();

        let alert = &analysis.alerts[0];
        assert_eq!(alert.alert_type, AlertType::Pattern);
        assert!((alert.severity - 0.95).abs() < 1e-12);
        assert!(alert.requires_immediate_attention);
        assert!(analysis.has_critical_alert());
    }

    #[test]
    fn test_arrhythmia_alerts() {
        let analysis = FusionEngine::default()
            .fuse(FusionInputs {
                pulse: Some(pulse(vec![
                    classification(PulsePosition::LeftCun, &[(PulseType::Scattered, 0.7)]),
                    classification(PulsePosition::RightCun, &[(PulseType::Bound, 0.65)]),
                    classification(PulsePosition::RightChi, &[(PulseType::Bound, 0.62)]),
                ])),
                ..Default::default()
            })
            .unwrap();

        let arrhythmia: Vec<&HealthAlert> = analysis
            .alerts
            .iter()
            .filter(|a| a.alert_type == AlertType::Arrhythmia)
            .collect();
        assert_eq!(arrhythmia.len(), 2);

        let scattered = arrhythmia.iter().find(|a| a.description.contains("scattered")).unwrap();
        assert!(scattered.requires_immediate_attention);
        let bound = arrhythmia.iter().find(|a| a.severity == ARRHYTHMIA_SEVERITY).unwrap();
        assert!(!bound.requires_immediate_attention);
        assert!(bound.description.contains("right cun") && bound.description.contains("right chi"));

        assert!(analysis.overview.pulse.as_ref().unwrap().rhythm_irregular);
        assert!(analysis.alerts.windows(2).all(|w| w[0].severity >= w[1].severity));
    }

    #[test]
    fn test_finding_severity_alert_threshold_inclusive() {
        let mut finding = tender_liver().remove(0);
        finding.severity = 0.7;
        let analysis = FusionEngine::default()
            .fuse(FusionInputs {
                abdominal: Some(vec![finding]),
                ..Default::default()
            })
            .unwrap();
        let alert = analysis
            .alerts
            .iter()
            .find(|a| a.alert_type == AlertType::Finding)
            .unwrap();
        assert!(!alert.requires_immediate_attention);
    }

    #[test]
    fn test_skin_only_overview_and_metrics() {
        let skin = SkinAnalyzer::new()
            .analyze(&[
                SkinObservation::new(SkinRegion::Palm).with_moisture(0.1),
                SkinObservation::new(SkinRegion::Forearm).with_moisture(0.1),
            ])
            .unwrap();
        let analysis = FusionEngine::default()
            .fuse(FusionInputs {
                skin: Some(skin),
                ..Default::default()
            })
            .unwrap();

        assert!(analysis.overview.pulse.is_none());
        assert!(analysis.overview.abdominal.is_none());
        let overview = analysis.overview.skin.as_ref().unwrap();
        assert_eq!(overview.finding_count, analysis.findings.len());
        assert!(!analysis.patterns.is_empty());

        assert_eq!(analysis.metric("skin.finding_count"), Some(overview.finding_count as f64));
        assert_eq!(analysis.metric("overall.confidence"), Some(analysis.confidence));
        for p in &analysis.patterns {
            assert_eq!(analysis.metric(&p.pattern.key()), Some(p.confidence));
        }
    }

    #[test]
    fn test_confidence_is_mean_of_top_three() {
        let analysis = FusionEngine::default()
            .fuse(FusionInputs {
                pulse: Some(pulse_with(vec![
                    TcmPattern::new(Pattern::SpleenQiDeficiency, 0.9, AnalysisKind::Pulse),
                    TcmPattern::new(Pattern::LungQiDeficiency, 0.6, AnalysisKind::Pulse),
                    TcmPattern::new(Pattern::LiverQiStagnation, 0.3, AnalysisKind::Pulse),
                    TcmPattern::new(Pattern::ExteriorWindCold, 0.1, AnalysisKind::Pulse),
                ])),
                ..Default::default()
            })
            .unwrap();
        assert!((analysis.confidence - 0.6).abs() < 1e-12);
        assert!(analysis.overview.summary.starts_with("Primary pattern: "));
    }

    #[test]
    fn test_six_good_positions_produce_patterns() {
        let session = SessionId::new();
        let extractor = FeatureExtractor::default();
        let sets: Vec<_> = PulsePosition::ALL
            .iter()
            .map(|p| {
                let packets = SyntheticPulse::default().packets(session, *p, 10.0);
                extractor.extract(session, &packets, false).unwrap()
            })
            .collect();

        let classifications = PulseClassifier::default().classify_all(&sets);
        let mapping = PatternMapper::default().map(&classifications, &[]);
        let analysis = FusionEngine::default()
            .fuse(FusionInputs {
                session_id: Some(session),
                pulse: Some(PulseEvidence {
                    classifications,
                    mapping,
                }),
                ..Default::default()
            })
            .unwrap();

        assert!(!analysis.patterns.is_empty());
        assert!(analysis.confidence > 0.0 && analysis.confidence <= 1.0);
        assert!(analysis.metric("pulse.regularity").is_some());
        assert_eq!(analysis.overview.pulse.as_ref().unwrap().positions.len(), 6);
    }
}
