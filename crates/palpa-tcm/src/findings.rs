//! Palpation findings shared by the abdominal and skin analyzers.

use std::fmt;

use palpa_core::Organ;
use serde::{Deserialize, Serialize};

use crate::abdominal::AbdominalRegion;
use crate::patterns::Pattern;
use crate::skin::SkinRegion;

/// Independence-style combination of two confidences: `1 - (1-a)(1-b)`.
///
/// Never exceeds 1 and never lowers either input.
pub fn combine(a: f64, b: f64) -> f64 {
    let a = a.clamp(0.0, 1.0);
    let b = b.clamp(0.0, 1.0);
    1.0 - (1.0 - a) * (1.0 - b)
}

/// Underlying pathological conditions a finding may point to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    QiDeficiency,
    BloodDeficiency,
    QiBloodDeficiency,
    YinDeficiency,
    YangDeficiency,
    FluidDeficiency,
    SpleenDeficiency,
    KidneyDeficiency,
    Dampness,
    PhlegmDampness,
    WaterRetention,
    DampHeat,
    QiStagnation,
    BloodStasis,
    ColdCongealing,
    Heat,
    HeatToxin,
    WindDryness,
}

impl Condition {
    pub fn name(&self) -> &'static str {
        match self {
            Condition::QiDeficiency => "qi deficiency",
            Condition::BloodDeficiency => "blood deficiency",
            Condition::QiBloodDeficiency => "qi and blood deficiency",
            Condition::YinDeficiency => "yin deficiency",
            Condition::YangDeficiency => "yang deficiency",
            Condition::FluidDeficiency => "fluid deficiency",
            Condition::SpleenDeficiency => "spleen deficiency",
            Condition::KidneyDeficiency => "kidney deficiency",
            Condition::Dampness => "dampness",
            Condition::PhlegmDampness => "phlegm dampness",
            Condition::WaterRetention => "water retention",
            Condition::DampHeat => "damp heat",
            Condition::QiStagnation => "qi stagnation",
            Condition::BloodStasis => "blood stasis",
            Condition::ColdCongealing => "cold congealing",
            Condition::Heat => "heat",
            Condition::HeatToxin => "heat toxin",
            Condition::WindDryness => "wind dryness",
        }
    }

    /// Pattern this condition is grouped under
    pub fn pattern(&self) -> Pattern {
        match self {
            Condition::QiDeficiency | Condition::BloodDeficiency | Condition::QiBloodDeficiency => {
                Pattern::QiBloodDeficiency
            }
            Condition::YinDeficiency | Condition::FluidDeficiency => Pattern::KidneyYinDeficiency,
            Condition::YangDeficiency | Condition::KidneyDeficiency => Pattern::KidneyYangDeficiency,
            Condition::SpleenDeficiency => Pattern::SpleenQiDeficiency,
            Condition::Dampness | Condition::PhlegmDampness | Condition::WaterRetention => {
                Pattern::PhlegmDampness
            }
            Condition::DampHeat => Pattern::DampHeat,
            Condition::QiStagnation => Pattern::LiverQiStagnation,
            Condition::BloodStasis => Pattern::BloodStasis,
            Condition::ColdCongealing => Pattern::ColdExcess,
            Condition::Heat | Condition::HeatToxin => Pattern::HeatToxin,
            Condition::WindDryness => Pattern::WindDryness,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What was palpated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingType {
    Tenderness,
    Tension,
    Mass,
    Texture,
    Temperature,
    Moisture,
    Elasticity,
    Color,
    /// Merged from several regions by a correlation pass
    Correlation,
}

/// Region a finding was observed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "area", content = "region", rename_all = "snake_case")]
pub enum BodyRegion {
    Abdominal(AbdominalRegion),
    Skin(SkinRegion),
}

impl BodyRegion {
    pub fn name(&self) -> &'static str {
        match self {
            BodyRegion::Abdominal(r) => r.name(),
            BodyRegion::Skin(r) => r.name(),
        }
    }

    pub fn organs(&self) -> &'static [Organ] {
        match self {
            BodyRegion::Abdominal(r) => r.organs(),
            BodyRegion::Skin(r) => r.organs(),
        }
    }
}

impl fmt::Display for BodyRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One abdominal or skin finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub region: BodyRegion,
    /// Further regions merged into this finding
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_regions: Vec<BodyRegion>,
    pub finding_type: FindingType,
    pub description: String,
    pub confidence: f64,
    pub potential_causes: Vec<String>,
    pub organs: Vec<Organ>,
    pub conditions: Vec<Condition>,
    pub severity: f64,
}

impl Finding {
    pub fn new(
        region: BodyRegion,
        finding_type: FindingType,
        description: impl Into<String>,
        confidence: f64,
        severity: f64,
    ) -> Self {
        Self {
            region,
            related_regions: Vec::new(),
            finding_type,
            description: description.into(),
            confidence: confidence.clamp(0.0, 1.0),
            potential_causes: Vec::new(),
            organs: region.organs().to_vec(),
            conditions: Vec::new(),
            severity: severity.clamp(0.0, 1.0),
        }
    }

    /// Attach conditions and rebuild the cause list
    pub fn with_conditions(mut self, conditions: &[Condition]) -> Self {
        for c in conditions {
            if !self.conditions.contains(c) {
                self.conditions.push(*c);
            }
        }
        self.refresh_causes();
        self
    }

    pub fn implicates(&self, organ: Organ) -> bool {
        self.organs.iter().any(|o| o.zang() == organ.zang())
    }

    /// All regions covered by this finding
    pub fn regions(&self) -> impl Iterator<Item = &BodyRegion> {
        std::iter::once(&self.region).chain(self.related_regions.iter())
    }

    /// Raise confidence by independent supporting evidence
    pub fn corroborate(&mut self, support: f64, note: impl Into<String>) {
        self.confidence = combine(self.confidence, support);
        self.potential_causes.push(note.into());
    }

    pub(crate) fn refresh_causes(&mut self) {
        let mut causes: Vec<String> = self
            .organs
            .iter()
            .map(|o| format!("{} involvement", o.name()))
            .collect();
        causes.extend(self.conditions.iter().map(|c| c.name().to_string()));
        self.potential_causes = causes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_bounds() {
        assert_eq!(combine(0.0, 0.0), 0.0);
        assert_eq!(combine(1.0, 0.3), 1.0);
        assert!((combine(0.5, 0.5) - 0.75).abs() < 1e-12);
        assert!(combine(0.9, 0.9) <= 1.0);
        assert!(combine(0.6, 0.2) >= 0.6);
    }

    #[test]
    fn test_finding_references_region_organs() {
        let region = BodyRegion::Abdominal(AbdominalRegion::RightHypochondrium);
        let finding = Finding::new(region, FindingType::Tenderness, "tender", 0.8, 0.9)
            .with_conditions(&[Condition::QiStagnation]);

        assert!(finding.implicates(Organ::Liver));
        assert!(finding.potential_causes.iter().any(|c| c.contains("liver")));
        assert!(finding.potential_causes.iter().any(|c| c == "qi stagnation"));
    }

    #[test]
    fn test_corroborate_raises_confidence() {
        let region = BodyRegion::Skin(SkinRegion::Palm);
        let mut finding = Finding::new(region, FindingType::Moisture, "dry", 0.6, 0.5);
        finding.corroborate(0.5, "seen elsewhere");
        assert!((finding.confidence - 0.8).abs() < 1e-12);
        assert_eq!(finding.potential_causes.last().unwrap(), "seen elsewhere");
    }
}
