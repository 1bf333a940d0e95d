//! Skin palpation over eight regions.
//!
//! Moisture, elasticity and temperature arrive normalised to [0, 1] with 0.5
//! as the healthy midpoint; texture and colour are free-text examiner notes
//! matched by keyword. Mid-range values produce no finding.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use palpa_core::{AnalysisKind, Error, Organ, Result};
use serde::{Deserialize, Serialize};

use crate::findings::{combine, BodyRegion, Condition, Finding, FindingType};
use crate::pattern_mapper::{condition_patterns, TcmPattern};

/// Confidence lent to a finding when its condition recurs within a group
const GROUP_SUPPORT: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkinRegion {
    Forehead,
    Cheeks,
    Chest,
    Forearm,
    Palm,
    DorsalHand,
    LowerBack,
    Shin,
}

/// Anatomical groups used by the correlation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionGroup {
    Face,
    UpperLimb,
    Trunk,
    Extremities,
}

impl RegionGroup {
    pub fn name(&self) -> &'static str {
        match self {
            RegionGroup::Face => "face",
            RegionGroup::UpperLimb => "upper limb",
            RegionGroup::Trunk => "trunk",
            RegionGroup::Extremities => "extremities",
        }
    }
}

impl SkinRegion {
    pub const ALL: [SkinRegion; 8] = [
        SkinRegion::Forehead,
        SkinRegion::Cheeks,
        SkinRegion::Chest,
        SkinRegion::Forearm,
        SkinRegion::Palm,
        SkinRegion::DorsalHand,
        SkinRegion::LowerBack,
        SkinRegion::Shin,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SkinRegion::Forehead => "forehead",
            SkinRegion::Cheeks => "cheeks",
            SkinRegion::Chest => "chest",
            SkinRegion::Forearm => "forearm",
            SkinRegion::Palm => "palm",
            SkinRegion::DorsalHand => "dorsal hand",
            SkinRegion::LowerBack => "lower back",
            SkinRegion::Shin => "shin",
        }
    }

    pub fn organs(&self) -> &'static [Organ] {
        match self {
            SkinRegion::Forehead => &[Organ::Heart, Organ::Stomach],
            SkinRegion::Cheeks => &[Organ::Lung, Organ::Liver],
            SkinRegion::Chest => &[Organ::Lung, Organ::Heart],
            SkinRegion::Forearm => &[Organ::Lung],
            SkinRegion::Palm => &[Organ::Heart, Organ::Spleen],
            SkinRegion::DorsalHand => &[Organ::LargeIntestine],
            SkinRegion::LowerBack => &[Organ::Kidney],
            SkinRegion::Shin => &[Organ::Spleen, Organ::Kidney],
        }
    }

    pub fn groups(&self) -> &'static [RegionGroup] {
        match self {
            SkinRegion::Forehead | SkinRegion::Cheeks => &[RegionGroup::Face],
            SkinRegion::Forearm => &[RegionGroup::UpperLimb],
            SkinRegion::Palm | SkinRegion::DorsalHand => {
                &[RegionGroup::UpperLimb, RegionGroup::Extremities]
            }
            SkinRegion::Chest | SkinRegion::LowerBack => &[RegionGroup::Trunk],
            SkinRegion::Shin => &[RegionGroup::Extremities],
        }
    }
}

impl fmt::Display for SkinRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkinObservation {
    pub region: SkinRegion,
    pub moisture: f64,
    pub elasticity: f64,
    pub temperature: f64,
    #[serde(default)]
    pub texture: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl SkinObservation {
    /// Observation with every level at the healthy midpoint
    pub fn new(region: SkinRegion) -> Self {
        Self {
            region,
            moisture: 0.5,
            elasticity: 0.5,
            temperature: 0.5,
            texture: None,
            color: None,
        }
    }

    pub fn with_moisture(mut self, level: f64) -> Self {
        self.moisture = level;
        self
    }

    pub fn with_elasticity(mut self, level: f64) -> Self {
        self.elasticity = level;
        self
    }

    pub fn with_temperature(mut self, level: f64) -> Self {
        self.temperature = level;
        self
    }

    pub fn with_texture(mut self, texture: impl Into<String>) -> Self {
        self.texture = Some(texture.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("moisture", self.moisture),
            ("elasticity", self.elasticity),
            ("temperature", self.temperature),
        ] {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                return Err(Error::InvalidInput(format!(
                    "{} {} out of range [0, 1] for {}",
                    name, v, self.region
                )));
            }
        }
        Ok(())
    }
}

/// Result of a skin examination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkinAnalysis {
    pub findings: Vec<Finding>,
    pub patterns: Vec<TcmPattern>,
}

#[derive(Default)]
pub struct SkinAnalyzer;

impl SkinAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, observations: &[SkinObservation]) -> Result<SkinAnalysis> {
        let mut seen = BTreeSet::new();
        for obs in observations {
            obs.validate()?;
            if !seen.insert(obs.region) {
                return Err(Error::InvalidInput(format!(
                    "region {} observed more than once",
                    obs.region
                )));
            }
        }

        let mut findings: Vec<Finding> = observations
            .iter()
            .flat_map(|obs| self.analyze_region(obs))
            .collect();
        let systemic = correlate(&mut findings);
        findings.extend(systemic);

        let patterns = condition_patterns(&findings, AnalysisKind::Skin);

        tracing::debug!(
            regions = observations.len(),
            findings = findings.len(),
            patterns = patterns.len(),
            "Skin analysis complete"
        );
        Ok(SkinAnalysis { findings, patterns })
    }

    pub fn analyze_region(&self, obs: &SkinObservation) -> Vec<Finding> {
        let region = BodyRegion::Skin(obs.region);
        let name = obs.region.name();
        let mut out = Vec::new();

        let mut push = |finding_type, description: String, confidence, severity, conditions: &[Condition]| {
            out.push(
                Finding::new(region, finding_type, description, confidence, severity)
                    .with_conditions(conditions),
            );
        };

        use Condition::*;
        let m = obs.moisture;
        if m < 0.2 {
            push(
                FindingType::Moisture,
                format!("Extremely dry skin on the {}", name),
                0.9,
                0.6,
                &[YinDeficiency, BloodDeficiency, FluidDeficiency, QiBloodDeficiency],
            );
        } else if m < 0.3 {
            push(FindingType::Moisture, format!("Dry skin on the {}", name), 0.8, 0.4, &[FluidDeficiency, BloodDeficiency]);
        } else if m > 0.85 {
            push(
                FindingType::Moisture,
                format!("Excessively moist skin on the {}", name),
                0.9,
                0.5,
                &[Dampness, PhlegmDampness, SpleenDeficiency],
            );
        } else if m > 0.7 {
            push(FindingType::Moisture, format!("Moist skin on the {}", name), 0.8, 0.3, &[DampHeat, SpleenDeficiency]);
        }

        let e = obs.elasticity;
        if e < 0.2 {
            push(
                FindingType::Elasticity,
                format!("Very poor elasticity on the {}", name),
                0.9,
                0.6,
                &[QiBloodDeficiency, KidneyDeficiency],
            );
        } else if e < 0.3 {
            push(
                FindingType::Elasticity,
                format!("Poor elasticity on the {}", name),
                0.8,
                0.4,
                &[QiDeficiency, BloodDeficiency, KidneyDeficiency],
            );
        }

        let t = obs.temperature;
        if t < 0.3 {
            push(
                FindingType::Temperature,
                format!("Cold skin on the {}", name),
                0.9,
                0.6,
                &[YangDeficiency, ColdCongealing, QiBloodDeficiency],
            );
        } else if t < 0.4 {
            push(FindingType::Temperature, format!("Cool skin on the {}", name), 0.8, 0.3, &[YangDeficiency]);
        } else if t > 0.7 {
            push(
                FindingType::Temperature,
                format!("Burning hot skin on the {}", name),
                0.9,
                0.7,
                &[YinDeficiency, HeatToxin, DampHeat],
            );
        } else if t > 0.6 {
            push(FindingType::Temperature, format!("Warm skin on the {}", name), 0.8, 0.3, &[Heat]);
        }

        if let Some(texture) = obs.texture.as_deref().map(str::to_lowercase) {
            let has = |terms: &[&str]| terms.iter().any(|k| texture.contains(k));
            if has(&["rough", "coarse", "scaly"]) {
                push(FindingType::Texture, format!("Rough skin on the {}", name), 0.85, 0.3, &[BloodDeficiency, WindDryness, FluidDeficiency]);
            } else if has(&["puffy", "swollen", "edema", "oedema"]) {
                push(FindingType::Texture, format!("Puffy skin on the {}", name), 0.85, 0.5, &[WaterRetention, YangDeficiency, PhlegmDampness]);
            } else if has(&["tight", "taut"]) {
                push(FindingType::Texture, format!("Taut skin on the {}", name), 0.8, 0.4, &[BloodStasis, QiStagnation]);
            }
        }

        if let Some(color) = obs.color.as_deref().map(str::to_lowercase) {
            let has = |terms: &[&str]| terms.iter().any(|k| color.contains(k));
            if has(&["pale", "white"]) {
                push(FindingType::Color, format!("Pale skin on the {}", name), 0.85, 0.4, &[QiBloodDeficiency, BloodDeficiency, YangDeficiency]);
            } else if has(&["purple", "cyan", "bluish", "dusky"]) {
                push(FindingType::Color, format!("Purplish skin on the {}", name), 0.9, 0.6, &[BloodStasis, QiStagnation, ColdCongealing]);
            } else if has(&["sallow"]) {
                push(FindingType::Color, format!("Sallow skin on the {}", name), 0.85, 0.4, &[SpleenDeficiency, QiBloodDeficiency]);
            } else if has(&["yellow"]) {
                push(FindingType::Color, format!("Yellow skin on the {}", name), 0.8, 0.6, &[DampHeat]);
            } else if has(&["dark", "black"]) {
                push(FindingType::Color, format!("Darkened skin on the {}", name), 0.85, 0.5, &[KidneyDeficiency, BloodStasis]);
            } else if has(&["red", "flushed"]) {
                push(FindingType::Color, format!("Flushed skin on the {}", name), 0.85, 0.4, &[Heat, YinDeficiency]);
            }
        }

        out
    }
}

/// Group pass: a condition seen in two or more regions of one group is
/// upgraded in each and merged into a systemic finding.
fn correlate(findings: &mut [Finding]) -> Vec<Finding> {
    let mut by_group: BTreeMap<(RegionGroup, Condition), Vec<usize>> = BTreeMap::new();
    for (i, f) in findings.iter().enumerate() {
        let BodyRegion::Skin(region) = f.region else {
            continue;
        };
        for group in region.groups() {
            for condition in &f.conditions {
                by_group.entry((*group, *condition)).or_default().push(i);
            }
        }
    }

    let mut systemic = Vec::new();
    let mut upgraded = BTreeSet::new();
    for ((group, condition), indices) in by_group {
        let regions: BTreeSet<BodyRegion> = indices.iter().map(|&i| findings[i].region).collect();
        if regions.len() < 2 {
            continue;
        }

        let confidence = indices
            .iter()
            .fold(0.0, |acc, &i| combine(acc, findings[i].confidence));
        let severity = indices.iter().map(|&i| findings[i].severity).fold(0.0, f64::max);

        for &i in &indices {
            if upgraded.insert((i, group)) {
                findings[i].corroborate(
                    GROUP_SUPPORT,
                    format!("{} also present elsewhere on the {}", condition, group.name()),
                );
            }
        }

        let mut regions = regions.into_iter();
        let Some(first) = regions.next() else {
            continue;
        };
        let mut merged = Finding::new(
            first,
            FindingType::Correlation,
            format!("Systemic {} across the {}", condition, group.name()),
            confidence,
            severity,
        );
        merged.related_regions = regions.collect();
        let mut organs: Vec<Organ> = merged.regions().flat_map(|r| r.organs().iter().copied()).collect();
        organs.sort();
        organs.dedup();
        merged.organs = organs;
        systemic.push(merged.with_conditions(&[condition]));
    }
    systemic
}
