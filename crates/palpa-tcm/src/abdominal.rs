//! Abdominal palpation: nine regions on a 3×3 grid.
//!
//! ```text
//!   right hypochondrium | epigastrium  | left hypochondrium
//!   right lumbar        | umbilical    | left lumbar
//!   right iliac         | hypogastrium | left iliac
//! ```
//!
//! Each region is scored on its own, then a correlation pass looks across
//! regions: adjacent tender regions merge into a diffuse finding, regions
//! sharing an organ corroborate each other, and rigid tension under both
//! costal margins becomes a liver qi stagnation finding.

use std::collections::BTreeSet;
use std::fmt;

use palpa_core::{Error, Organ, Result};
use serde::{Deserialize, Serialize};

use crate::findings::{combine, BodyRegion, Condition, Finding, FindingType};

/// Share of a neighbouring finding's confidence lent to a constituent
const ADJACENT_SUPPORT: f64 = 0.5;

/// Share of an organ-linked finding's confidence lent across regions
const ORGAN_SUPPORT: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbdominalRegion {
    RightHypochondrium,
    Epigastrium,
    LeftHypochondrium,
    RightLumbar,
    Umbilical,
    LeftLumbar,
    RightIliac,
    Hypogastrium,
    LeftIliac,
}

impl AbdominalRegion {
    pub const ALL: [AbdominalRegion; 9] = [
        AbdominalRegion::RightHypochondrium,
        AbdominalRegion::Epigastrium,
        AbdominalRegion::LeftHypochondrium,
        AbdominalRegion::RightLumbar,
        AbdominalRegion::Umbilical,
        AbdominalRegion::LeftLumbar,
        AbdominalRegion::RightIliac,
        AbdominalRegion::Hypogastrium,
        AbdominalRegion::LeftIliac,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AbdominalRegion::RightHypochondrium => "right hypochondrium",
            AbdominalRegion::Epigastrium => "epigastrium",
            AbdominalRegion::LeftHypochondrium => "left hypochondrium",
            AbdominalRegion::RightLumbar => "right lumbar",
            AbdominalRegion::Umbilical => "umbilical",
            AbdominalRegion::LeftLumbar => "left lumbar",
            AbdominalRegion::RightIliac => "right iliac",
            AbdominalRegion::Hypogastrium => "hypogastrium",
            AbdominalRegion::LeftIliac => "left iliac",
        }
    }

    pub fn organs(&self) -> &'static [Organ] {
        match self {
            AbdominalRegion::RightHypochondrium => &[Organ::Liver, Organ::Gallbladder],
            AbdominalRegion::Epigastrium => &[Organ::Stomach, Organ::Heart],
            AbdominalRegion::LeftHypochondrium => &[Organ::Liver, Organ::Spleen],
            AbdominalRegion::RightLumbar => &[Organ::LargeIntestine, Organ::Kidney],
            AbdominalRegion::Umbilical => &[Organ::Spleen, Organ::SmallIntestine],
            AbdominalRegion::LeftLumbar => &[Organ::LargeIntestine, Organ::Kidney],
            AbdominalRegion::RightIliac => &[Organ::LargeIntestine],
            AbdominalRegion::Hypogastrium => &[Organ::Bladder, Organ::Kidney],
            AbdominalRegion::LeftIliac => &[Organ::LargeIntestine],
        }
    }

    /// (row, column) on the grid
    pub fn cell(&self) -> (i32, i32) {
        let i = *self as i32;
        (i / 3, i % 3)
    }

    /// Edge-sharing neighbours on the grid
    pub fn is_adjacent(&self, other: AbdominalRegion) -> bool {
        let (r1, c1) = self.cell();
        let (r2, c2) = other.cell();
        (r1 - r2).abs() + (c1 - c2).abs() == 1
    }
}

impl fmt::Display for AbdominalRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A palpable mass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassObservation {
    pub size_cm: f64,
    /// Fixed, hard masses are graded more severe
    pub fixed: bool,
}

/// Examiner's observation of one region, levels normalised to [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbdominalObservation {
    pub region: AbdominalRegion,
    pub tenderness: f64,
    pub tension: f64,
    #[serde(default)]
    pub mass: Option<MassObservation>,
    #[serde(default)]
    pub texture: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
}

impl AbdominalObservation {
    pub fn new(region: AbdominalRegion) -> Self {
        Self {
            region,
            tenderness: 0.0,
            tension: 0.5,
            mass: None,
            texture: None,
            temperature: None,
        }
    }

    pub fn with_tenderness(mut self, level: f64) -> Self {
        self.tenderness = level;
        self
    }

    pub fn with_tension(mut self, level: f64) -> Self {
        self.tension = level;
        self
    }

    pub fn with_mass(mut self, size_cm: f64, fixed: bool) -> Self {
        self.mass = Some(MassObservation { size_cm, fixed });
        self
    }

    pub fn with_texture(mut self, texture: impl Into<String>) -> Self {
        self.texture = Some(texture.into());
        self
    }

    pub fn with_temperature(mut self, level: f64) -> Self {
        self.temperature = Some(level);
        self
    }

    fn validate(&self) -> Result<()> {
        let check = |name: &str, v: f64| {
            if v.is_finite() && (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(Error::InvalidInput(format!(
                    "{} {} out of range [0, 1] for {}",
                    name, v, self.region
                )))
            }
        };
        check("tenderness", self.tenderness)?;
        check("tension", self.tension)?;
        if let Some(t) = self.temperature {
            check("temperature", t)?;
        }
        if let Some(m) = &self.mass {
            if !m.size_cm.is_finite() || m.size_cm < 0.0 {
                return Err(Error::InvalidInput(format!(
                    "mass size {} invalid for {}",
                    m.size_cm, self.region
                )));
            }
        }
        Ok(())
    }
}

/// Abdominal analyzer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AbdominalConfig {
    pub strong_tenderness: f64,
    pub moderate_tenderness: f64,
    pub rigid_tension: f64,
    pub lax_tension: f64,
}

impl Default for AbdominalConfig {
    fn default() -> Self {
        Self {
            strong_tenderness: 0.8,
            moderate_tenderness: 0.5,
            rigid_tension: 0.7,
            lax_tension: 0.2,
        }
    }
}

pub struct AbdominalAnalyzer {
    config: AbdominalConfig,
}

impl AbdominalAnalyzer {
    pub fn new(config: AbdominalConfig) -> Self {
        Self { config }
    }

    /// Score every observation, then run the correlation pass.
    ///
    /// Fails on out-of-range levels or a region observed twice.
    pub fn analyze(&self, observations: &[AbdominalObservation]) -> Result<Vec<Finding>> {
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

        let merged = self.correlate(observations, &mut findings);
        findings.extend(merged);

        tracing::debug!(
            regions = observations.len(),
            findings = findings.len(),
            "Abdominal analysis complete"
        );
        Ok(findings)
    }

    /// Per-region rules
    pub fn analyze_region(&self, obs: &AbdominalObservation) -> Vec<Finding> {
        let region = BodyRegion::Abdominal(obs.region);
        let mut out = Vec::new();

        if obs.tenderness > self.config.strong_tenderness {
            out.push(
                Finding::new(
                    region,
                    FindingType::Tenderness,
                    format!("Marked tenderness in the {}", obs.region),
                    0.85,
                    obs.tenderness,
                )
                .with_conditions(&[Condition::QiStagnation, Condition::BloodStasis]),
            );
        } else if obs.tenderness > self.config.moderate_tenderness {
            out.push(
                Finding::new(
                    region,
                    FindingType::Tenderness,
                    format!("Moderate tenderness in the {}", obs.region),
                    0.7,
                    obs.tenderness,
                )
                .with_conditions(&[Condition::QiStagnation]),
            );
        }

        if obs.tension > self.config.rigid_tension {
            out.push(
                Finding::new(
                    region,
                    FindingType::Tension,
                    format!("Rigid abdominal wall over the {}", obs.region),
                    0.8,
                    0.8 * obs.tension,
                )
                .with_conditions(&[Condition::QiStagnation]),
            );
        } else if obs.tension < self.config.lax_tension {
            out.push(
                Finding::new(
                    region,
                    FindingType::Tension,
                    format!("Lax, weak abdominal wall over the {}", obs.region),
                    0.7,
                    0.4,
                )
                .with_conditions(&[Condition::QiDeficiency, Condition::SpleenDeficiency]),
            );
        }

        if let Some(mass) = &obs.mass {
            let (description, severity) = if mass.fixed {
                (format!("Fixed {:.1} cm mass in the {}", mass.size_cm, obs.region), 0.85)
            } else {
                (format!("Mobile {:.1} cm mass in the {}", mass.size_cm, obs.region), 0.75)
            };
            out.push(
                Finding::new(region, FindingType::Mass, description, 0.8, severity)
                    .with_conditions(&[Condition::BloodStasis, Condition::PhlegmDampness]),
            );
        }

        if let Some(texture) = obs.texture.as_deref().filter(|t| !t.trim().is_empty()) {
            out.push(texture_finding(region, texture));
        }

        if let Some(t) = obs.temperature {
            if t < 0.3 {
                out.push(
                    Finding::new(region, FindingType::Temperature, format!("Cold {}", obs.region), 0.8, 0.5)
                        .with_conditions(&[Condition::ColdCongealing, Condition::YangDeficiency]),
                );
            } else if t > 0.7 {
                out.push(
                    Finding::new(region, FindingType::Temperature, format!("Hot {}", obs.region), 0.8, 0.5)
                        .with_conditions(&[Condition::Heat]),
                );
            }
        }

        out
    }

    /// Cross-region pass. Upgrades `findings` in place and returns new merged findings.
    fn correlate(&self, observations: &[AbdominalObservation], findings: &mut [Finding]) -> Vec<Finding> {
        let mut merged = Vec::new();

        // Diffuse tenderness: connected components of tender regions
        let tender: Vec<usize> = findings
            .iter()
            .enumerate()
            .filter(|(_, f)| f.finding_type == FindingType::Tenderness)
            .map(|(i, _)| i)
            .collect();

        for component in components(&tender, findings) {
            if component.len() < 2 {
                continue;
            }
            let originals: Vec<f64> = component.iter().map(|&i| findings[i].confidence).collect();
            for (k, &i) in component.iter().enumerate() {
                let neighbour_best = component
                    .iter()
                    .enumerate()
                    .filter(|(j, &other)| *j != k && abdominal(&findings[other]).map_or(false, |r| {
                        abdominal(&findings[i]).map_or(false, |own| own.is_adjacent(r))
                    }))
                    .map(|(j, _)| originals[j])
                    .fold(0.0, f64::max);
                findings[i].corroborate(
                    ADJACENT_SUPPORT * neighbour_best,
                    "tenderness extends to adjacent regions",
                );
            }

            let confidence = originals.iter().fold(0.0, |acc, c| combine(acc, *c));
            let severity = component
                .iter()
                .map(|&i| findings[i].severity)
                .fold(0.0, f64::max);
            let first = findings[component[0]].region;
            let mut diffuse = Finding::new(
                first,
                FindingType::Correlation,
                format!("Diffuse tenderness across {} adjacent regions", component.len()),
                confidence,
                severity,
            );
            let mut organs: Vec<Organ> = Vec::new();
            let mut conditions: Vec<Condition> = Vec::new();
            for &i in &component[1..] {
                diffuse.related_regions.push(findings[i].region);
            }
            for &i in &component {
                organs.extend(findings[i].organs.iter().copied());
                conditions.extend(findings[i].conditions.iter().copied());
            }
            organs.sort();
            organs.dedup();
            diffuse.organs = organs;
            merged.push(diffuse.with_conditions(&conditions));
        }

        // Organ-linked corroboration across non-adjacent regions
        let snapshot: Vec<(BodyRegion, Vec<Organ>, f64)> = findings
            .iter()
            .map(|f| (f.region, f.organs.clone(), f.confidence))
            .collect();
        for (i, finding) in findings.iter_mut().enumerate() {
            let support = snapshot
                .iter()
                .enumerate()
                .filter(|(j, (region, organs, _))| {
                    *j != i
                        && *region != finding.region
                        && !adjacent(*region, finding.region)
                        && organs.iter().any(|o| finding.organs.contains(o))
                })
                .map(|(_, (region, _, c))| (*region, *c))
                .fold(None, |best: Option<(BodyRegion, f64)>, (r, c)| match best {
                    Some((_, bc)) if bc >= c => best,
                    _ => Some((r, c)),
                });
            if let Some((region, c)) = support {
                finding.corroborate(
                    ORGAN_SUPPORT * c,
                    format!("shared organ finding in the {}", region),
                );
            }
        }

        // Bilateral hypochondrium tension
        let rigid = |region: AbdominalRegion| {
            observations
                .iter()
                .find(|o| o.region == region)
                .filter(|o| o.tension > self.config.rigid_tension)
        };
        if let (Some(right), Some(left)) = (
            rigid(AbdominalRegion::RightHypochondrium),
            rigid(AbdominalRegion::LeftHypochondrium),
        ) {
            let mut compound = Finding::new(
                BodyRegion::Abdominal(AbdominalRegion::RightHypochondrium),
                FindingType::Correlation,
                "Bilateral hypochondriac tension: liver qi stagnation",
                combine(0.8, 0.8),
                0.5 * (right.tension + left.tension) * 0.8,
            );
            compound
                .related_regions
                .push(BodyRegion::Abdominal(AbdominalRegion::LeftHypochondrium));
            compound.organs = vec![Organ::Liver, Organ::Gallbladder];
            merged.push(compound.with_conditions(&[Condition::QiStagnation]));
        }

        merged
    }
}

impl Default for AbdominalAnalyzer {
    fn default() -> Self {
        Self::new(AbdominalConfig::default())
    }
}

fn abdominal(finding: &Finding) -> Option<AbdominalRegion> {
    match finding.region {
        BodyRegion::Abdominal(r) => Some(r),
        BodyRegion::Skin(_) => None,
    }
}

fn adjacent(a: BodyRegion, b: BodyRegion) -> bool {
    matches!((a, b), (BodyRegion::Abdominal(x), BodyRegion::Abdominal(y)) if x.is_adjacent(y))
}

/// Group finding indices into grid-connected components
fn components(indices: &[usize], findings: &[Finding]) -> Vec<Vec<usize>> {
    let mut visited = vec![false; indices.len()];
    let mut out = Vec::new();

    for start in 0..indices.len() {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        let mut stack = vec![start];
        let mut component = Vec::new();
        while let Some(k) = stack.pop() {
            component.push(indices[k]);
            let Some(region) = abdominal(&findings[indices[k]]) else {
                continue;
            };
            for (m, &idx) in indices.iter().enumerate() {
                if !visited[m] && abdominal(&findings[idx]).map_or(false, |r| r.is_adjacent(region)) {
                    visited[m] = true;
                    stack.push(m);
                }
            }
        }
        component.sort_unstable();
        out.push(component);
    }
    out
}

fn texture_finding(region: BodyRegion, texture: &str) -> Finding {
    let lower = texture.to_lowercase();
    let has = |terms: &[&str]| terms.iter().any(|t| lower.contains(t));

    let (label, confidence, conditions): (&str, f64, &[Condition]) =
        if has(&["distend", "bloat", "gas"]) {
            ("distended", 0.7, &[Condition::QiStagnation])
        } else if has(&["gurgl", "splash", "fluid"]) {
            ("fluid sounds", 0.7, &[Condition::Dampness, Condition::PhlegmDampness])
        } else if has(&["soft", "doughy", "flaccid"]) {
            ("soft and weak", 0.65, &[Condition::SpleenDeficiency, Condition::QiDeficiency])
        } else if has(&["hard", "firm", "resist", "cord"]) {
            ("hard, resistant", 0.7, &[Condition::BloodStasis])
        } else {
            ("unclassified texture", 0.5, &[])
        };

    Finding::new(
        region,
        FindingType::Texture,
        format!("{} ({}): {}", region, label, texture.trim()),
        confidence,
        0.3,
    )
    .with_conditions(conditions)
}
