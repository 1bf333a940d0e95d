//! Static table of syndrome patterns and the pulse evidence supporting them.

use std::fmt;

use palpa_core::{Element, Nature, Organ, PulseType};
use serde::{Deserialize, Serialize};

/// Syndrome patterns known to the mapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    HeartFire,
    HeartBloodDeficiency,
    HeartBloodStasis,
    LiverQiStagnation,
    LiverYangRising,
    LiverBloodDeficiency,
    SpleenQiDeficiency,
    PhlegmDampness,
    DampHeat,
    LungQiDeficiency,
    ExteriorWindCold,
    WindDryness,
    HeatToxin,
    KidneyYangDeficiency,
    KidneyYinDeficiency,
    QiBloodDeficiency,
    ColdExcess,
    BloodStasis,
    QiCollapse,
    Balanced,
}

/// Static metadata for one pattern
#[derive(Debug)]
pub struct PatternInfo {
    pub pattern: Pattern,
    pub name: &'static str,
    pub organ: Organ,
    pub nature: Nature,
    /// Upper bound on the pattern's confidence
    pub base_weight: f64,
    /// Clinical urgency of the pattern itself, independent of confidence
    pub acuity: f64,
    /// Pulse qualities counted as evidence, with their rule weight
    pub rules: &'static [(PulseType, f64)],
    pub keywords: &'static [&'static str],
    pub recommendation: &'static str,
}

use PulseType as P;

pub static PATTERN_TABLE: [PatternInfo; 20] = [
    PatternInfo {
        pattern: Pattern::HeartFire,
        name: "Heart fire blazing",
        organ: Organ::Heart,
        nature: Nature::Heat,
        base_weight: 0.9,
        acuity: 0.6,
        rules: &[
            (P::Rapid, 1.0),
            (P::Racing, 1.0),
            (P::Surging, 0.8),
            (P::Hasty, 0.6),
            (P::Full, 0.4),
            (P::Moving, 0.4),
        ],
        keywords: &["palpitation", "insomnia", "mouth ulcer", "restless"],
        recommendation: "Clear heart heat; avoid stimulants and late nights",
    },
    PatternInfo {
        pattern: Pattern::HeartBloodDeficiency,
        name: "Heart blood deficiency",
        organ: Organ::Heart,
        nature: Nature::Deficiency,
        base_weight: 0.85,
        acuity: 0.4,
        rules: &[
            (P::Thready, 1.0),
            (P::Weak, 0.8),
            (P::Rough, 0.6),
            (P::Intermittent, 0.5),
        ],
        keywords: &["palpitation", "poor memory", "pale", "dizziness"],
        recommendation: "Nourish heart blood; regular rest",
    },
    PatternInfo {
        pattern: Pattern::HeartBloodStasis,
        name: "Heart blood stasis",
        organ: Organ::Heart,
        nature: Nature::Stasis,
        base_weight: 0.9,
        acuity: 0.85,
        rules: &[
            (P::Rough, 1.0),
            (P::Bound, 1.0),
            (P::Intermittent, 1.0),
            (P::Wiry, 0.3),
        ],
        keywords: &["chest pain", "cyanosis", "stabbing pain"],
        recommendation: "Cardiovascular evaluation advised",
    },
    PatternInfo {
        pattern: Pattern::LiverQiStagnation,
        name: "Liver qi stagnation",
        organ: Organ::Liver,
        nature: Nature::Stagnation,
        base_weight: 0.9,
        acuity: 0.3,
        rules: &[(P::Wiry, 1.0), (P::Tight, 0.5), (P::Rough, 0.3)],
        keywords: &["irritab", "sighing", "hypochondri", "distension"],
        recommendation: "Soothe the liver; regular exercise and stress reduction",
    },
    PatternInfo {
        pattern: Pattern::LiverYangRising,
        name: "Liver yang rising",
        organ: Organ::Liver,
        nature: Nature::Excess,
        base_weight: 0.85,
        acuity: 0.6,
        rules: &[
            (P::Wiry, 0.8),
            (P::Long, 0.5),
            (P::Rapid, 0.5),
            (P::Surging, 0.5),
            (P::Full, 0.3),
        ],
        keywords: &["headache", "dizziness", "tinnitus", "red face"],
        recommendation: "Monitor blood pressure; calm liver yang",
    },
    PatternInfo {
        pattern: Pattern::LiverBloodDeficiency,
        name: "Liver blood deficiency",
        organ: Organ::Liver,
        nature: Nature::Deficiency,
        base_weight: 0.8,
        acuity: 0.3,
        rules: &[(P::Thready, 0.8), (P::Weak, 0.5), (P::Wiry, 0.3)],
        keywords: &["blurred vision", "numbness", "cramp"],
        recommendation: "Nourish liver blood",
    },
    PatternInfo {
        pattern: Pattern::SpleenQiDeficiency,
        name: "Spleen qi deficiency",
        organ: Organ::Spleen,
        nature: Nature::Deficiency,
        base_weight: 0.9,
        acuity: 0.3,
        rules: &[
            (P::Weak, 0.8),
            (P::Soggy, 0.8),
            (P::Empty, 0.6),
            (P::Moderate, 0.3),
        ],
        keywords: &["fatigue", "poor appetite", "loose stool", "bloating"],
        recommendation: "Strengthen the spleen; regular warm meals",
    },
    PatternInfo {
        pattern: Pattern::PhlegmDampness,
        name: "Phlegm dampness",
        organ: Organ::Spleen,
        nature: Nature::Dampness,
        base_weight: 0.85,
        acuity: 0.3,
        rules: &[(P::Slippery, 1.0), (P::Soggy, 0.6), (P::Moderate, 0.2)],
        keywords: &["heaviness", "phlegm", "nausea", "edema"],
        recommendation: "Resolve dampness; reduce greasy and sweet foods",
    },
    PatternInfo {
        pattern: Pattern::DampHeat,
        name: "Damp heat",
        organ: Organ::Stomach,
        nature: Nature::Heat,
        base_weight: 0.85,
        acuity: 0.5,
        rules: &[(P::Slippery, 0.7), (P::Rapid, 0.7), (P::Soggy, 0.4)],
        keywords: &["jaundice", "bitter taste", "yellow", "sticky stool"],
        recommendation: "Clear damp heat; avoid alcohol and spicy food",
    },
    PatternInfo {
        pattern: Pattern::LungQiDeficiency,
        name: "Lung qi deficiency",
        organ: Organ::Lung,
        nature: Nature::Deficiency,
        base_weight: 0.85,
        acuity: 0.3,
        rules: &[
            (P::Weak, 0.7),
            (P::Empty, 0.7),
            (P::Short, 0.5),
            (P::Faint, 0.5),
            (P::Floating, 0.3),
        ],
        keywords: &["shortness of breath", "weak voice", "spontaneous sweat", "cough"],
        recommendation: "Tonify lung qi; breathing exercises",
    },
    PatternInfo {
        pattern: Pattern::ExteriorWindCold,
        name: "Exterior wind cold",
        organ: Organ::Lung,
        nature: Nature::Exterior,
        base_weight: 0.8,
        acuity: 0.2,
        rules: &[(P::Floating, 1.0), (P::Tight, 0.6)],
        keywords: &["chills", "aversion to cold", "sneez", "body ache"],
        recommendation: "Release the exterior; keep warm and rest",
    },
    PatternInfo {
        pattern: Pattern::WindDryness,
        name: "Wind dryness",
        organ: Organ::Lung,
        nature: Nature::Exterior,
        base_weight: 0.75,
        acuity: 0.2,
        rules: &[(P::Floating, 0.6), (P::Rough, 0.4), (P::Thready, 0.3)],
        keywords: &["dry skin", "itch", "dry cough"],
        recommendation: "Moisten dryness; increase fluid intake",
    },
    PatternInfo {
        pattern: Pattern::HeatToxin,
        name: "Heat toxin",
        organ: Organ::Lung,
        nature: Nature::Heat,
        base_weight: 0.8,
        acuity: 0.7,
        rules: &[
            (P::Surging, 0.8),
            (P::Rapid, 0.6),
            (P::Full, 0.5),
            (P::Slippery, 0.3),
        ],
        keywords: &["fever", "boil", "redness", "swelling"],
        recommendation: "Clear heat toxin; seek care if fever persists",
    },
    PatternInfo {
        pattern: Pattern::KidneyYangDeficiency,
        name: "Kidney yang deficiency",
        organ: Organ::Kidney,
        nature: Nature::Cold,
        base_weight: 0.9,
        acuity: 0.4,
        rules: &[
            (P::Sunken, 0.8),
            (P::Slow, 0.8),
            (P::Weak, 0.6),
            (P::Faint, 0.6),
            (P::Hidden, 0.5),
        ],
        keywords: &["cold limbs", "lower back pain", "frequent urination", "edema"],
        recommendation: "Warm kidney yang; avoid cold exposure",
    },
    PatternInfo {
        pattern: Pattern::KidneyYinDeficiency,
        name: "Kidney yin deficiency",
        organ: Organ::Kidney,
        nature: Nature::Deficiency,
        base_weight: 0.9,
        acuity: 0.4,
        rules: &[
            (P::Thready, 0.7),
            (P::Rapid, 0.6),
            (P::Empty, 0.4),
            (P::Hollow, 0.4),
            (P::Leather, 0.4),
        ],
        keywords: &["night sweat", "hot flush", "dry mouth", "tinnitus"],
        recommendation: "Nourish kidney yin; adequate sleep",
    },
    PatternInfo {
        pattern: Pattern::QiBloodDeficiency,
        name: "Qi and blood deficiency",
        organ: Organ::Spleen,
        nature: Nature::Deficiency,
        base_weight: 0.85,
        acuity: 0.4,
        rules: &[
            (P::Weak, 0.8),
            (P::Thready, 0.7),
            (P::Faint, 0.6),
            (P::Empty, 0.5),
            (P::Hollow, 0.5),
            (P::Leather, 0.5),
        ],
        keywords: &["pallor", "fatigue", "dizziness"],
        recommendation: "Tonify qi and blood; nutritional review",
    },
    PatternInfo {
        pattern: Pattern::ColdExcess,
        name: "Interior cold excess",
        organ: Organ::Stomach,
        nature: Nature::Cold,
        base_weight: 0.8,
        acuity: 0.3,
        rules: &[
            (P::Tight, 0.8),
            (P::Slow, 0.6),
            (P::Firm, 0.6),
            (P::Sunken, 0.5),
            (P::Hidden, 0.4),
        ],
        keywords: &["cold pain", "prefers warmth", "abdominal cold"],
        recommendation: "Warm the interior; avoid raw and cold food",
    },
    PatternInfo {
        pattern: Pattern::BloodStasis,
        name: "Blood stasis",
        organ: Organ::Liver,
        nature: Nature::Stasis,
        base_weight: 0.85,
        acuity: 0.5,
        rules: &[
            (P::Rough, 0.9),
            (P::Firm, 0.5),
            (P::Bound, 0.4),
            (P::Moving, 0.4),
        ],
        keywords: &["fixed pain", "dark complexion", "mass"],
        recommendation: "Invigorate blood; evaluate any palpable mass",
    },
    PatternInfo {
        pattern: Pattern::QiCollapse,
        name: "Qi collapse",
        organ: Organ::Heart,
        nature: Nature::Deficiency,
        base_weight: 0.7,
        acuity: 0.95,
        rules: &[
            (P::Scattered, 1.0),
            (P::Faint, 0.8),
            (P::Hollow, 0.6),
            (P::Hidden, 0.5),
            (P::Racing, 0.4),
        ],
        keywords: &["cold sweat", "collapse", "faint"],
        recommendation: "Seek urgent medical attention",
    },
    PatternInfo {
        pattern: Pattern::Balanced,
        name: "Balanced constitution",
        organ: Organ::Spleen,
        nature: Nature::Balanced,
        base_weight: 0.7,
        acuity: 0.0,
        rules: &[(P::Moderate, 1.0)],
        keywords: &[],
        recommendation: "Maintain current routine",
    },
];

impl Pattern {
    pub const ALL: [Pattern; 20] = [
        Pattern::HeartFire,
        Pattern::HeartBloodDeficiency,
        Pattern::HeartBloodStasis,
        Pattern::LiverQiStagnation,
        Pattern::LiverYangRising,
        Pattern::LiverBloodDeficiency,
        Pattern::SpleenQiDeficiency,
        Pattern::PhlegmDampness,
        Pattern::DampHeat,
        Pattern::LungQiDeficiency,
        Pattern::ExteriorWindCold,
        Pattern::WindDryness,
        Pattern::HeatToxin,
        Pattern::KidneyYangDeficiency,
        Pattern::KidneyYinDeficiency,
        Pattern::QiBloodDeficiency,
        Pattern::ColdExcess,
        Pattern::BloodStasis,
        Pattern::QiCollapse,
        Pattern::Balanced,
    ];

    pub fn info(&self) -> &'static PatternInfo {
        &PATTERN_TABLE[*self as usize]
    }

    pub fn table_index(&self) -> usize {
        *self as usize
    }

    pub fn name(&self) -> &'static str {
        self.info().name
    }

    pub fn organ(&self) -> Organ {
        self.info().organ
    }

    pub fn element(&self) -> Element {
        self.info().organ.element()
    }

    pub fn nature(&self) -> Nature {
        self.info().nature
    }

    pub fn acuity(&self) -> f64 {
        self.info().acuity
    }

    /// Stable key used in metric maps and trend reports
    pub fn key(&self) -> String {
        format!("pattern.{}", self.slug())
    }

    pub fn slug(&self) -> &'static str {
        match self {
            Pattern::HeartFire => "heart_fire",
            Pattern::HeartBloodDeficiency => "heart_blood_deficiency",
            Pattern::HeartBloodStasis => "heart_blood_stasis",
            Pattern::LiverQiStagnation => "liver_qi_stagnation",
            Pattern::LiverYangRising => "liver_yang_rising",
            Pattern::LiverBloodDeficiency => "liver_blood_deficiency",
            Pattern::SpleenQiDeficiency => "spleen_qi_deficiency",
            Pattern::PhlegmDampness => "phlegm_dampness",
            Pattern::DampHeat => "damp_heat",
            Pattern::LungQiDeficiency => "lung_qi_deficiency",
            Pattern::ExteriorWindCold => "exterior_wind_cold",
            Pattern::WindDryness => "wind_dryness",
            Pattern::HeatToxin => "heat_toxin",
            Pattern::KidneyYangDeficiency => "kidney_yang_deficiency",
            Pattern::KidneyYinDeficiency => "kidney_yin_deficiency",
            Pattern::QiBloodDeficiency => "qi_blood_deficiency",
            Pattern::ColdExcess => "cold_excess",
            Pattern::BloodStasis => "blood_stasis",
            Pattern::QiCollapse => "qi_collapse",
            Pattern::Balanced => "balanced",
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_matches_enum_order() {
        for (i, p) in Pattern::ALL.iter().enumerate() {
            assert_eq!(PATTERN_TABLE[i].pattern, *p);
            assert_eq!(p.table_index(), i);
        }
    }

    #[test]
    fn test_every_pulse_type_supports_a_pattern() {
        for pulse in PulseType::CANONICAL {
            assert!(
                PATTERN_TABLE
                    .iter()
                    .any(|info| info.rules.iter().any(|(p, _)| *p == pulse)),
                "{} has no pattern",
                pulse
            );
        }
    }

    #[test]
    fn test_weights_in_range() {
        for info in PATTERN_TABLE.iter() {
            assert!(info.base_weight > 0.0 && info.base_weight <= 1.0);
            assert!((0.0..=1.0).contains(&info.acuity));
            assert!(info.rules.iter().all(|(_, w)| *w > 0.0 && *w <= 1.0));
        }
    }

    #[test]
    fn test_keys_unique() {
        let mut keys: Vec<String> = Pattern::ALL.iter().map(|p| p.key()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), Pattern::ALL.len());
    }
}
