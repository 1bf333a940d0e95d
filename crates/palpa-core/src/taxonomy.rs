//! Closed traditional-medicine taxonomies: five phases, organs, pattern
//! natures and the 28 canonical pulse types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Five-phase element
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Element {
    Wood,
    Fire,
    Earth,
    Metal,
    Water,
}

impl Element {
    pub const ALL: [Element; 5] = [
        Element::Wood,
        Element::Fire,
        Element::Earth,
        Element::Metal,
        Element::Water,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Element::Wood => "wood",
            Element::Fire => "fire",
            Element::Earth => "earth",
            Element::Metal => "metal",
            Element::Water => "water",
        }
    }

    /// Generating (sheng) cycle: wood feeds fire, fire makes earth, ...
    pub fn generates(&self) -> Element {
        match self {
            Element::Wood => Element::Fire,
            Element::Fire => Element::Earth,
            Element::Earth => Element::Metal,
            Element::Metal => Element::Water,
            Element::Water => Element::Wood,
        }
    }

    /// Controlling (ke) cycle
    pub fn controls(&self) -> Element {
        match self {
            Element::Wood => Element::Earth,
            Element::Earth => Element::Water,
            Element::Water => Element::Fire,
            Element::Fire => Element::Metal,
            Element::Metal => Element::Wood,
        }
    }

    /// The element that generates this one
    pub fn mother(&self) -> Element {
        Element::ALL
            .into_iter()
            .find(|e| e.generates() == *self)
            .unwrap_or(*self)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Zang-fu organ systems referenced by findings and patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Organ {
    Heart,
    Liver,
    Spleen,
    Lung,
    Kidney,
    Gallbladder,
    Stomach,
    SmallIntestine,
    LargeIntestine,
    Bladder,
}

impl Organ {
    pub fn name(&self) -> &'static str {
        match self {
            Organ::Heart => "heart",
            Organ::Liver => "liver",
            Organ::Spleen => "spleen",
            Organ::Lung => "lung",
            Organ::Kidney => "kidney",
            Organ::Gallbladder => "gallbladder",
            Organ::Stomach => "stomach",
            Organ::SmallIntestine => "small intestine",
            Organ::LargeIntestine => "large intestine",
            Organ::Bladder => "bladder",
        }
    }

    pub fn element(&self) -> Element {
        match self {
            Organ::Liver | Organ::Gallbladder => Element::Wood,
            Organ::Heart | Organ::SmallIntestine => Element::Fire,
            Organ::Spleen | Organ::Stomach => Element::Earth,
            Organ::Lung | Organ::LargeIntestine => Element::Metal,
            Organ::Kidney | Organ::Bladder => Element::Water,
        }
    }

    /// Yin (zang) organ paired with a yang (fu) organ; zang organs map to themselves.
    pub fn zang(&self) -> Organ {
        match self {
            Organ::Gallbladder => Organ::Liver,
            Organ::SmallIntestine => Organ::Heart,
            Organ::Stomach => Organ::Spleen,
            Organ::LargeIntestine => Organ::Lung,
            Organ::Bladder => Organ::Kidney,
            zang => *zang,
        }
    }
}

impl fmt::Display for Organ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Dominant character of a syndrome pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nature {
    Deficiency,
    Excess,
    Heat,
    Cold,
    Dampness,
    Stagnation,
    Stasis,
    Exterior,
    Balanced,
}

impl Nature {
    pub fn name(&self) -> &'static str {
        match self {
            Nature::Deficiency => "deficiency",
            Nature::Excess => "excess",
            Nature::Heat => "heat",
            Nature::Cold => "cold",
            Nature::Dampness => "dampness",
            Nature::Stagnation => "stagnation",
            Nature::Stasis => "stasis",
            Nature::Exterior => "exterior",
            Nature::Balanced => "balanced",
        }
    }

    /// Nature that contradicts this one when both are asserted for an organ
    pub fn opposite(&self) -> Option<Nature> {
        match self {
            Nature::Heat => Some(Nature::Cold),
            Nature::Cold => Some(Nature::Heat),
            Nature::Deficiency => Some(Nature::Excess),
            Nature::Excess => Some(Nature::Deficiency),
            _ => None,
        }
    }
}

impl fmt::Display for Nature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The 28 canonical pulse qualities plus an `Unknown` sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PulseType {
    Floating,
    Sunken,
    Slow,
    Rapid,
    Slippery,
    Rough,
    Empty,
    Full,
    Long,
    Short,
    Surging,
    Faint,
    Tight,
    Moderate,
    Wiry,
    Hollow,
    Leather,
    Firm,
    Soggy,
    Weak,
    Scattered,
    Thready,
    Hidden,
    Moving,
    Hasty,
    Bound,
    Intermittent,
    Racing,
    Unknown,
}

struct PulseTypeInfo {
    name: &'static str,
    pinyin: &'static str,
    description: &'static str,
}

const PULSE_TYPE_INFO: [PulseTypeInfo; 29] = [
    PulseTypeInfo { name: "floating", pinyin: "fu", description: "Felt with light touch, weakens with pressure" },
    PulseTypeInfo { name: "sunken", pinyin: "chen", description: "Felt only with heavy pressure" },
    PulseTypeInfo { name: "slow", pinyin: "chi", description: "Fewer than 60 beats per minute" },
    PulseTypeInfo { name: "rapid", pinyin: "shu", description: "More than 90 beats per minute" },
    PulseTypeInfo { name: "slippery", pinyin: "hua", description: "Smooth and flowing, like pearls rolling on a plate" },
    PulseTypeInfo { name: "rough", pinyin: "se", description: "Uneven and hesitant, like a knife scraping bamboo" },
    PulseTypeInfo { name: "empty", pinyin: "xu", description: "Forceless at all depths" },
    PulseTypeInfo { name: "full", pinyin: "shi", description: "Forceful at all depths" },
    PulseTypeInfo { name: "long", pinyin: "chang", description: "Extends beyond its position" },
    PulseTypeInfo { name: "short", pinyin: "duan", description: "Does not fill its position" },
    PulseTypeInfo { name: "surging", pinyin: "hong", description: "Broad and forceful arrival, weak departure" },
    PulseTypeInfo { name: "faint", pinyin: "wei", description: "Extremely thin and soft, barely perceptible" },
    PulseTypeInfo { name: "tight", pinyin: "jin", description: "Taut and twisting like a stretched rope" },
    PulseTypeInfo { name: "moderate", pinyin: "huan", description: "Even and relaxed, about 60 to 70 beats per minute" },
    PulseTypeInfo { name: "wiry", pinyin: "xian", description: "Long and taut like a zither string" },
    PulseTypeInfo { name: "hollow", pinyin: "kou", description: "Floating and broad but empty in the middle" },
    PulseTypeInfo { name: "leather", pinyin: "ge", description: "Floating, taut and hollow like a drum skin" },
    PulseTypeInfo { name: "firm", pinyin: "lao", description: "Deep, forceful, wiry and long" },
    PulseTypeInfo { name: "soggy", pinyin: "ru", description: "Floating, thin and soft" },
    PulseTypeInfo { name: "weak", pinyin: "ruo", description: "Deep, thin and soft" },
    PulseTypeInfo { name: "scattered", pinyin: "san", description: "Floating and diffuse without root, irregular" },
    PulseTypeInfo { name: "thready", pinyin: "xi", description: "Thin like a thread but clearly felt" },
    PulseTypeInfo { name: "hidden", pinyin: "fu (hidden)", description: "Felt only when pressing to the bone" },
    PulseTypeInfo { name: "moving", pinyin: "dong", description: "Short, rapid, slippery and forceful like a bean" },
    PulseTypeInfo { name: "hasty", pinyin: "cu", description: "Rapid with irregular missed beats" },
    PulseTypeInfo { name: "bound", pinyin: "jie", description: "Slow with irregular missed beats" },
    PulseTypeInfo { name: "intermittent", pinyin: "dai", description: "Missed beats at regular intervals" },
    PulseTypeInfo { name: "racing", pinyin: "ji", description: "Extremely rapid, above 120 beats per minute" },
    PulseTypeInfo { name: "unknown", pinyin: "", description: "Unclassifiable waveform" },
];

impl PulseType {
    /// The 28 canonical pulse types, in table order (excludes `Unknown`)
    pub const CANONICAL: [PulseType; 28] = [
        PulseType::Floating,
        PulseType::Sunken,
        PulseType::Slow,
        PulseType::Rapid,
        PulseType::Slippery,
        PulseType::Rough,
        PulseType::Empty,
        PulseType::Full,
        PulseType::Long,
        PulseType::Short,
        PulseType::Surging,
        PulseType::Faint,
        PulseType::Tight,
        PulseType::Moderate,
        PulseType::Wiry,
        PulseType::Hollow,
        PulseType::Leather,
        PulseType::Firm,
        PulseType::Soggy,
        PulseType::Weak,
        PulseType::Scattered,
        PulseType::Thready,
        PulseType::Hidden,
        PulseType::Moving,
        PulseType::Hasty,
        PulseType::Bound,
        PulseType::Intermittent,
        PulseType::Racing,
    ];

    fn info(&self) -> &'static PulseTypeInfo {
        &PULSE_TYPE_INFO[*self as usize]
    }

    /// Position in the canonical table, used for deterministic tie-breaks
    pub fn table_index(&self) -> usize {
        *self as usize
    }

    pub fn name(&self) -> &'static str {
        self.info().name
    }

    pub fn pinyin(&self) -> &'static str {
        self.info().pinyin
    }

    pub fn description(&self) -> &'static str {
        self.info().description
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, PulseType::Unknown)
    }

    /// Rhythm disturbances that warrant an alert on their own
    pub fn is_arrhythmic(&self) -> bool {
        matches!(
            self,
            PulseType::Hasty | PulseType::Bound | PulseType::Intermittent | PulseType::Scattered
        )
    }
}

impl fmt::Display for PulseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_canonical_count() {
        let unique: HashSet<_> = PulseType::CANONICAL.iter().collect();
        assert_eq!(unique.len(), 28);
        assert!(!PulseType::CANONICAL.contains(&PulseType::Unknown));
    }

    #[test]
    fn test_metadata_alignment() {
        for (i, p) in PulseType::CANONICAL.iter().enumerate() {
            assert_eq!(p.table_index(), i);
            assert!(!p.name().is_empty());
        }
        assert_eq!(PulseType::Wiry.name(), "wiry");
        assert_eq!(PulseType::Racing.name(), "racing");
        assert_eq!(PulseType::Unknown.name(), "unknown");
    }

    #[test]
    fn test_five_phase_cycles() {
        for e in Element::ALL {
            assert_eq!(e.mother().generates(), e);
            assert_ne!(e.controls(), e);
        }
        assert_eq!(Element::Water.generates(), Element::Wood);
        assert_eq!(Element::Fire.mother(), Element::Wood);
    }

    #[test]
    fn test_nature_opposites() {
        assert_eq!(Nature::Heat.opposite(), Some(Nature::Cold));
        assert_eq!(Nature::Excess.opposite(), Some(Nature::Deficiency));
        assert_eq!(Nature::Dampness.opposite(), None);
    }
}
