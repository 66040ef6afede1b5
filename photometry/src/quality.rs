//! Cadence quality flags.
//!
//! Each cadence of a target pixel file carries an integer whose set bits
//! flag known data-quality problems. A [`QualityFlagRegistry`] names those
//! bits, decodes raw values into human-readable descriptions, and turns a
//! [`QualityBitmask`] (nothing, a named preset, or an explicit integer) into
//! the combined bitmask used to reject cadences.
//!
//! The bit table and preset compositions are mission configuration. The
//! built-in [`KEPLER_QUALITY_FLAGS`] registry follows the Kepler archive
//! manual; other missions can supply a [`RegistryDefinition`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, ArrayView1};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{PhotometryError, Result};

/// Named quality presets, ordered from most permissive to strictest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    /// Rejects cadences that are certainly unusable.
    Default,
    /// Additionally rejects cadences that are probably compromised.
    Conservative,
    /// Rejects every flagged cadence except those whose flag marks a
    /// correction already applied upstream.
    Hard,
}

impl QualityPreset {
    /// Every preset, in order of increasing strictness.
    pub const ALL: [QualityPreset; 3] = [
        QualityPreset::Default,
        QualityPreset::Conservative,
        QualityPreset::Hard,
    ];

    /// Stable lowercase name of the preset.
    pub fn name(&self) -> &'static str {
        match self {
            QualityPreset::Default => "default",
            QualityPreset::Conservative => "conservative",
            QualityPreset::Hard => "hard",
        }
    }

    fn known_names() -> String {
        Self::ALL
            .iter()
            .map(|p| p.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for QualityPreset {
    type Err = PhotometryError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .find(|p| p.name() == name)
            .copied()
            .ok_or_else(|| PhotometryError::UnknownPreset {
                name: s.to_string(),
                known: Self::known_names(),
            })
    }
}

/// Which cadences to reject, before resolution against a registry.
///
/// The string form is `"none"`, a preset name, or a decimal integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum QualityBitmask {
    /// Keep every cadence.
    None,
    /// A named preset.
    Preset(QualityPreset),
    /// An explicit combined bitmask.
    Bits(u32),
}

impl Default for QualityBitmask {
    fn default() -> Self {
        QualityBitmask::Preset(QualityPreset::Default)
    }
}

impl From<QualityPreset> for QualityBitmask {
    fn from(preset: QualityPreset) -> Self {
        QualityBitmask::Preset(preset)
    }
}

impl From<u32> for QualityBitmask {
    fn from(bits: u32) -> Self {
        QualityBitmask::Bits(bits)
    }
}

impl From<Option<QualityPreset>> for QualityBitmask {
    fn from(preset: Option<QualityPreset>) -> Self {
        preset.map_or(QualityBitmask::None, QualityBitmask::Preset)
    }
}

impl FromStr for QualityBitmask {
    type Err = PhotometryError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
            return Ok(QualityBitmask::None);
        }
        if let Ok(bits) = trimmed.parse::<u32>() {
            return Ok(QualityBitmask::Bits(bits));
        }
        trimmed.parse::<QualityPreset>().map(QualityBitmask::Preset)
    }
}

impl TryFrom<String> for QualityBitmask {
    type Error = PhotometryError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<QualityBitmask> for String {
    fn from(bitmask: QualityBitmask) -> Self {
        bitmask.to_string()
    }
}

impl fmt::Display for QualityBitmask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityBitmask::None => f.write_str("none"),
            QualityBitmask::Preset(preset) => write!(f, "{preset}"),
            QualityBitmask::Bits(bits) => write!(f, "{bits}"),
        }
    }
}

/// A single named quality bit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityFlag {
    /// Bit position, 0 through 31
    pub bit: u8,
    /// Short identifier, e.g. `"CoarsePoint"`
    pub code: String,
    /// Human-readable description
    pub description: String,
}

impl QualityFlag {
    /// Integer value of this flag (`1 << bit`), or 0 if the bit does not
    /// fit in a `u32`.
    pub fn value(&self) -> u32 {
        1u32.checked_shl(self.bit.into()).unwrap_or(0)
    }
}

/// Serializable description of a registry: flags plus each preset as a
/// list of flag codes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryDefinition {
    pub flags: Vec<QualityFlag>,
    pub presets: BTreeMap<QualityPreset, Vec<String>>,
}

/// Immutable table of quality flags and preset bitmasks.
#[derive(Debug, Clone)]
pub struct QualityFlagRegistry {
    /// Flags sorted by ascending bit position
    flags: Vec<QualityFlag>,
    presets: HashMap<QualityPreset, u32>,
}

impl QualityFlagRegistry {
    /// Build a registry, validating that bits and codes are unique, that
    /// every preset is defined, and that presets only name known flags.
    pub fn from_definition(definition: RegistryDefinition) -> Result<Self> {
        let mut flags = definition.flags;
        let mut seen_bits = HashSet::new();
        let mut seen_codes = HashSet::new();

        for flag in &flags {
            if flag.bit > 31 {
                return Err(PhotometryError::InvalidRegistry(format!(
                    "flag '{}' uses bit {} (must be 0-31)",
                    flag.code, flag.bit
                )));
            }
            if flag.code.is_empty() {
                return Err(PhotometryError::InvalidRegistry(format!(
                    "flag at bit {} has an empty code",
                    flag.bit
                )));
            }
            if !seen_bits.insert(flag.bit) {
                return Err(PhotometryError::InvalidRegistry(format!(
                    "bit {} defined more than once",
                    flag.bit
                )));
            }
            if !seen_codes.insert(flag.code.as_str()) {
                return Err(PhotometryError::InvalidRegistry(format!(
                    "code '{}' defined more than once",
                    flag.code
                )));
            }
        }

        flags.sort_by_key(|f| f.bit);

        let mut presets = HashMap::new();
        for preset in QualityPreset::ALL {
            let codes = definition.presets.get(&preset).ok_or_else(|| {
                PhotometryError::InvalidRegistry(format!("preset '{preset}' is not defined"))
            })?;

            let mut bitmask = 0u32;
            for code in codes {
                let flag = flags.iter().find(|f| &f.code == code).ok_or_else(|| {
                    PhotometryError::InvalidRegistry(format!(
                        "preset '{preset}' references unknown flag '{code}'"
                    ))
                })?;
                bitmask |= flag.value();
            }
            presets.insert(preset, bitmask);
        }

        Ok(Self { flags, presets })
    }

    /// The built-in Kepler registry.
    pub fn kepler() -> &'static QualityFlagRegistry {
        &KEPLER_QUALITY_FLAGS
    }

    /// Flags in ascending bit order.
    pub fn flags(&self) -> &[QualityFlag] {
        &self.flags
    }

    /// Look up a flag by its short code.
    pub fn flag_by_code(&self, code: &str) -> Option<&QualityFlag> {
        self.flags.iter().find(|f| f.code == code)
    }

    /// Union of every registered flag.
    pub fn all_bits(&self) -> u32 {
        self.flags.iter().fold(0, |acc, f| acc | f.value())
    }

    /// Descriptions of the registered flags set in `raw`, in ascending bit
    /// order. Unregistered bits are ignored.
    pub fn decode(&self, raw: u32) -> Vec<&str> {
        self.set_flags(raw).map(|f| f.description.as_str()).collect()
    }

    /// Like [`decode`](Self::decode) but returning short codes.
    pub fn decode_codes(&self, raw: u32) -> Vec<&str> {
        self.set_flags(raw).map(|f| f.code.as_str()).collect()
    }

    fn set_flags(&self, raw: u32) -> impl Iterator<Item = &QualityFlag> {
        self.flags.iter().filter(move |f| raw & f.value() != 0)
    }

    /// Combined bitmask of a preset.
    pub fn preset_bitmask(&self, preset: QualityPreset) -> u32 {
        // Every preset is inserted by from_definition
        self.presets.get(&preset).copied().unwrap_or(0)
    }

    /// Resolve a preset name, a decimal integer, or `"none"` to a bitmask.
    pub fn resolve_preset(&self, name_or_bits: &str) -> Result<u32> {
        let bitmask: QualityBitmask = name_or_bits.parse()?;
        Ok(self.resolve(bitmask))
    }

    /// Resolve a bitmask request to the integer applied to raw quality.
    ///
    /// `None` resolves to 0 (keep everything); explicit bits pass through.
    pub fn resolve(&self, bitmask: QualityBitmask) -> u32 {
        match bitmask {
            QualityBitmask::None => 0,
            QualityBitmask::Preset(preset) => self.preset_bitmask(preset),
            QualityBitmask::Bits(bits) => bits,
        }
    }

    /// Per-cadence keep mask: `true` where no bit of `bitmask` is set.
    pub fn quality_mask(&self, raw_quality: ArrayView1<u32>, bitmask: u32) -> Array1<bool> {
        raw_quality.mapv(|q| (q & bitmask) == 0)
    }
}

const KEPLER_FLAGS: [(u8, &str, &str); 21] = [
    (0, "AttitudeTweak", "Attitude tweak"),
    (1, "SafeMode", "Safe mode"),
    (2, "CoarsePoint", "Coarse point"),
    (3, "EarthPoint", "Earth point"),
    (4, "Argabrightening", "Argabrightening event"),
    (5, "Desat", "Reaction wheel desaturation event"),
    (6, "ApertureCosmic", "Cosmic ray in optimal aperture pixel"),
    (7, "ManualExclude", "Manual exclude"),
    (8, "Discontinuity", "Discontinuity corrected"),
    (9, "ImpulsiveOutlier", "Impulsive outlier removed before cotrending"),
    (10, "CollateralCosmic", "Cosmic ray detected on collateral pixel row or column"),
    (11, "Straylight", "Straylight"),
    (12, "Straylight2", "Scattered light"),
    (13, "PlanetSearchExclude", "Planet search exclude"),
    (14, "BadCalibrationExclude", "Bad calibration exclude"),
    (15, "InsufficientTargets", "Insufficient targets for error correction exclude"),
    (16, "NoData", "No data collected"),
    (17, "RollingBandInAperture", "Rolling band in optimal aperture"),
    (18, "RollingBandInMask", "Rolling band in full mask"),
    (19, "PossibleThrusterFiring", "Possible thruster firing"),
    (20, "ThrusterFiring", "Thruster firing"),
];

const KEPLER_DEFAULT: &[&str] = &[
    "AttitudeTweak",
    "SafeMode",
    "CoarsePoint",
    "EarthPoint",
    "Desat",
    "ManualExclude",
    "NoData",
    "ThrusterFiring",
];

const KEPLER_CONSERVATIVE_EXTRA: &[&str] = &[
    "Argabrightening",
    "ApertureCosmic",
    "CollateralCosmic",
    "Straylight",
    "PossibleThrusterFiring",
];

/// Definition of the Kepler quality table (archive manual table 2-3).
pub fn kepler_definition() -> RegistryDefinition {
    let flags: Vec<QualityFlag> = KEPLER_FLAGS
        .iter()
        .map(|&(bit, code, description)| QualityFlag {
            bit,
            code: code.to_string(),
            description: description.to_string(),
        })
        .collect();

    let to_owned = |codes: &[&str]| codes.iter().map(|c| c.to_string()).collect::<Vec<_>>();

    let default = to_owned(KEPLER_DEFAULT);
    let mut conservative = default.clone();
    conservative.extend(to_owned(KEPLER_CONSERVATIVE_EXTRA));
    // Impulsive outliers were already removed before cotrending; the
    // cadence itself is still good.
    let hard = flags
        .iter()
        .filter(|f| f.code != "ImpulsiveOutlier")
        .map(|f| f.code.clone())
        .collect();

    let mut presets = BTreeMap::new();
    presets.insert(QualityPreset::Default, default);
    presets.insert(QualityPreset::Conservative, conservative);
    presets.insert(QualityPreset::Hard, hard);

    RegistryDefinition { flags, presets }
}

/// Process-wide Kepler quality registry, built once on first use.
pub static KEPLER_QUALITY_FLAGS: Lazy<QualityFlagRegistry> = Lazy::new(|| {
    QualityFlagRegistry::from_definition(kepler_definition())
        .expect("built-in Kepler quality table is valid")
});
