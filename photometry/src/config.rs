//! Pipeline configuration.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cotrend::CotrendMode;
use crate::error::{PhotometryError, Result};
use crate::quality::QualityBitmask;

/// Settings for reducing one target pixel file to a cotrended light curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Cadences to reject: `"none"`, a preset name, or a decimal bitmask
    pub quality_bitmask: QualityBitmask,
    /// 1-based basis vectors to fit
    pub cbvs: Vec<usize>,
    /// How the fitted trend is removed
    pub cotrend_mode: CotrendMode,
    /// Sigma-clip threshold applied before cotrending, if any
    pub outlier_sigma: Option<f64>,
    /// Divide by the median flux before cotrending
    pub normalize: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            quality_bitmask: QualityBitmask::default(),
            cbvs: vec![1, 2],
            cotrend_mode: CotrendMode::Additive,
            outlier_sigma: None,
            normalize: false,
        }
    }
}

impl PipelineConfig {
    /// Check the settings for values no reduction can use.
    pub fn validate(&self) -> Result<()> {
        if self.cbvs.contains(&0) {
            return Err(PhotometryError::InvalidArgument(
                "basis vector indices are 1-based; 0 is not valid".to_string(),
            ));
        }
        let unique: BTreeSet<usize> = self.cbvs.iter().copied().collect();
        if unique.len() != self.cbvs.len() {
            return Err(PhotometryError::InvalidArgument(format!(
                "basis vector selection {:?} repeats an index",
                self.cbvs
            )));
        }
        if let Some(sigma) = self.outlier_sigma {
            if !(sigma.is_finite() && sigma > 0.0) {
                return Err(PhotometryError::InvalidArgument(format!(
                    "outlier sigma must be positive, got {sigma}"
                )));
            }
        }
        Ok(())
    }

    /// Save as pretty-printed JSON.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON and validate.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}
