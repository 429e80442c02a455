use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Height of the canonical grayscale raster every input is resized to.
pub const CANONICAL_HEIGHT: usize = 1572;
/// Width of the canonical grayscale raster every input is resized to.
pub const CANONICAL_WIDTH: usize = 2213;
/// Standard leads that are vectorized.
pub const LEAD_COUNT: usize = 12;
/// Regions cut from the canonical raster: 12 leads plus the rhythm strip.
pub const REGION_COUNT: usize = 13;
/// Samples per lead signal the frozen artifacts were fit on.
pub const SAMPLES_PER_LEAD: usize = 255;
/// Width of the combined feature vector.
pub const FEATURE_LEN: usize = LEAD_COUNT * SAMPLES_PER_LEAD;

const GAUSSIAN_SIGMA: f32 = 0.7;
const CONTOUR_LEVEL: f32 = 0.8;
const WORKING_HEIGHT: usize = 300;
const WORKING_WIDTH: usize = 450;

pub const SCALER_FILE: &str = "scaler.json";
pub const PROJECTION_FILE: &str = "projection.json";
pub const CLASSIFIER_FILE: &str = "classifier.json";

/// Parameters of the per-lead signal extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub gaussian_sigma: f32,
    pub contour_level: f32,
    pub working_height: usize,
    pub working_width: usize,
    pub samples_per_lead: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            gaussian_sigma: GAUSSIAN_SIGMA,
            contour_level: CONTOUR_LEVEL,
            working_height: WORKING_HEIGHT,
            working_width: WORKING_WIDTH,
            samples_per_lead: SAMPLES_PER_LEAD,
        }
    }
}

impl ExtractorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.gaussian_sigma > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "gaussian_sigma must be positive, got {}",
                self.gaussian_sigma
            )));
        }
        if !(self.contour_level > 0.0 && self.contour_level < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "contour_level must lie in (0, 1), got {}",
                self.contour_level
            )));
        }
        if self.working_height < 2 || self.working_width < 2 {
            return Err(ConfigError::Invalid(format!(
                "working resolution must be at least 2x2, got {}x{}",
                self.working_height, self.working_width
            )));
        }
        if self.samples_per_lead < 2 {
            return Err(ConfigError::Invalid(format!(
                "samples_per_lead must be at least 2, got {}",
                self.samples_per_lead
            )));
        }
        Ok(())
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub extractor: ExtractorConfig,
    /// Extract the 12 leads on the rayon pool instead of sequentially.
    pub parallel_leads: bool,
    /// Parent directory for per-run workspaces; the system temp dir when unset.
    pub workspace_root: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            extractor: ExtractorConfig::default(),
            parallel_leads: true,
            workspace_root: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: PipelineConfig =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.extractor.validate()
    }
}

/// Locations of the three frozen artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    /// `None` applies the projection to unscaled features.
    pub scaler: Option<PathBuf>,
    pub projection: PathBuf,
    pub classifier: PathBuf,
}

impl ArtifactPaths {
    /// Default file names inside `dir`. The scaler is only used when present, since
    /// older artifact sets were exported without one.
    pub fn in_dir(dir: &Path) -> Self {
        let scaler = dir.join(SCALER_FILE);
        Self {
            scaler: scaler.is_file().then_some(scaler),
            projection: dir.join(PROJECTION_FILE),
            classifier: dir.join(CLASSIFIER_FILE),
        }
    }
}
