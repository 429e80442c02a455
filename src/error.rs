//! Error types for the ECG image pipeline.
//!
//! Every stage reports failures through [`EcgError`]. The orchestrator wraps them in
//! [`PipelineError`] so callers can see which stage the run was trying to reach.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::pipeline::PipelineStage;

/// The frozen artifact slot a load or shape error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Scaler,
    Projection,
    Classifier,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Scaler => "scaler",
            ArtifactKind::Projection => "projection",
            ArtifactKind::Classifier => "classifier",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a frozen artifact could not be turned into a usable transform.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactLoadFailure {
    #[error("file not found")]
    NotFound(#[source] std::io::Error),

    #[error("file unreadable: {0}")]
    Unreadable(#[source] std::io::Error),

    #[error("artifact format `{found}` is not supported (expected `{supported}`)")]
    Incompatible { found: String, supported: String },

    #[error("artifact is not valid JSON for this slot: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("artifact contents are inconsistent: {0}")]
    Invalid(String),
}

impl ArtifactLoadFailure {
    pub fn is_incompatibility(&self) -> bool {
        matches!(
            self,
            ArtifactLoadFailure::Incompatible { .. } | ArtifactLoadFailure::Malformed(_)
        )
    }
}

/// Errors raised by the individual pipeline stages.
#[derive(Debug, thiserror::Error)]
pub enum EcgError {
    #[error("failed to load image {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("unsupported channel layout: {channels} channels (expected 1, 2, 3 or 4)")]
    UnsupportedChannelLayout { channels: usize },

    #[error("pixel buffer holds {actual} values, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error(
        "canonical image is {actual_height}x{actual_width}, lead regions require {expected_height}x{expected_width}"
    )]
    RegionBounds {
        expected_height: usize,
        expected_width: usize,
        actual_height: usize,
        actual_width: usize,
    },

    #[error("no ECG signal detected in lead {lead}: {reason}")]
    NoSignalDetected { lead: usize, reason: String },

    #[error("feature count mismatch: {0}")]
    FeatureCountMismatch(String),

    #[error("{kind} artifact {path} could not be loaded: {failure}")]
    ModelArtifactMissing {
        kind: ArtifactKind,
        path: PathBuf,
        #[source]
        failure: ArtifactLoadFailure,
    },

    #[error("{kind} expects {expected} input values, got {actual}")]
    DimensionMismatch {
        kind: ArtifactKind,
        expected: usize,
        actual: usize,
    },

    #[error("classifier artifact {path} could not be loaded: {failure}")]
    ClassifierLoad {
        path: PathBuf,
        #[source]
        failure: ArtifactLoadFailure,
    },

    #[error("{kind} model is inconsistent: {reason}")]
    InvalidModel { kind: ArtifactKind, reason: String },

    #[error("classifier produced unknown class code {code}")]
    UnknownClassCode { code: i64 },

    #[error("workspace I/O failed: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("kornia image error: {0}")]
    Kornia(#[from] kornia::image::ImageError),
}

const INCOMPATIBLE_MODEL_MESSAGE: &str = "ECG model incompatibility detected. The pre-trained models were exported \
     in a format this build cannot read. Please re-export or retrain the models with a \
     compatible toolchain. For now, the ECG analysis feature is temporarily unavailable.";

impl EcgError {
    /// Message safe to hand to an end user: no source chains, no internal paths for
    /// the artifact failures that operators have to fix.
    pub fn user_message(&self) -> String {
        match self {
            EcgError::ImageLoad { .. } => {
                "The ECG image could not be read. Please upload a JPEG or PNG file.".to_string()
            }
            EcgError::UnsupportedChannelLayout { channels } => format!(
                "The ECG image has an unsupported channel layout ({channels} channels)."
            ),
            EcgError::BufferSize { .. } => "The ECG image data is corrupt.".to_string(),
            EcgError::RegionBounds { .. } => {
                "The ECG image could not be divided into lead regions.".to_string()
            }
            EcgError::NoSignalDetected { lead, .. } => format!(
                "No ECG signal detected in lead {lead}. Please upload a clearer 12-lead ECG image."
            ),
            EcgError::FeatureCountMismatch(_) => {
                "The ECG signal could not be assembled from all 12 leads.".to_string()
            }
            EcgError::ModelArtifactMissing { kind, failure, .. } => {
                if failure.is_incompatibility() {
                    INCOMPATIBLE_MODEL_MESSAGE.to_string()
                } else {
                    format!("The ECG {kind} model is unavailable. Please contact the administrator.")
                }
            }
            EcgError::ClassifierLoad { failure, .. } => {
                if failure.is_incompatibility() {
                    INCOMPATIBLE_MODEL_MESSAGE.to_string()
                } else {
                    "The ECG classifier model is unavailable. Please contact the administrator."
                        .to_string()
                }
            }
            EcgError::DimensionMismatch { .. } => INCOMPATIBLE_MODEL_MESSAGE.to_string(),
            EcgError::InvalidModel { kind, .. } => {
                format!("The ECG {kind} model is unavailable. Please contact the administrator.")
            }
            EcgError::UnknownClassCode { code } => {
                format!("The ECG classifier returned an unknown result ({code}).")
            }
            EcgError::Workspace(_) | EcgError::Kornia(_) => {
                "An internal error occurred while processing the ECG image.".to_string()
            }
        }
    }
}

/// A stage failure annotated with the state the run was trying to reach.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: PipelineStage,
    #[source]
    pub source: EcgError,
}

impl PipelineError {
    pub fn new(stage: PipelineStage, source: EcgError) -> Self {
        Self { stage, source }
    }
}

/// Errors loading or validating a [`crate::config::PipelineConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors of the batch dataset driver. Per-image pipeline failures are counted and
/// skipped, so only I/O on the dataset and output files ends a batch.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("failed to read dataset directory {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no class folders found under {0}")]
    NoClassFolders(PathBuf),

    #[error("failed to write features: {0}")]
    Write(#[source] std::io::Error),
}
