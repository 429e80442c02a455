//! Dimensionality reducer: frozen scaler followed by a frozen linear projection.

use serde::{Deserialize, Serialize};

use super::FrozenTransform;
use crate::combine::FeatureVector;
use crate::error::{ArtifactKind, EcgError};

/// Per-feature affine scaling fitted offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Scaler {
    /// `(x - mean) / scale`. A zero scale leaves the centered feature unscaled.
    Standard { mean: Vec<f64>, scale: Vec<f64> },
    /// `x * scale + min`.
    MinMax { min: Vec<f64>, scale: Vec<f64> },
}

impl FrozenTransform for Scaler {
    fn input_width(&self) -> usize {
        match self {
            Scaler::Standard { mean, .. } => mean.len(),
            Scaler::MinMax { min, .. } => min.len(),
        }
    }

    fn output_width(&self) -> usize {
        self.input_width()
    }

    fn apply(&self, input: &[f64]) -> Vec<f64> {
        match self {
            Scaler::Standard { mean, scale } => input
                .iter()
                .zip(mean.iter().zip(scale))
                .map(|(x, (m, s))| if *s == 0.0 { x - m } else { (x - m) / s })
                .collect(),
            Scaler::MinMax { min, scale } => input
                .iter()
                .zip(min.iter().zip(scale))
                .map(|(x, (m, s))| x * s + m)
                .collect(),
        }
    }

    fn validate(&self) -> Result<(), String> {
        let (offset, scale) = match self {
            Scaler::Standard { mean, scale } => (mean, scale),
            Scaler::MinMax { min, scale } => (min, scale),
        };
        if offset.is_empty() {
            return Err("scaler has no features".to_string());
        }
        if offset.len() != scale.len() {
            return Err(format!(
                "scaler has {} offsets but {} scales",
                offset.len(),
                scale.len()
            ));
        }
        if offset.iter().chain(scale).any(|v| !v.is_finite()) {
            return Err("scaler parameters must be finite".to_string());
        }
        Ok(())
    }
}

/// Principal-component projection: `(x - mean) . components^T`, optionally whitened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub mean: Vec<f64>,
    /// One row per output component, each as wide as `mean`.
    pub components: Vec<Vec<f64>>,
    #[serde(default)]
    pub explained_variance: Option<Vec<f64>>,
    #[serde(default)]
    pub whiten: bool,
}

impl FrozenTransform for Projection {
    fn input_width(&self) -> usize {
        self.mean.len()
    }

    fn output_width(&self) -> usize {
        self.components.len()
    }

    fn apply(&self, input: &[f64]) -> Vec<f64> {
        let centered: Vec<f64> = input.iter().zip(&self.mean).map(|(x, m)| x - m).collect();
        let mut out: Vec<f64> = self
            .components
            .iter()
            .map(|row| row.iter().zip(&centered).map(|(w, x)| w * x).sum())
            .collect();
        if self.whiten
            && let Some(variance) = &self.explained_variance
        {
            for (value, var) in out.iter_mut().zip(variance) {
                *value /= var.sqrt();
            }
        }
        out
    }

    fn validate(&self) -> Result<(), String> {
        if self.mean.is_empty() || self.components.is_empty() {
            return Err("projection has no features or no components".to_string());
        }
        if let Some((idx, row)) = self
            .components
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != self.mean.len())
        {
            return Err(format!(
                "component {idx} has {} weights, expected {}",
                row.len(),
                self.mean.len()
            ));
        }
        if self.whiten {
            match &self.explained_variance {
                Some(variance) if variance.len() == self.components.len() => {
                    if variance.iter().any(|v| !(*v > 0.0)) {
                        return Err("whitening needs positive explained variances".to_string());
                    }
                }
                _ => {
                    return Err(
                        "whitening needs one explained variance per component".to_string()
                    );
                }
            }
        }
        Ok(())
    }
}

/// The reduced representation handed to the classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedVector(Vec<f64>);

impl ReducedVector {
    pub fn from_values(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Applies the optional scaler and then the projection. Widths are checked when the
/// pair is assembled and again against every incoming vector.
pub struct DimensionalityReducer {
    scaler: Option<Box<dyn FrozenTransform>>,
    projection: Box<dyn FrozenTransform>,
}

impl DimensionalityReducer {
    pub fn new(
        scaler: Option<Box<dyn FrozenTransform>>,
        projection: Box<dyn FrozenTransform>,
    ) -> Result<Self, EcgError> {
        if let Some(scaler) = &scaler {
            scaler.validate().map_err(|reason| EcgError::InvalidModel {
                kind: ArtifactKind::Scaler,
                reason,
            })?;
        }
        projection.validate().map_err(|reason| EcgError::InvalidModel {
            kind: ArtifactKind::Projection,
            reason,
        })?;
        if let Some(scaler) = &scaler
            && scaler.output_width() != projection.input_width()
        {
            return Err(EcgError::DimensionMismatch {
                kind: ArtifactKind::Projection,
                expected: projection.input_width(),
                actual: scaler.output_width(),
            });
        }
        Ok(Self { scaler, projection })
    }

    /// Feature width the reducer accepts.
    pub fn input_width(&self) -> usize {
        match &self.scaler {
            Some(scaler) => scaler.input_width(),
            None => self.projection.input_width(),
        }
    }

    pub fn output_width(&self) -> usize {
        self.projection.output_width()
    }

    pub fn reduce(&self, features: &FeatureVector) -> Result<ReducedVector, EcgError> {
        let kind = if self.scaler.is_some() {
            ArtifactKind::Scaler
        } else {
            ArtifactKind::Projection
        };
        if features.len() != self.input_width() {
            return Err(EcgError::DimensionMismatch {
                kind,
                expected: self.input_width(),
                actual: features.len(),
            });
        }

        let projected = match &self.scaler {
            Some(scaler) => self.projection.apply(&scaler.apply(features.as_slice())),
            None => self.projection.apply(features.as_slice()),
        };
        Ok(ReducedVector(projected))
    }
}
