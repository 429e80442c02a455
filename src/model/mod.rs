//! Frozen, pre-fitted numeric models applied after feature extraction.
//!
//! The pipeline only talks to the [`FrozenTransform`] and [`FrozenClassifier`] traits.
//! How the parameters are stored and which format versions are readable is the
//! business of an [`artifact::ArtifactSource`].

pub mod artifact;
pub mod classifier;
pub mod reducer;

pub use artifact::{ARTIFACT_FORMAT, ArtifactDocument, ArtifactSource, JsonArtifactSource};
pub use classifier::{
    Classification, ClassifierAdapter, ClassifierModel, EcgClass, LinearModel, NearestCentroid,
    SoftVoting,
};
pub use reducer::{DimensionalityReducer, Projection, ReducedVector, Scaler};

/// A pre-fitted vector-to-vector transform.
pub trait FrozenTransform: Send + Sync {
    fn input_width(&self) -> usize;
    fn output_width(&self) -> usize;
    /// `input` must be exactly `input_width()` long; callers check.
    fn apply(&self, input: &[f64]) -> Vec<f64>;

    /// Checks that the parameters are consistent enough for `apply` to be total.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Raw output of a classifier: the emitted class code and, when the model can
/// estimate them, per-class probabilities.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassOutput {
    pub code: i64,
    pub probabilities: Option<Vec<f64>>,
}

/// A pre-fitted multi-class classifier.
pub trait FrozenClassifier: Send + Sync {
    fn input_width(&self) -> usize;
    fn predict(&self, input: &[f64]) -> ClassOutput;

    /// Checks that the parameters are consistent enough for `predict` to be total.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}
