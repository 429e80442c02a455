//! Pipeline orchestrator: image in, prediction out.
//!
//! A run walks `Created -> WorkspaceAcquired -> Normalized -> Segmented ->
//! SignalsExtracted -> Combined -> Reduced -> Classified -> Done`. Any stage may end
//! the run in `Failed`; the error then names the stage it was trying to reach. Every
//! run owns its own [`Workspace`], which is gone by the time the run returns.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use crate::combine::{FeatureVector, combine_with};
use crate::config::{ArtifactPaths, LEAD_COUNT, PipelineConfig};
use crate::error::{ArtifactKind, EcgError, PipelineError};
use crate::kornia::{GrayRaster, RawImage, normalize, raster_shape};
use crate::leads::{segment_leads, standard_leads};
use crate::model::{
    ArtifactSource, Classification, ClassifierAdapter, DimensionalityReducer, FrozenClassifier,
    FrozenTransform, JsonArtifactSource, ReducedVector,
};
use crate::signal::{LeadSignal, SignalExtractor};
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Created,
    WorkspaceAcquired,
    Normalized,
    Segmented,
    SignalsExtracted,
    Combined,
    Reduced,
    Classified,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Created => "created",
            PipelineStage::WorkspaceAcquired => "workspace_acquired",
            PipelineStage::Normalized => "normalized",
            PipelineStage::Segmented => "segmented",
            PipelineStage::SignalsExtracted => "signals_extracted",
            PipelineStage::Combined => "combined",
            PipelineStage::Reduced => "reduced",
            PipelineStage::Classified => "classified",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        }
    }

    /// The state a successful step leads to. `Done` and `Failed` are terminal.
    pub fn next(self) -> Option<Self> {
        match self {
            PipelineStage::Created => Some(PipelineStage::WorkspaceAcquired),
            PipelineStage::WorkspaceAcquired => Some(PipelineStage::Normalized),
            PipelineStage::Normalized => Some(PipelineStage::Segmented),
            PipelineStage::Segmented => Some(PipelineStage::SignalsExtracted),
            PipelineStage::SignalsExtracted => Some(PipelineStage::Combined),
            PipelineStage::Combined => Some(PipelineStage::Reduced),
            PipelineStage::Reduced => Some(PipelineStage::Classified),
            PipelineStage::Classified => Some(PipelineStage::Done),
            PipelineStage::Done | PipelineStage::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Records the states a run passes through.
#[derive(Debug)]
struct Progress {
    history: Vec<PipelineStage>,
}

impl Progress {
    fn new() -> Self {
        Self {
            history: vec![PipelineStage::Created],
        }
    }

    fn current(&self) -> PipelineStage {
        self.history.last().copied().unwrap_or(PipelineStage::Created)
    }

    /// Moves to the next state on `Ok`, or to `Failed` with the error annotated.
    fn step<T>(&mut self, result: Result<T, EcgError>) -> Result<T, PipelineError> {
        let target = self.current().next().unwrap_or(PipelineStage::Failed);
        match result {
            Ok(value) => {
                debug!(stage = %target, "stage reached");
                self.history.push(target);
                Ok(value)
            }
            Err(source) => {
                warn!(stage = %target, error = %source, "stage failed");
                self.history.push(PipelineStage::Failed);
                Err(PipelineError::new(target, source))
            }
        }
    }
}

/// The three frozen artifacts, loaded once and shared read-only between runs.
pub struct ModelArtifacts {
    reducer: DimensionalityReducer,
    classifier: ClassifierAdapter,
}

impl ModelArtifacts {
    /// Loads JSON artifacts from `paths`.
    pub fn load(paths: &ArtifactPaths) -> Result<Self, EcgError> {
        Self::load_with(&JsonArtifactSource, paths)
    }

    pub fn load_with(source: &dyn ArtifactSource, paths: &ArtifactPaths) -> Result<Self, EcgError> {
        let load_transform = |kind: ArtifactKind, path: &Path| {
            source
                .load_transform(kind, path)
                .map_err(|failure| EcgError::ModelArtifactMissing {
                    kind,
                    path: path.to_path_buf(),
                    failure,
                })
        };

        let scaler = match &paths.scaler {
            Some(path) => Some(load_transform(ArtifactKind::Scaler, path.as_path())?),
            None => None,
        };
        let projection = load_transform(ArtifactKind::Projection, paths.projection.as_path())?;
        let classifier =
            source
                .load_classifier(&paths.classifier)
                .map_err(|failure| EcgError::ClassifierLoad {
                    path: paths.classifier.clone(),
                    failure,
                })?;
        let artifacts = Self::from_parts(scaler, projection, classifier)?;
        info!(
            input = artifacts.input_width(),
            reduced = artifacts.reduced_width(),
            scaled = paths.scaler.is_some(),
            "model artifacts loaded"
        );
        Ok(artifacts)
    }

    /// Assembles already-loaded models, checking that their widths line up.
    pub fn from_parts(
        scaler: Option<Box<dyn FrozenTransform>>,
        projection: Box<dyn FrozenTransform>,
        classifier: Box<dyn FrozenClassifier>,
    ) -> Result<Self, EcgError> {
        let reducer = DimensionalityReducer::new(scaler, projection)?;
        let classifier = ClassifierAdapter::new(classifier)?;
        if reducer.output_width() != classifier.input_width() {
            return Err(EcgError::DimensionMismatch {
                kind: ArtifactKind::Classifier,
                expected: classifier.input_width(),
                actual: reducer.output_width(),
            });
        }
        Ok(Self { reducer, classifier })
    }

    pub fn input_width(&self) -> usize {
        self.reducer.input_width()
    }

    pub fn reduced_width(&self) -> usize {
        self.reducer.output_width()
    }

    pub fn reducer(&self) -> &DimensionalityReducer {
        &self.reducer
    }

    pub fn classifier(&self) -> &ClassifierAdapter {
        &self.classifier
    }

    /// Reduce then classify. A width mismatch stops the run before the classifier is
    /// consulted.
    pub fn predict_features(
        &self,
        features: &FeatureVector,
    ) -> Result<(ReducedVector, Classification), EcgError> {
        let reduced = self.reducer.reduce(features)?;
        let classification = self.classifier.classify(&reduced)?;
        Ok((reduced, classification))
    }
}

/// Where a run gets its pixels from.
#[derive(Clone, Copy)]
enum ImageInput<'a> {
    Path(&'a Path),
    Decoded(&'a RawImage),
}

impl ImageInput<'_> {
    fn normalize(self) -> Result<GrayRaster, EcgError> {
        match self {
            ImageInput::Path(path) => normalize(&RawImage::open(path)?),
            ImageInput::Decoded(raw) => normalize(raw),
        }
    }
}

/// Features of one image, before any model is applied.
#[derive(Debug, Clone)]
pub struct FeatureRun {
    pub features: FeatureVector,
    pub signals: Vec<LeadSignal>,
    pub stages: Vec<PipelineStage>,
}

/// Runs `Created -> ... -> Combined` without model artifacts. Used directly by the
/// batch driver and as the front half of [`EcgPipeline`].
#[derive(Debug, Clone, Default)]
pub struct FeaturePipeline {
    config: PipelineConfig,
    extractor: SignalExtractor,
}

impl FeaturePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let extractor = SignalExtractor::new(config.extractor.clone());
        Self { config, extractor }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self, path: &Path) -> Result<FeatureRun, PipelineError> {
        let span = info_span!("ecg_features", image = %path.display());
        let _guard = span.enter();
        self.run_to_features(ImageInput::Path(path))
    }

    pub fn run_image(&self, raw: &RawImage) -> Result<FeatureRun, PipelineError> {
        let span = info_span!("ecg_features", image = "<decoded>");
        let _guard = span.enter();
        self.run_to_features(ImageInput::Decoded(raw))
    }

    fn run_to_features(&self, input: ImageInput<'_>) -> Result<FeatureRun, PipelineError> {
        let mut progress = Progress::new();
        let workspace = progress.step(Workspace::acquire(self.config.workspace_root.as_deref()))?;
        let (features, signals) = self.extract(input, &workspace, &mut progress)?;
        finish(workspace);
        Ok(FeatureRun {
            features,
            signals,
            stages: progress.history,
        })
    }

    /// Normalized through Combined, with per-lead signals staged in `workspace`.
    fn extract(
        &self,
        input: ImageInput<'_>,
        workspace: &Workspace,
        progress: &mut Progress,
    ) -> Result<(FeatureVector, Vec<LeadSignal>), PipelineError> {
        let canonical = progress.step(input.normalize())?;
        debug!(shape = ?raster_shape(&canonical), "canonical image");

        let crops = progress.step(segment_leads(&canonical))?;

        let signals = progress.step(
            self.extractor
                .extract_all(standard_leads(&crops), self.config.parallel_leads)
                .and_then(|signals| {
                    for signal in &signals {
                        workspace.store_signal(signal)?;
                    }
                    Ok(signals)
                }),
        )?;

        let features = progress.step(workspace.load_signals(LEAD_COUNT).and_then(|stored| {
            combine_with(&stored, LEAD_COUNT, self.config.extractor.samples_per_lead)
        }))?;
        debug!(features = features.len(), "signals combined");
        Ok((features, signals))
    }
}

/// Releases the workspace; the result stands even if cleanup reports an error.
fn finish(workspace: Workspace) {
    if let Err(err) = workspace.release() {
        warn!(error = %err, "workspace cleanup failed");
    }
}

/// Everything a successful run produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub classification: Classification,
    pub num_features: usize,
    pub reduced_features: usize,
    pub signals: Vec<LeadSignal>,
    pub stages: Vec<PipelineStage>,
}

/// The full image-to-diagnosis pipeline.
pub struct EcgPipeline {
    features: FeaturePipeline,
    models: Arc<ModelArtifacts>,
}

impl EcgPipeline {
    pub fn new(config: PipelineConfig, models: Arc<ModelArtifacts>) -> Self {
        Self {
            features: FeaturePipeline::new(config),
            models,
        }
    }

    pub fn models(&self) -> &Arc<ModelArtifacts> {
        &self.models
    }

    pub fn run(&self, path: &Path) -> Result<PipelineOutput, PipelineError> {
        let span = info_span!("ecg_run", image = %path.display());
        let _guard = span.enter();
        self.run_input(ImageInput::Path(path))
    }

    pub fn run_image(&self, raw: &RawImage) -> Result<PipelineOutput, PipelineError> {
        let span = info_span!("ecg_run", image = "<decoded>");
        let _guard = span.enter();
        self.run_input(ImageInput::Decoded(raw))
    }

    /// Like [`EcgPipeline::run`], but folds any failure into the result record.
    pub fn predict(&self, path: &Path) -> PredictionResult {
        PredictionResult::from_run(self.run(path))
    }

    pub fn predict_image(&self, raw: &RawImage) -> PredictionResult {
        PredictionResult::from_run(self.run_image(raw))
    }

    fn run_input(&self, input: ImageInput<'_>) -> Result<PipelineOutput, PipelineError> {
        let mut progress = Progress::new();
        let workspace = progress.step(Workspace::acquire(
            self.features.config.workspace_root.as_deref(),
        ))?;
        let (features, signals) = self.features.extract(input, &workspace, &mut progress)?;

        let reduced = progress.step(self.models.reducer().reduce(&features))?;
        let classification = progress.step(self.models.classifier().classify(&reduced))?;

        finish(workspace);
        progress.history.push(PipelineStage::Done);
        info!(
            code = classification.class.code(),
            label = classification.class.label(),
            confidence = ?classification.confidence,
            "ECG classified"
        );
        Ok(PipelineOutput {
            classification,
            num_features: features.len(),
            reduced_features: reduced.len(),
            signals,
            stages: progress.history,
        })
    }
}

/// The record handed back to callers. Failures carry a displayable message only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub success: bool,
    pub prediction_code: Option<i64>,
    pub prediction_label: Option<String>,
    pub prediction_message: String,
    pub confidence: Option<f64>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_features: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduced_features: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<PipelineStage>,
}

impl PredictionResult {
    pub fn from_run(run: Result<PipelineOutput, PipelineError>) -> Self {
        match run {
            Ok(output) => Self::from_output(&output),
            Err(err) => Self::from_error(&err),
        }
    }

    pub fn from_output(output: &PipelineOutput) -> Self {
        let class = output.classification.class;
        Self {
            success: true,
            prediction_code: Some(class.code()),
            prediction_label: Some(class.label().to_string()),
            prediction_message: class.message().to_string(),
            confidence: output.classification.confidence,
            error: None,
            num_features: Some(output.num_features),
            reduced_features: Some(output.reduced_features),
            failed_stage: None,
        }
    }

    pub fn from_error(err: &PipelineError) -> Self {
        Self::failure(err.source.user_message(), Some(err.stage))
    }

    /// A failure record for errors raised outside a run, such as artifact loading.
    pub fn failure(message: String, failed_stage: Option<PipelineStage>) -> Self {
        Self {
            success: false,
            prediction_code: None,
            prediction_label: Some("Error".to_string()),
            prediction_message: format!("Failed to process ECG image: {message}"),
            confidence: None,
            error: Some(message),
            num_features: None,
            reduced_features: None,
            failed_stage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_advance_in_order() {
        let mut stage = PipelineStage::Created;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            seen.push(next);
            stage = next;
        }
        assert_eq!(seen.len(), 9);
        assert_eq!(stage, PipelineStage::Done);
        assert!(PipelineStage::Failed.is_terminal());
    }

    #[test]
    fn failed_step_names_the_target_stage() {
        let mut progress = Progress::new();
        progress.step(Ok::<_, EcgError>(())).expect("workspace");
        let err = progress
            .step::<()>(Err(EcgError::FeatureCountMismatch("x".to_string())))
            .err()
            .expect("error");
        assert_eq!(err.stage, PipelineStage::Normalized);
        assert_eq!(progress.current(), PipelineStage::Failed);
    }

    #[test]
    fn failure_record_hides_internal_chain() {
        let err = PipelineError::new(
            PipelineStage::SignalsExtracted,
            EcgError::NoSignalDetected {
                lead: 3,
                reason: "no contrast".to_string(),
            },
        );
        let result = PredictionResult::from_error(&err);
        assert!(!result.success);
        assert_eq!(result.failed_stage, Some(PipelineStage::SignalsExtracted));
        let message = result.error.expect("message");
        assert!(message.contains("No ECG signal detected"));
        assert!(result.prediction_message.starts_with("Failed to process ECG image: "));
    }
}
