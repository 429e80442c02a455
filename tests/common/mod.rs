#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ecg_image_reader::config::{ArtifactPaths, FEATURE_LEN, LEAD_COUNT, SAMPLES_PER_LEAD};
use ecg_image_reader::error::ArtifactKind;
use ecg_image_reader::model::{
    ArtifactDocument, ClassOutput, FrozenClassifier, LinearModel, Projection, Scaler,
};
use ecg_image_reader::pipeline::ModelArtifacts;

pub const COMPONENTS: usize = 4;

pub fn dummy_scaler() -> Scaler {
    Scaler::Standard {
        mean: vec![0.5; FEATURE_LEN],
        scale: vec![0.25; FEATURE_LEN],
    }
}

/// Component `k` averages leads `k`, `k + 4` and `k + 8`.
pub fn dummy_projection() -> Projection {
    let components = (0..COMPONENTS)
        .map(|k| {
            (0..FEATURE_LEN)
                .map(|i| {
                    let lead = i / SAMPLES_PER_LEAD;
                    if lead % COMPONENTS == k {
                        1.0 / (SAMPLES_PER_LEAD * LEAD_COUNT / COMPONENTS) as f64
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect();
    Projection {
        mean: vec![0.0; FEATURE_LEN],
        components,
        explained_variance: None,
        whiten: false,
    }
}

pub fn dummy_classifier() -> LinearModel {
    LinearModel {
        classes: vec![0, 1, 2, 3],
        coef: (0..COMPONENTS)
            .map(|k| (0..COMPONENTS).map(|j| if j == k { 1.0 } else { 0.0 }).collect())
            .collect(),
        intercept: vec![0.0, 0.0, 0.5, 0.0],
    }
}

/// Writes a matching scaler/projection/classifier set into `dir`.
pub fn write_dummy_artifacts(dir: &Path) -> ArtifactPaths {
    ArtifactDocument::new(ArtifactKind::Scaler, dummy_scaler())
        .write(&dir.join("scaler.json"))
        .expect("write scaler");
    ArtifactDocument::new(ArtifactKind::Projection, dummy_projection())
        .write(&dir.join("projection.json"))
        .expect("write projection");
    let classifier = serde_json::json!({
        "format": "ecg-frozen-v1",
        "kind": "classifier",
        "model": {
            "type": "linear",
            "classes": [0, 1, 2, 3],
            "coef": dummy_classifier().coef,
            "intercept": dummy_classifier().intercept,
        }
    });
    std::fs::write(dir.join("classifier.json"), classifier.to_string()).expect("write classifier");
    ArtifactPaths::in_dir(dir)
}

pub fn dummy_models() -> ModelArtifacts {
    ModelArtifacts::from_parts(
        Some(Box::new(dummy_scaler())),
        Box::new(dummy_projection()),
        Box::new(dummy_classifier()),
    )
    .ok()
    .expect("dummy models line up")
}

/// Classifier that records how often it is consulted.
pub struct CountingClassifier {
    pub calls: Arc<AtomicUsize>,
    pub width: usize,
}

impl FrozenClassifier for CountingClassifier {
    fn input_width(&self) -> usize {
        self.width
    }

    fn predict(&self, _input: &[f64]) -> ClassOutput {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ClassOutput {
            code: 2,
            probabilities: Some(vec![0.1, 0.1, 0.7, 0.1]),
        }
    }
}
