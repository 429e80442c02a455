//! Loading frozen artifacts from disk.
//!
//! Every artifact is a JSON envelope:
//!
//! ```json
//! { "format": "ecg-frozen-v1", "kind": "projection", "producer": "...", "model": { ... } }
//! ```
//!
//! The `format` tag is checked before anything else, so an artifact exported by a newer
//! or older toolchain is reported as incompatible rather than as a parse error deep
//! inside the model body.

use std::fs;
use std::io;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::classifier::ClassifierModel;
use super::reducer::{Projection, Scaler};
use super::{FrozenClassifier, FrozenTransform};
use crate::error::{ArtifactKind, ArtifactLoadFailure};

/// The only artifact format this build reads.
pub const ARTIFACT_FORMAT: &str = "ecg-frozen-v1";

/// On-disk envelope around a model body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactDocument<M> {
    pub format: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer: Option<String>,
    pub model: M,
}

impl<M: Serialize> ArtifactDocument<M> {
    pub fn new(kind: ArtifactKind, model: M) -> Self {
        Self {
            format: ARTIFACT_FORMAT.to_string(),
            kind: kind.as_str().to_string(),
            producer: Some(concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION")).to_string()),
            model,
        }
    }

    pub fn write(&self, path: &Path) -> io::Result<()> {
        let text = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(path, text)
    }
}

#[derive(Deserialize)]
struct Header {
    format: Option<String>,
    kind: Option<String>,
}

/// Turns artifact locations into loaded models. Implementations decide the storage
/// format; the pipeline only sees the returned trait objects.
pub trait ArtifactSource {
    /// Loads the scaler or projection slot.
    fn load_transform(
        &self,
        kind: ArtifactKind,
        path: &Path,
    ) -> Result<Box<dyn FrozenTransform>, ArtifactLoadFailure>;

    fn load_classifier(&self, path: &Path) -> Result<Box<dyn FrozenClassifier>, ArtifactLoadFailure>;
}

/// Reads `ecg-frozen-v1` JSON artifacts.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonArtifactSource;

impl JsonArtifactSource {
    fn read<M: DeserializeOwned>(&self, kind: ArtifactKind, path: &Path) -> Result<M, ArtifactLoadFailure> {
        let bytes = fs::read(path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => ArtifactLoadFailure::NotFound(err),
            _ => ArtifactLoadFailure::Unreadable(err),
        })?;
        parse_document(kind, &bytes)
    }
}

/// Parses an artifact envelope of the given slot and returns its model body.
pub fn parse_document<M: DeserializeOwned>(kind: ArtifactKind, bytes: &[u8]) -> Result<M, ArtifactLoadFailure> {
    let value: serde_json::Value = serde_json::from_slice(bytes).map_err(ArtifactLoadFailure::Malformed)?;
    let header: Header = serde_json::from_value(value.clone()).map_err(ArtifactLoadFailure::Malformed)?;

    let format = header.format.unwrap_or_default();
    if format != ARTIFACT_FORMAT {
        return Err(ArtifactLoadFailure::Incompatible {
            found: if format.is_empty() { "<none>".to_string() } else { format },
            supported: ARTIFACT_FORMAT.to_string(),
        });
    }
    match header.kind.as_deref() {
        Some(found) if found == kind.as_str() => {}
        found => {
            return Err(ArtifactLoadFailure::Invalid(format!(
                "expected a {kind} artifact, found {}",
                found.unwrap_or("no kind")
            )));
        }
    }

    let document: ArtifactDocument<M> =
        serde_json::from_value(value).map_err(ArtifactLoadFailure::Malformed)?;
    if let Some(producer) = &document.producer {
        debug!(%kind, producer = producer.as_str(), "artifact producer");
    }
    Ok(document.model)
}

impl ArtifactSource for JsonArtifactSource {
    fn load_transform(
        &self,
        kind: ArtifactKind,
        path: &Path,
    ) -> Result<Box<dyn FrozenTransform>, ArtifactLoadFailure> {
        match kind {
            ArtifactKind::Scaler => {
                let scaler: Scaler = self.read(kind, path)?;
                scaler.validate().map_err(ArtifactLoadFailure::Invalid)?;
                Ok(Box::new(scaler))
            }
            ArtifactKind::Projection => {
                let projection: Projection = self.read(kind, path)?;
                projection.validate().map_err(ArtifactLoadFailure::Invalid)?;
                Ok(Box::new(projection))
            }
            ArtifactKind::Classifier => Err(ArtifactLoadFailure::Invalid(
                "a classifier is not a vector transform".to_string(),
            )),
        }
    }

    fn load_classifier(&self, path: &Path) -> Result<Box<dyn FrozenClassifier>, ArtifactLoadFailure> {
        let model: ClassifierModel = self.read(ArtifactKind::Classifier, path)?;
        model.validate().map_err(ArtifactLoadFailure::Invalid)?;
        Ok(Box::new(model))
    }
}
