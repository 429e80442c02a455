//! Reads printed 12-lead ECG images: normalizes the scan, cuts out the lead regions,
//! traces each lead into a 1D signal and classifies the combined signal with frozen,
//! pre-fitted models.

pub mod combine;
pub mod config;
pub mod dataset;
pub mod error;
pub mod kornia;
pub mod leads;
pub mod model;
pub mod pipeline;
pub mod plot_signals;
pub mod signal;
pub mod synthetic;
pub mod workspace;

pub use combine::{FeatureVector, combine};
pub use config::{ArtifactPaths, ExtractorConfig, PipelineConfig};
pub use error::{EcgError, PipelineError};
pub use pipeline::{EcgPipeline, FeaturePipeline, ModelArtifacts, PipelineStage, PredictionResult};
pub use signal::{LeadSignal, SignalExtractor};

/// Installs a stderr `fmt` subscriber filtered by `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
