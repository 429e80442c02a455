use clap::Parser;
use serde::Serialize;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ecg_image_reader::config::{ArtifactPaths, PipelineConfig};
use ecg_image_reader::pipeline::{EcgPipeline, ModelArtifacts, PredictionResult};
use ecg_image_reader::plot_signals::render_signals_rgba;
use ecg_image_reader::signal::LeadSignal;

const PLOT_WIDTH: u32 = 1200;
const PLOT_HEIGHT: u32 = 600;

#[derive(Parser, Debug)]
#[command(
    name = "ecg_predict",
    about = "Classify 12-lead ECG images with frozen models, printing one JSON result per image",
    version
)]
struct Cli {
    /// ECG images to classify
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Directory holding scaler.json (optional), projection.json and classifier.json
    #[arg(short = 'm', long = "models")]
    models: PathBuf,

    /// Scaler artifact, overriding the one found in --models
    #[arg(long = "scaler")]
    scaler: Option<PathBuf>,

    /// Pipeline configuration JSON
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Write a PNG of the extracted lead signals per image into this directory
    #[arg(long = "plot", short = 'p')]
    plot: Option<PathBuf>,

    /// Extract leads one after another instead of in parallel
    #[arg(long = "sequential")]
    sequential: bool,
}

#[derive(Serialize)]
struct ImageResult<'a> {
    image: &'a Path,
    #[serde(flatten)]
    result: PredictionResult,
}

fn print_result(image: &Path, result: PredictionResult) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string(&ImageResult { image, result })?);
    Ok(())
}

fn save_plot(dir: &Path, scan: &Path, signals: &[LeadSignal]) -> Result<PathBuf, Box<dyn Error>> {
    fs::create_dir_all(dir)?;
    let stem = scan
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("ecg");
    let out = dir.join(format!("{stem}_signals.png"));
    let pixels = render_signals_rgba(PLOT_WIDTH, PLOT_HEIGHT, signals)?;
    let rgba = image::RgbaImage::from_raw(PLOT_WIDTH, PLOT_HEIGHT, pixels)
        .ok_or("plot buffer does not match its size")?;
    rgba.save(&out)?;
    Ok(out)
}

fn main() -> Result<(), Box<dyn Error>> {
    ecg_image_reader::init_tracing();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if cli.sequential {
        config.parallel_leads = false;
    }

    let mut paths = ArtifactPaths::in_dir(&cli.models);
    if cli.scaler.is_some() {
        paths.scaler = cli.scaler.clone();
    }

    let models = match ModelArtifacts::load(&paths) {
        Ok(models) => Arc::new(models),
        Err(e) => {
            tracing::error!(error = %e, "failed to load model artifacts");
            for image in &cli.images {
                print_result(image, PredictionResult::failure(e.user_message(), None))?;
            }
            return Err(e.into());
        }
    };

    let pipeline = EcgPipeline::new(config, models);
    let mut failures = 0usize;
    for image in &cli.images {
        let run = pipeline.run(image);
        if let (Some(dir), Ok(output)) = (&cli.plot, &run) {
            match save_plot(dir, image, &output.signals) {
                Ok(out) => tracing::info!(plot = %out.display(), "signal plot written"),
                Err(e) => eprintln!("Failed to write plot for {}: {e}", image.display()),
            }
        }
        let result = PredictionResult::from_run(run);
        if !result.success {
            failures += 1;
        }
        print_result(image, result)?;
    }

    if failures > 0 {
        return Err(format!("{failures} of {} images failed", cli.images.len()).into());
    }
    Ok(())
}
