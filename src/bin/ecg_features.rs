use clap::Parser;
use std::error::Error;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;

use ecg_image_reader::config::PipelineConfig;
use ecg_image_reader::dataset::{discover, extract_dataset};
use ecg_image_reader::pipeline::FeaturePipeline;

#[derive(Parser, Debug)]
#[command(
    name = "ecg_features",
    about = "Extract combined lead-signal features from a labelled ECG image dataset into a CSV",
    version
)]
struct Cli {
    /// Dataset root with one folder per class (AHB, MI, NORMAL, PM or the long dataset names)
    #[arg(short = 'd', long = "dir")]
    dir: PathBuf,

    /// Output CSV path
    #[arg(short = 'o', long = "out", default_value = "ecg_features.csv")]
    out: PathBuf,

    /// Use at most this many images per class
    #[arg(long = "per-class")]
    per_class: Option<usize>,

    /// Pipeline configuration JSON
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {
    ecg_image_reader::init_tracing();
    let cli = Cli::parse();

    if !cli.dir.is_dir() {
        return Err(format!("Not a directory: {}", cli.dir.display()).into());
    }

    let config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };

    let images = discover(&cli.dir, cli.per_class)?;
    if images.is_empty() {
        eprintln!("No images found in {}", cli.dir.display());
        return Ok(());
    }

    if let Some(parent) = cli.out.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::new(File::create(&cli.out)?);

    let pipeline = FeaturePipeline::new(config);
    let summary = extract_dataset(&pipeline, &images, &mut out)?;

    for (code, count) in &summary.per_class {
        eprintln!("class {code}: {count} images");
    }
    eprintln!(
        "{} processed, {} failed, features written to {}",
        summary.processed,
        summary.failed,
        cli.out.display()
    );
    Ok(())
}
