//! Batch feature extraction over a labelled image dataset.
//!
//! The dataset root holds one folder per diagnosis, named either with the public ECG
//! image dataset's long names or with the short codes `AHB`, `MI`, `NORMAL` and `PM`.
//! Each image runs through its own [`FeaturePipeline`] run, so every image gets a fresh
//! workspace that is gone before the next one starts.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::DatasetError;
use crate::model::EcgClass;
use crate::pipeline::FeaturePipeline;

const FOLDER_CLASSES: [(&str, EcgClass); 8] = [
    ("AHB", EcgClass::AbnormalHeartbeat),
    ("MI", EcgClass::MyocardialInfarction),
    ("NORMAL", EcgClass::Normal),
    ("PM", EcgClass::HistoryOfMi),
    (
        "ECG Images of Patient that have abnormal heartbeat (233x12=2796)",
        EcgClass::AbnormalHeartbeat,
    ),
    (
        "ECG Images of Myocardial Infarction Patients (240x12=2880)",
        EcgClass::MyocardialInfarction,
    ),
    ("Normal Person ECG Images (284x12=3408)", EcgClass::Normal),
    (
        "ECG Images of Patient that have History of MI (172x12=2064)",
        EcgClass::HistoryOfMi,
    ),
];

/// The diagnosis a dataset folder holds, if the name is one we know.
pub fn class_for_folder(name: &str) -> Option<EcgClass> {
    FOLDER_CLASSES
        .iter()
        .find(|(folder, _)| folder.eq_ignore_ascii_case(name))
        .map(|&(_, class)| class)
}

pub fn is_image_file(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(OsStr::to_str) else {
        return false;
    };
    matches!(
        ext.to_ascii_lowercase().as_str(),
        "png" | "jpg" | "jpeg" | "bmp" | "tif" | "tiff" | "webp"
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledImage {
    pub path: PathBuf,
    pub class: EcgClass,
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    let entries = fs::read_dir(dir).map_err(|source| DatasetError::Read {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths: Vec<PathBuf> = entries.filter_map(Result::ok).map(|e| e.path()).collect();
    paths.sort();
    Ok(paths)
}

/// Lists the images of every recognised class folder under `root`, sorted by path,
/// keeping at most `per_class` images of each class.
pub fn discover(root: &Path, per_class: Option<usize>) -> Result<Vec<LabeledImage>, DatasetError> {
    let mut images = Vec::new();
    let mut folders = 0usize;
    for folder in read_dir_sorted(root)? {
        if !folder.is_dir() {
            continue;
        }
        let Some(class) = folder
            .file_name()
            .and_then(OsStr::to_str)
            .and_then(class_for_folder)
        else {
            warn!(folder = %folder.display(), "skipping unrecognised folder");
            continue;
        };
        folders += 1;

        let files = read_dir_sorted(&folder)?
            .into_iter()
            .filter(|p| p.is_file() && is_image_file(p))
            .take(per_class.unwrap_or(usize::MAX));
        images.extend(files.map(|path| LabeledImage { path, class }));
    }

    if folders == 0 {
        return Err(DatasetError::NoClassFolders(root.to_path_buf()));
    }
    Ok(images)
}

/// Outcome counts of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub failed: usize,
    pub per_class: BTreeMap<i64, usize>,
}

fn write_error(err: csv::Error) -> DatasetError {
    DatasetError::Write(err.into())
}

/// Runs every image through `pipeline` and writes one CSV row per success:
/// `f0..f{n-1}` followed by the class code as `target`. Failed images are logged,
/// counted and skipped.
pub fn extract_dataset<W: Write>(
    pipeline: &FeaturePipeline,
    images: &[LabeledImage],
    out: &mut W,
) -> Result<BatchSummary, DatasetError> {
    let mut summary = BatchSummary::default();
    let mut header_written = false;
    let mut writer = csv::Writer::from_writer(out);

    for (idx, image) in images.iter().enumerate() {
        let run = match pipeline.run(&image.path) {
            Ok(run) => run,
            Err(err) => {
                warn!(image = %image.path.display(), stage = %err.stage, error = %err.source, "skipping image");
                summary.failed += 1;
                continue;
            }
        };

        let values = run.features.as_slice();
        if !header_written {
            let header = (0..values.len())
                .map(|i| format!("f{i}"))
                .chain(std::iter::once("target".to_string()));
            writer.write_record(header).map_err(write_error)?;
            header_written = true;
        }

        let row = values
            .iter()
            .map(|v| v.to_string())
            .chain(std::iter::once(image.class.code().to_string()));
        writer.write_record(row).map_err(write_error)?;

        summary.processed += 1;
        *summary.per_class.entry(image.class.code()).or_default() += 1;
        info!(
            done = idx + 1,
            total = images.len(),
            image = %image.path.display(),
            label = image.class.label(),
            "features extracted"
        );
    }

    writer.flush().map_err(DatasetError::Write)?;
    info!(
        processed = summary.processed,
        failed = summary.failed,
        "batch finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FEATURE_LEN;

    #[test]
    fn folder_names_map_to_classes() {
        assert_eq!(class_for_folder("NORMAL"), Some(EcgClass::Normal));
        assert_eq!(class_for_folder("pm"), Some(EcgClass::HistoryOfMi));
        assert_eq!(
            class_for_folder("ECG Images of Myocardial Infarction Patients (240x12=2880)"),
            Some(EcgClass::MyocardialInfarction)
        );
        assert_eq!(class_for_folder("misc"), None);
    }

    #[test]
    fn discover_caps_each_class_and_skips_other_files() {
        let root = tempfile::tempdir().expect("root");
        for folder in ["AHB", "MI", "notes"] {
            fs::create_dir(root.path().join(folder)).expect("mkdir");
        }
        for i in 0..3 {
            fs::write(root.path().join("AHB").join(format!("{i}.png")), b"").expect("write");
        }
        fs::write(root.path().join("MI").join("a.jpg"), b"").expect("write");
        fs::write(root.path().join("MI").join("readme.txt"), b"").expect("write");

        let images = discover(root.path(), Some(2)).expect("discover");
        assert_eq!(images.len(), 3);
        assert_eq!(images[0].class, EcgClass::AbnormalHeartbeat);
        assert!(images[0].path.ends_with("AHB/0.png"));
        assert_eq!(images[2].class, EcgClass::MyocardialInfarction);
    }

    #[test]
    fn empty_root_has_no_class_folders() {
        let root = tempfile::tempdir().expect("root");
        assert!(matches!(discover(root.path(), None), Err(DatasetError::NoClassFolders(_))));
    }

    #[test]
    fn extracted_rows_carry_every_feature_and_the_class_code() {
        let root = tempfile::tempdir().expect("root");
        let normal = root.path().join("NORMAL");
        fs::create_dir(&normal).expect("mkdir");
        crate::synthetic::canonical_sheet()
            .save(normal.join("sheet.png"))
            .expect("save");

        let images = discover(root.path(), None).expect("discover");
        assert_eq!(images.len(), 1);
        let mut out = Vec::new();
        let summary = extract_dataset(&FeaturePipeline::default(), &images, &mut out).expect("batch");
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.per_class[&2], 1);

        let mut reader = csv::Reader::from_reader(out.as_slice());
        let header = reader.headers().expect("header").clone();
        assert_eq!(header.len(), FEATURE_LEN + 1);
        assert_eq!(header.get(0), Some("f0"));
        assert_eq!(header.get(FEATURE_LEN - 1), Some("f3059"));
        assert_eq!(header.get(FEATURE_LEN), Some("target"));

        let rows: Vec<csv::StringRecord> = reader.records().collect::<Result<_, _>>().expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), FEATURE_LEN + 1);
        assert_eq!(rows[0].get(FEATURE_LEN), Some("2"));
        let features: Vec<f64> = rows[0]
            .iter()
            .take(FEATURE_LEN)
            .map(|field| field.parse().expect("number"))
            .collect();
        assert!(features.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn unreadable_images_are_counted_not_fatal() {
        let root = tempfile::tempdir().expect("root");
        let path = root.path().join("broken.png");
        fs::write(&path, b"not a png").expect("write");
        let images = vec![LabeledImage {
            path,
            class: EcgClass::Normal,
        }];
        let mut out = Vec::new();
        let summary = extract_dataset(&FeaturePipeline::default(), &images, &mut out).expect("batch");
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.processed, 0);
        assert!(out.is_empty());
    }
}
