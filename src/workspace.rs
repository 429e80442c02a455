//! Per-run scratch directory holding the intermediate lead signals.
//!
//! The directory is a [`tempfile::TempDir`], so it is removed when the workspace is
//! dropped, whichever way the run ends.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::EcgError;
use crate::signal::LeadSignal;

const PREFIX: &str = "ecg-run-";

pub struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    /// Creates a fresh directory under `root`, or under the system temp dir.
    pub fn acquire(root: Option<&Path>) -> Result<Self, EcgError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(PREFIX);
        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(EcgError::Workspace)?;
        debug!(path = %dir.path().display(), "workspace acquired");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn signal_path(&self, lead: usize) -> PathBuf {
        self.dir.path().join(format!("lead_{lead:02}.csv"))
    }

    /// Writes one lead as a single CSV record.
    pub fn store_signal(&self, signal: &LeadSignal) -> Result<PathBuf, EcgError> {
        let path = self.signal_path(signal.lead);
        let mut writer = csv::Writer::from_path(&path).map_err(csv_error)?;
        writer
            .write_record(signal.samples.iter().map(|v| v.to_string()))
            .map_err(csv_error)?;
        writer.flush().map_err(EcgError::Workspace)?;
        Ok(path)
    }

    /// Reads leads `1..=count` back, in lead order.
    pub fn load_signals(&self, count: usize) -> Result<Vec<LeadSignal>, EcgError> {
        (1..=count)
            .map(|lead| {
                let mut reader = csv::ReaderBuilder::new()
                    .has_headers(false)
                    .from_path(self.signal_path(lead))
                    .map_err(csv_error)?;
                let samples = reader
                    .deserialize::<Vec<f64>>()
                    .next()
                    .ok_or_else(|| {
                        EcgError::Workspace(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("lead {lead}: empty signal file"),
                        ))
                    })?
                    .map_err(csv_error)?;
                Ok(LeadSignal { lead, samples })
            })
            .collect()
    }

    /// Removes the directory now and reports any I/O failure. Dropping the workspace
    /// removes it too, silently.
    pub fn release(self) -> Result<(), EcgError> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(EcgError::Workspace)?;
        debug!(path = %path.display(), "workspace released");
        Ok(())
    }
}

fn csv_error(err: csv::Error) -> EcgError {
    EcgError::Workspace(err.into())
}
