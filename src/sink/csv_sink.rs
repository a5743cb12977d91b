use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use parking_lot::Mutex;

use crate::core::BenchError;

use super::{BenchmarkResult, HEADER, ResultSink};

/// `{runs}_runs_{concurrency}_concurrency_{schema}_schema_{timestamp}.csv`
pub fn result_file_name(runs: u32, concurrency: usize, schema: &str, at: &DateTime<Local>) -> String {
    format!(
        "{runs}_runs_{concurrency}_concurrency_{schema}_schema_{}.csv",
        at.format("%Y-%m-%d_%H_%M_%S%.3f")
    )
}

/// CSV file sink. Every record is flushed as soon as it is written, so a
/// crash never leaves a half-written row behind.
pub struct CsvSink {
    path: PathBuf,
    writer: Mutex<Option<csv::Writer<File>>>,
}

impl CsvSink {
    /// Creates `dir` if needed and a new file in it. An existing file is
    /// never overwritten.
    pub fn create(dir: &Path, file_name: &str) -> Result<Self, BenchError> {
        std::fs::create_dir_all(dir).map_err(|e| {
            BenchError::IoError(format!("creating directory {}: {}", dir.display(), e))
        })?;

        let path = dir.join(file_name);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| BenchError::IoError(format!("creating {}: {}", path.display(), e)))?;

        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(HEADER)?;
        writer
            .flush()
            .map_err(|e| BenchError::SinkError(format!("writing header to {}: {}", path.display(), e)))?;

        Ok(Self {
            path,
            writer: Mutex::new(Some(writer)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for CsvSink {
    fn save(&self, result: &BenchmarkResult) -> Result<(), BenchError> {
        let mut guard = self.writer.lock();
        let writer = guard.as_mut().ok_or_else(|| {
            BenchError::SinkError(format!("{} is already closed", self.path.display()))
        })?;

        writer.write_record(result.to_record())?;
        writer
            .flush()
            .map_err(|e| BenchError::SinkError(format!("flushing {}: {}", self.path.display(), e)))
    }

    fn close(&self) -> Result<(), BenchError> {
        let Some(writer) = self.writer.lock().take() else {
            return Ok(());
        };
        let file = writer
            .into_inner()
            .map_err(|e| BenchError::SinkError(format!("flushing {}: {}", self.path.display(), e)))?;
        file.sync_all()
            .map_err(|e| BenchError::SinkError(format!("syncing {}: {}", self.path.display(), e)))
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }
}
