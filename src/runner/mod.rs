mod coordinator;
mod preflight;
mod progress;
mod task;

pub use coordinator::{RunSettings, WarehouseRun, WarehouseSummary};
pub use preflight::preflight;
pub use progress::Progress;
pub use task::{Task, worker_tasks};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use log::{error, info, warn};
use tokio::sync::watch;

use crate::conf::Config;
use crate::core::BenchError;
use crate::executor::ExecutorFactory;
use crate::query::{Query, QueryLoader};
use crate::sink::{CsvSink, ResultSink, result_file_name};
use crate::upload::{ArtifactUploader, ObjectStoreUploader};

/// Outcome of a whole benchmark.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub completed: Vec<(String, WarehouseSummary)>,
    /// Warehouses aborted before running, with the reason.
    pub failed: Vec<(String, String)>,
    pub skipped: Vec<String>,
    pub cancelled: bool,
    pub artifact: Option<PathBuf>,
    pub uploaded: bool,
}

impl RunReport {
    pub fn total_dispatched(&self) -> usize {
        self.completed.iter().map(|(_, s)| s.dispatched).sum()
    }
}

/// Walks the configured warehouses one after another, writing every result
/// into a single sink.
pub struct BenchmarkRunner {
    config: Config,
    queries: Arc<[Query]>,
    sink: Arc<dyn ResultSink>,
    coordinator: WarehouseRun,
    uploader: Option<Arc<dyn ArtifactUploader>>,
    shutdown: watch::Receiver<bool>,
}

impl BenchmarkRunner {
    pub fn new(
        config: Config,
        queries: Vec<Query>,
        factory: Arc<dyn ExecutorFactory>,
        sink: Arc<dyn ResultSink>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let coordinator = WarehouseRun::new(factory, RunSettings::from_config(&config), shutdown.clone());
        Self {
            config,
            queries: queries.into(),
            sink,
            coordinator,
            uploader: None,
            shutdown,
        }
    }

    pub fn with_uploader(mut self, uploader: Arc<dyn ArtifactUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    /// Loads the query set, creates the result file and, when enabled, the
    /// S3 uploader.
    pub fn from_config(
        config: Config,
        factory: Arc<dyn ExecutorFactory>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, BenchError> {
        let queries = QueryLoader::new(&config.queries_path).load_all()?;
        if queries.is_empty() {
            return Err(BenchError::ConfigParsingError(format!(
                "no .sql files found in {}",
                config.queries_path.display()
            )));
        }
        info!("loaded {} queries from {}", queries.len(), config.queries_path.display());

        let uploader = config
            .upload_target()
            .map(|s3| ObjectStoreUploader::from_s3_config(s3, config.cert_path.as_deref()))
            .transpose()?;

        let file_name = result_file_name(config.runs, config.concurrency, &config.schema, &Local::now());
        let sink = CsvSink::create(&config.results_path, &file_name)?;
        info!("writing results to {}", sink.path().display());

        let runner = Self::new(config, queries, factory, Arc::new(sink), shutdown);
        Ok(match uploader {
            Some(uploader) => runner.with_uploader(Arc::new(uploader)),
            None => runner,
        })
    }

    pub fn sink(&self) -> &Arc<dyn ResultSink> {
        &self.sink
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// A warehouse that cannot be provisioned is logged and skipped; only a
    /// failure to close the result file fails the run.
    pub async fn run(&self) -> Result<RunReport, BenchError> {
        let settings = self.coordinator.settings();
        info!(
            "benchmark: {} queries, {} runs, concurrency {}, timeout {}",
            self.queries.len(),
            settings.runs,
            settings.concurrency,
            humantime::format_duration(settings.query_timeout)
        );

        let mut report = RunReport::default();
        for warehouse in &self.config.warehouses {
            if !warehouse.enabled {
                info!("skipping disabled warehouse {}", warehouse.name);
                report.skipped.push(warehouse.name.clone());
                continue;
            }
            if self.shutdown_requested() {
                warn!("shutdown requested, not starting {}", warehouse.name);
                break;
            }

            let result = self
                .coordinator
                .run(
                    warehouse,
                    &self.config.schema,
                    Arc::clone(&self.queries),
                    Arc::clone(&self.sink),
                )
                .await;
            match result {
                Ok(summary) => report.completed.push((warehouse.name.clone(), summary)),
                Err(e) => {
                    error!("{}: skipped: {e}", warehouse.name);
                    report.failed.push((warehouse.name.clone(), e.to_string()));
                }
            }
        }
        report.cancelled = self.shutdown_requested();

        self.sink.close()?;
        report.artifact = self.sink.location().map(Path::to_path_buf);
        info!(
            "benchmark finished: {} warehouses completed, {} failed, {} tasks",
            report.completed.len(),
            report.failed.len(),
            report.total_dispatched()
        );

        if let (Some(uploader), Some(path)) = (&self.uploader, &report.artifact) {
            if report.cancelled {
                warn!("run was interrupted, not uploading {}", path.display());
            } else {
                match uploader.upload(path).await {
                    Ok(()) => report.uploaded = true,
                    Err(e) => warn!("upload of {} failed: {e}", path.display()),
                }
            }
        }

        Ok(report)
    }
}
