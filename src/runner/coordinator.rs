use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use log::{error, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::conf::{Config, WarehouseConfig};
use crate::core::BenchError;
use crate::executor::{ExecutorFactory, QueryExecutor, Stopwatch};
use crate::query::Query;
use crate::sink::{BenchmarkResult, ResultSink, Status};

use super::progress::Progress;
use super::task::{Task, worker_tasks};

/// Queue slots per worker between the workers and the result writer.
const QUEUE_SLOTS_PER_WORKER: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSettings {
    pub runs: u32,
    pub concurrency: usize,
    pub query_timeout: Duration,
}

impl RunSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            runs: config.runs,
            concurrency: config.concurrency,
            query_timeout: config.timeout,
        }
    }

    pub fn queue_capacity(&self) -> usize {
        self.concurrency.max(1) * QUEUE_SLOTS_PER_WORKER
    }

    pub fn total_tasks(&self, queries: usize) -> usize {
        queries * self.runs as usize * self.concurrency
    }
}

/// What happened on one warehouse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarehouseSummary {
    /// Tasks executed and handed to the writer.
    pub dispatched: usize,
    /// Tasks whose result has status error.
    pub failed_tasks: usize,
    pub saved: usize,
    pub failed_writes: usize,
}

#[derive(Debug, Default)]
struct WriterStats {
    saved: usize,
    failed: usize,
}

struct WorkerContext {
    queries: Arc<[Query]>,
    schema: String,
    warehouse: String,
    runs: u32,
    query_timeout: Duration,
    progress: Progress,
    shutdown: watch::Receiver<bool>,
}

impl WorkerContext {
    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }
}

#[derive(Debug, Default)]
struct WorkerCounts {
    dispatched: usize,
    failed: usize,
}

struct WorkerReport {
    executor: Box<dyn QueryExecutor>,
    counts: WorkerCounts,
}

/// Runs the whole query set against one warehouse: one executor per worker,
/// every worker running every query `runs` times, results funnelled through a
/// bounded queue into a single writer.
pub struct WarehouseRun {
    factory: Arc<dyn ExecutorFactory>,
    settings: RunSettings,
    shutdown: watch::Receiver<bool>,
}

impl WarehouseRun {
    pub fn new(
        factory: Arc<dyn ExecutorFactory>,
        settings: RunSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            factory,
            settings,
            shutdown,
        }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub async fn run(
        &self,
        warehouse: &WarehouseConfig,
        base_schema: &str,
        queries: Arc<[Query]>,
        sink: Arc<dyn ResultSink>,
    ) -> Result<WarehouseSummary, BenchError> {
        let schema = warehouse.schema_name(base_schema);
        info!(
            "=== {} ({}) schema={} concurrency={} runs={} ===",
            warehouse.name, warehouse.kind, schema, self.settings.concurrency, self.settings.runs
        );

        let executors = self.provision(warehouse, base_schema).await?;

        let total = self.settings.total_tasks(queries.len());
        info!("{}: {} executors ready, {} tasks", warehouse.name, executors.len(), total);

        let (tx, rx) = mpsc::channel(self.settings.queue_capacity());
        let writer = spawn_writer(rx, sink);

        let ctx = Arc::new(WorkerContext {
            queries,
            schema,
            warehouse: warehouse.name.clone(),
            runs: self.settings.runs,
            query_timeout: self.settings.query_timeout,
            progress: Progress::new(total),
            shutdown: self.shutdown.clone(),
        });

        let workers: Vec<JoinHandle<WorkerReport>> = executors
            .into_iter()
            .enumerate()
            .map(|(worker_id, executor)| {
                tokio::spawn(run_worker(worker_id, executor, Arc::clone(&ctx), tx.clone()))
            })
            .collect();
        // the writer stops once the last worker drops its sender
        drop(tx);

        let mut summary = WarehouseSummary::default();
        let mut executors = Vec::with_capacity(workers.len());
        for (worker_id, handle) in workers.into_iter().enumerate() {
            match handle.await {
                Ok(report) => {
                    summary.dispatched += report.counts.dispatched;
                    summary.failed_tasks += report.counts.failed;
                    executors.push(report.executor);
                }
                Err(e) => error!("{}: worker {worker_id} died: {e}", warehouse.name),
            }
        }

        match writer.await {
            Ok(stats) => {
                summary.saved = stats.saved;
                summary.failed_writes = stats.failed;
            }
            Err(e) => error!("{}: result writer died: {e}", warehouse.name),
        }

        close_all(&warehouse.name, executors).await;

        info!(
            "=== {} done: {} tasks, {} failed, {} saved ===",
            warehouse.name, summary.dispatched, summary.failed_tasks, summary.saved
        );
        Ok(summary)
    }

    /// Creates one executor per worker. The first failure closes whatever was
    /// already created and aborts the warehouse.
    async fn provision(
        &self,
        warehouse: &WarehouseConfig,
        base_schema: &str,
    ) -> Result<Vec<Box<dyn QueryExecutor>>, BenchError> {
        let mut executors = Vec::with_capacity(self.settings.concurrency);
        for index in 0..self.settings.concurrency {
            match self.factory.create(warehouse, base_schema).await {
                Ok(executor) => executors.push(executor),
                Err(err) => {
                    close_all(&warehouse.name, executors).await;
                    return Err(BenchError::ExecutorCreation {
                        warehouse: warehouse.name.clone(),
                        index,
                        source: Box::new(err),
                    });
                }
            }
        }
        Ok(executors)
    }
}

async fn close_all(warehouse: &str, executors: Vec<Box<dyn QueryExecutor>>) {
    for (worker_id, mut executor) in executors.into_iter().enumerate() {
        if let Err(e) = executor.close().await {
            warn!("{warehouse}: closing executor {worker_id} failed: {e}");
        }
    }
}

fn spawn_writer(
    mut results: mpsc::Receiver<BenchmarkResult>,
    sink: Arc<dyn ResultSink>,
) -> JoinHandle<WriterStats> {
    tokio::task::spawn_blocking(move || {
        let mut stats = WriterStats::default();
        while let Some(result) = results.blocking_recv() {
            match sink.save(&result) {
                Ok(()) => stats.saved += 1,
                Err(e) => {
                    stats.failed += 1;
                    warn!(
                        "[worker {}] dropping result of {} run {}: {e}",
                        result.thread_id, result.query_id, result.run_number
                    );
                }
            }
        }
        stats
    })
}

/// Drives one worker and always hands its executor back, even when the loop
/// itself panics, so the coordinator can close it.
async fn run_worker(
    worker_id: usize,
    mut executor: Box<dyn QueryExecutor>,
    ctx: Arc<WorkerContext>,
    results: mpsc::Sender<BenchmarkResult>,
) -> WorkerReport {
    let mut counts = WorkerCounts::default();
    let driven = AssertUnwindSafe(drive_tasks(
        worker_id,
        executor.as_mut(),
        &ctx,
        &results,
        &mut counts,
    ))
    .catch_unwind()
    .await;
    if let Err(panic) = driven {
        error!(
            "{}: worker {worker_id} stopped after {} tasks: {}",
            ctx.warehouse,
            counts.dispatched,
            panic_message(&*panic)
        );
    }

    WorkerReport { executor, counts }
}

async fn drive_tasks(
    worker_id: usize,
    executor: &mut dyn QueryExecutor,
    ctx: &WorkerContext,
    results: &mpsc::Sender<BenchmarkResult>,
    counts: &mut WorkerCounts,
) {
    let executor_name = executor.name().to_owned();

    for task in worker_tasks(&ctx.queries, ctx.runs, &ctx.schema, &ctx.warehouse, worker_id) {
        if ctx.shutdown_requested() {
            info!("[worker {worker_id}] shutdown requested, stopping");
            break;
        }

        let position = ctx.progress.advance();
        info!(
            "[worker {worker_id}] [{position}/{}] {executor_name}: {} run {}/{}",
            ctx.progress.total(),
            task.query.id,
            task.run,
            ctx.runs
        );

        let result = execute_task(executor, task, ctx.query_timeout).await;
        counts.dispatched += 1;
        match result.status {
            Status::Success => info!(
                "[worker {worker_id}] {} run {} took {} ms, {} rows",
                result.query_id, result.run_number, result.duration_ms, result.row_count
            ),
            Status::Error => {
                counts.failed += 1;
                warn!(
                    "[worker {worker_id}] {} run {} failed after {} ms: {}",
                    result.query_id, result.run_number, result.duration_ms, result.error_message
                );
            }
        }

        if results.send(result).await.is_err() {
            error!("[worker {worker_id}] result writer is gone, stopping");
            break;
        }
    }
}

/// Runs one task under the per-query timeout. Timeouts, executor errors and
/// panics all become error results.
async fn execute_task(
    executor: &mut dyn QueryExecutor,
    task: Task<'_>,
    query_timeout: Duration,
) -> BenchmarkResult {
    let stopwatch = Stopwatch::start();
    let call = tokio::time::timeout(query_timeout, executor.execute(&task.query.sql, task.schema));

    let outcome = match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(Ok(outcome))) => outcome,
        Ok(Ok(Err(e))) => stopwatch.failed(e.to_string()),
        Ok(Err(_)) => stopwatch.failed(format!(
            "query timed out after {}",
            humantime::format_duration(query_timeout)
        )),
        Err(panic) => stopwatch.failed(format!("executor panicked: {}", panic_message(&*panic))),
    };
    task.into_result(outcome)
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
