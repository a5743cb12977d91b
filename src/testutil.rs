//! Test utilities: scripted executors, in-memory sinks and config builders.
//!
//! This module is only available when the `testutil` feature is enabled.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Condvar, Mutex};
use tempfile::TempDir;

use crate::conf::{Config, ConnectionConfig, WarehouseConfig, WarehouseType};
use crate::core::BenchError;
use crate::executor::{ExecutionOutcome, ExecutorFactory, QueryExecutor, Stopwatch};
use crate::query::Query;
use crate::sink::{BenchmarkResult, ResultSink};
use crate::upload::ArtifactUploader;

/// How a [`ScriptedExecutor`] answers a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Behavior {
    Rows(u64),
    /// The warehouse rejects the statement.
    Fail(String),
    /// The executor itself breaks.
    Broken(String),
    /// Never answers.
    Hang,
    Panic(String),
}

/// Counters shared by every executor a [`MockFactory`] hands out.
#[derive(Debug, Default)]
pub struct ExecutorStats {
    pub attempts: AtomicUsize,
    pub created: AtomicUsize,
    pub executed: AtomicUsize,
    pub closed: AtomicUsize,
    /// `(warehouse, sql, schema)` of every execution.
    pub calls: Mutex<Vec<(String, String, String)>>,
}

impl ExecutorStats {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, warehouse: &str) -> usize {
        self.calls.lock().iter().filter(|(w, _, _)| w == warehouse).count()
    }
}

pub struct ScriptedExecutor {
    name: String,
    script: Arc<HashMap<String, Behavior>>,
    delay: Duration,
    stats: Arc<ExecutorStats>,
}

#[async_trait]
impl QueryExecutor for ScriptedExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&mut self, sql: &str, schema: &str) -> Result<ExecutionOutcome, BenchError> {
        self.stats.executed.fetch_add(1, Ordering::SeqCst);
        self.stats
            .calls
            .lock()
            .push((self.name.clone(), sql.to_string(), schema.to_string()));

        let stopwatch = Stopwatch::start();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.script.get(sql).cloned().unwrap_or(Behavior::Rows(1)) {
            Behavior::Rows(rows) => Ok(stopwatch.succeeded(rows)),
            Behavior::Fail(message) => Ok(stopwatch.failed(message)),
            Behavior::Broken(message) => Err(BenchError::QueryError(message)),
            Behavior::Hang => std::future::pending().await,
            Behavior::Panic(message) => panic!("{message}"),
        }
    }

    async fn close(&mut self) -> Result<(), BenchError> {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out [`ScriptedExecutor`]s, optionally failing chosen creations.
#[derive(Default)]
pub struct MockFactory {
    script: Arc<HashMap<String, Behavior>>,
    delay: Duration,
    fail_on_create: Option<usize>,
    failing_warehouses: HashSet<String>,
    stats: Arc<ExecutorStats>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `sql` with `behavior`; unscripted statements return one row.
    pub fn with_behavior(mut self, sql: &str, behavior: Behavior) -> Self {
        Arc::make_mut(&mut self.script).insert(sql.to_string(), behavior);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The `n`-th creation (1-based, counted across warehouses) fails.
    pub fn fail_on_create(mut self, n: usize) -> Self {
        self.fail_on_create = Some(n);
        self
    }

    pub fn fail_warehouse(mut self, name: &str) -> Self {
        self.failing_warehouses.insert(name.to_string());
        self
    }

    pub fn stats(&self) -> Arc<ExecutorStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl ExecutorFactory for MockFactory {
    async fn create(
        &self,
        warehouse: &WarehouseConfig,
        _base_schema: &str,
    ) -> Result<Box<dyn QueryExecutor>, BenchError> {
        let attempt = self.stats.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_create == Some(attempt) || self.failing_warehouses.contains(&warehouse.name) {
            return Err(BenchError::ConnectError(format!(
                "{} refused connection #{attempt}",
                warehouse.name
            )));
        }
        self.stats.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedExecutor {
            name: warehouse.name.clone(),
            script: Arc::clone(&self.script),
            delay: self.delay,
            stats: Arc::clone(&self.stats),
        }))
    }
}

/// Keeps results in memory.
#[derive(Default)]
pub struct MemorySink {
    results: Mutex<Vec<BenchmarkResult>>,
    closed: AtomicBool,
    fail_query: Option<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Saves of results for `query_id` fail.
    pub fn failing_on(query_id: &str) -> Self {
        Self {
            fail_query: Some(query_id.to_string()),
            ..Self::default()
        }
    }

    pub fn results(&self) -> Vec<BenchmarkResult> {
        self.results.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl ResultSink for MemorySink {
    fn save(&self, result: &BenchmarkResult) -> Result<(), BenchError> {
        if self.is_closed() {
            return Err(BenchError::SinkError("sink is closed".into()));
        }
        if self.fail_query.as_deref() == Some(result.query_id.as_str()) {
            return Err(BenchError::SinkError(format!("cannot store {}", result.query_id)));
        }
        self.results.lock().push(result.clone());
        Ok(())
    }

    fn close(&self) -> Result<(), BenchError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn location(&self) -> Option<&Path> {
        None
    }
}

/// A [`MemorySink`] whose saves block until [`GatedSink::open`] is called.
#[derive(Default)]
pub struct GatedSink {
    inner: MemorySink,
    open: Mutex<bool>,
    opened: Condvar,
}

impl GatedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }

    pub fn results(&self) -> Vec<BenchmarkResult> {
        self.inner.results()
    }
}

impl ResultSink for GatedSink {
    fn save(&self, result: &BenchmarkResult) -> Result<(), BenchError> {
        let mut open = self.open.lock();
        while !*open {
            self.opened.wait(&mut open);
        }
        drop(open);
        self.inner.save(result)
    }

    fn close(&self) -> Result<(), BenchError> {
        self.inner.close()
    }

    fn location(&self) -> Option<&Path> {
        None
    }
}

/// Records upload requests instead of sending anything.
#[derive(Default)]
pub struct RecordingUploader {
    uploads: Mutex<Vec<PathBuf>>,
    fail: bool,
}

impl RecordingUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn uploads(&self) -> Vec<PathBuf> {
        self.uploads.lock().clone()
    }
}

#[async_trait]
impl ArtifactUploader for RecordingUploader {
    async fn upload(&self, path: &Path) -> Result<(), BenchError> {
        self.uploads.lock().push(path.to_path_buf());
        if self.fail {
            return Err(BenchError::UploadError("bucket unavailable".into()));
        }
        Ok(())
    }
}

pub fn warehouse(name: &str, kind: WarehouseType) -> WarehouseConfig {
    WarehouseConfig {
        name: name.to_string(),
        kind,
        enabled: true,
        table_type: None,
        storage_location: None,
        connection: ConnectionConfig {
            host: "localhost".to_string(),
            username: "bench".to_string(),
            database: "hive".to_string(),
            ..ConnectionConfig::default()
        },
    }
}

/// Queries `q1..qn`, each with sql `select {i}`.
pub fn queries(n: usize) -> Vec<Query> {
    (1..=n)
        .map(|i| Query::new(format!("q{i}"), format!("select {i}")))
        .collect()
}

pub fn config(warehouses: Vec<WarehouseConfig>, runs: u32, concurrency: usize) -> Config {
    Config {
        warehouses,
        schema: "tpcds".to_string(),
        queries_path: PathBuf::from("queries"),
        results_path: PathBuf::from("results"),
        timeout: Duration::from_secs(10),
        connection_timeout: Duration::from_secs(1),
        cert_path: None,
        runs,
        concurrency,
        connection_retries: 1,
        retry_delay: Duration::from_millis(10),
        s3: None,
    }
}

/// Temporary directory with a `queries/` folder holding `{id}.sql` files and
/// an empty `results/` path, wired into a config.
pub fn workspace(
    queries: &[(&str, &str)],
    warehouses: Vec<WarehouseConfig>,
    runs: u32,
    concurrency: usize,
) -> std::io::Result<(TempDir, Config)> {
    let dir = TempDir::new()?;
    let queries_path = dir.path().join("queries");
    fs::create_dir_all(&queries_path)?;
    for (id, sql) in queries {
        fs::write(queries_path.join(format!("{id}.sql")), sql)?;
    }

    let mut config = config(warehouses, runs, concurrency);
    config.queries_path = queries_path;
    config.results_path = dir.path().join("results");
    Ok((dir, config))
}
