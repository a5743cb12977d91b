mod cancel;
mod factory;
pub mod kyuubi;
pub mod trino;

pub use factory::{ExecutorFactory, WarehouseExecutorFactory};

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::BenchError;

/// Timing and outcome of one statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration: Duration,
    pub row_count: u64,
    /// Set when the warehouse rejected or failed the statement.
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// Wall-clock timestamps plus a monotonic duration for one execution.
pub struct Stopwatch {
    start: DateTime<Utc>,
    started: Instant,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            start: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn succeeded(self, row_count: u64) -> ExecutionOutcome {
        self.finish(row_count, None)
    }

    pub fn failed(self, error: impl Into<String>) -> ExecutionOutcome {
        self.finish(0, Some(error.into()))
    }

    fn finish(self, row_count: u64, error: Option<String>) -> ExecutionOutcome {
        let duration = self.started.elapsed();
        ExecutionOutcome {
            start: self.start,
            end: Utc::now(),
            duration,
            row_count,
            error,
        }
    }
}

/// A live session against one warehouse. Each benchmark worker owns exactly
/// one executor, so implementations need no internal locking.
#[async_trait]
pub trait QueryExecutor: Send {
    fn name(&self) -> &str;

    /// Runs one statement against `schema`. Statement failures come back as
    /// an outcome with `error` set; `Err` is reserved for a broken executor.
    async fn execute(&mut self, sql: &str, schema: &str) -> Result<ExecutionOutcome, BenchError>;

    async fn close(&mut self) -> Result<(), BenchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopwatch_outcomes() {
        let ok = Stopwatch::start().succeeded(42);
        assert!(ok.success());
        assert_eq!(ok.row_count, 42);
        assert!(ok.end >= ok.start);

        let failed = Stopwatch::start().failed("syntax error");
        assert!(!failed.success());
        assert_eq!(failed.row_count, 0);
        assert_eq!(failed.error.as_deref(), Some("syntax error"));
    }
}
