use chrono::Utc;

use crate::executor::ExecutionOutcome;
use crate::query::Query;
use crate::sink::{BenchmarkResult, Status};

/// One run of one query on one worker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Task<'a> {
    pub query: &'a Query,
    /// 1-based repetition number.
    pub run: u32,
    pub schema: &'a str,
    pub warehouse: &'a str,
    pub worker_id: usize,
}

impl Task<'_> {
    pub fn into_result(self, outcome: ExecutionOutcome) -> BenchmarkResult {
        let (status, row_count) = match outcome.error {
            None => (Status::Success, outcome.row_count),
            Some(_) => (Status::Error, 0),
        };
        BenchmarkResult {
            save_result_timestamp: Utc::now(),
            start_timestamp: outcome.start,
            end_timestamp: outcome.end,
            query_id: self.query.id.clone(),
            warehouse: self.warehouse.to_string(),
            schema: self.schema.to_string(),
            run_number: self.run,
            thread_id: self.worker_id,
            duration_ms: outcome.duration.as_millis() as u64,
            status,
            error_message: outcome.error.unwrap_or_default(),
            row_count,
        }
    }
}

/// Every worker walks the whole query set, each query `runs` times in a row.
pub fn worker_tasks<'a>(
    queries: &'a [Query],
    runs: u32,
    schema: &'a str,
    warehouse: &'a str,
    worker_id: usize,
) -> impl Iterator<Item = Task<'a>> + 'a {
    queries.iter().flat_map(move |query| {
        (1..=runs).map(move |run| Task {
            query,
            run,
            schema,
            warehouse,
            worker_id,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Stopwatch;

    fn queries() -> Vec<Query> {
        vec![Query::new("q1", "select 1"), Query::new("q2", "select 2")]
    }

    #[test]
    fn test_query_order_then_run_order() {
        let queries = queries();
        let order: Vec<_> = worker_tasks(&queries, 3, "s", "wh", 0)
            .map(|t| (t.query.id.as_str(), t.run))
            .collect();
        assert_eq!(
            order,
            vec![("q1", 1), ("q1", 2), ("q1", 3), ("q2", 1), ("q2", 2), ("q2", 3)]
        );
    }

    #[test]
    fn test_every_worker_gets_the_same_work() {
        let queries = queries();
        let pairs = |worker| {
            worker_tasks(&queries, 2, "s", "wh", worker)
                .map(|t| (t.query.id.clone(), t.run))
                .collect::<Vec<_>>()
        };
        assert_eq!(pairs(0), pairs(3));
        assert!(worker_tasks(&queries, 2, "s", "wh", 3).all(|t| t.worker_id == 3));
    }

    #[test]
    fn test_no_runs_no_tasks() {
        let queries = queries();
        assert_eq!(worker_tasks(&queries, 0, "s", "wh", 0).count(), 0);
    }

    #[test]
    fn test_into_result_success_and_failure() {
        let queries = queries();
        let task = worker_tasks(&queries, 1, "tpcds", "trino", 2).next().unwrap();

        let ok = task.into_result(Stopwatch::start().succeeded(10));
        assert_eq!(ok.status, Status::Success);
        assert_eq!(ok.row_count, 10);
        assert_eq!(ok.thread_id, 2);
        assert_eq!(ok.schema, "tpcds");
        assert!(ok.error_message.is_empty());

        let failed = task.into_result(Stopwatch::start().failed("boom"));
        assert_eq!(failed.status, Status::Error);
        assert_eq!(failed.error_message, "boom");
        assert_eq!(failed.row_count, 0);
        assert!(failed.save_result_timestamp >= failed.end_timestamp);
    }
}
