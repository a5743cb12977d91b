use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Error => "error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const HEADER: [&str; 12] = [
    "save_result_timestamp",
    "start_timestamp",
    "end_timestamp",
    "query_id",
    "warehouse",
    "schema",
    "run_number",
    "thread_id",
    "duration_ms",
    "status",
    "error_message",
    "row_count",
];

/// One persisted measurement: a single run of a single query on one worker.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkResult {
    /// When the result was handed to the writer.
    pub save_result_timestamp: DateTime<Utc>,
    pub start_timestamp: DateTime<Utc>,
    pub end_timestamp: DateTime<Utc>,
    pub query_id: String,
    pub warehouse: String,
    pub schema: String,
    pub run_number: u32,
    pub thread_id: usize,
    pub duration_ms: u64,
    pub status: Status,
    pub error_message: String,
    pub row_count: u64,
}

impl BenchmarkResult {
    pub fn to_record(&self) -> [String; 12] {
        [
            rfc3339(&self.save_result_timestamp),
            rfc3339(&self.start_timestamp),
            rfc3339(&self.end_timestamp),
            self.query_id.clone(),
            self.warehouse.clone(),
            self.schema.clone(),
            self.run_number.to_string(),
            self.thread_id.to_string(),
            self.duration_ms.to_string(),
            self.status.to_string(),
            self.error_message.clone(),
            self.row_count.to_string(),
        ]
    }
}

fn rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_to_record_matches_header_order() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        let result = BenchmarkResult {
            save_result_timestamp: ts,
            start_timestamp: ts,
            end_timestamp: ts,
            query_id: "q07".to_string(),
            warehouse: "trino".to_string(),
            schema: "tpcds_iceberg".to_string(),
            run_number: 2,
            thread_id: 1,
            duration_ms: 1500,
            status: Status::Error,
            error_message: "boom".to_string(),
            row_count: 0,
        };
        let record = result.to_record();
        assert_eq!(record.len(), HEADER.len());
        assert_eq!(record[0], "2024-03-01T12:30:05Z");
        assert_eq!(record[3], "q07");
        assert_eq!(record[9], "error");
        assert_eq!(record[10], "boom");
    }
}
