mod csv_sink;
mod record;

pub use csv_sink::{CsvSink, result_file_name};
pub use record::{BenchmarkResult, HEADER, Status};

use std::path::Path;

use crate::core::BenchError;

/// Append-only destination for benchmark results.
///
/// The runner drives `save` from a single writer task; implementations still
/// guard their state so `close` can race a late `save` safely.
pub trait ResultSink: Send + Sync {
    fn save(&self, result: &BenchmarkResult) -> Result<(), BenchError>;

    /// Flushes and releases the underlying resource. Closing twice is a no-op.
    fn close(&self) -> Result<(), BenchError>;

    /// File holding the results, if the sink writes to one.
    fn location(&self) -> Option<&Path>;
}
