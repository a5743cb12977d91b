use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum BenchError {
    #[error("Cannot parse config: {0}")]
    ConfigParsingError(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("TLS error: {0}")]
    TlsError(String),
    #[error("Connection error: {0}")]
    ConnectError(String),
    #[error("could not connect after {attempts} attempts: {last}")]
    ConnectionExhausted {
        attempts: u32,
        #[source]
        last: Box<BenchError>,
    },
    #[error("cannot create executor #{index} for warehouse '{warehouse}': {source}")]
    ExecutorCreation {
        warehouse: String,
        index: usize,
        #[source]
        source: Box<BenchError>,
    },
    #[error("unsupported warehouse type '{0}'")]
    UnsupportedWarehouse(String),
    #[error("Query error: {0}")]
    QueryError(String),
    #[error("Sink error: {0}")]
    SinkError(String),
    #[error("Upload error: {0}")]
    UploadError(String),
}

impl From<std::io::Error> for BenchError {
    fn from(err: std::io::Error) -> Self {
        BenchError::IoError(err.to_string())
    }
}

impl From<csv::Error> for BenchError {
    fn from(err: csv::Error) -> Self {
        BenchError::SinkError(err.to_string())
    }
}

impl From<config::ConfigError> for BenchError {
    fn from(err: config::ConfigError) -> Self {
        BenchError::ConfigParsingError(err.to_string())
    }
}

impl From<reqwest::Error> for BenchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            BenchError::ConnectError(err.to_string())
        } else {
            BenchError::QueryError(err.to_string())
        }
    }
}

impl From<object_store::Error> for BenchError {
    fn from(err: object_store::Error) -> Self {
        BenchError::UploadError(err.to_string())
    }
}
