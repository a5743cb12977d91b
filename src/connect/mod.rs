mod retry;
mod tls;

pub use retry::{ResilientConnector, RetryPolicy};
pub use tls::{load_root_certificate, read_certificate_pem};

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::conf::{Config, WarehouseConfig};
use crate::core::BenchError;
use crate::executor::QueryExecutor;

/// Settings shared by every connection handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    pub connection_timeout: Duration,
    pub cert_path: Option<PathBuf>,
}

impl ConnectionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            connection_timeout: config.connection_timeout,
            cert_path: config.cert_path.clone(),
        }
    }

    /// HTTP client for warehouse endpoints, trusting `cert_path` when set.
    pub fn http_client(&self) -> Result<Client, BenchError> {
        let mut builder = Client::builder().connect_timeout(self.connection_timeout);
        if let Some(cert) = load_root_certificate(self.cert_path.as_deref())? {
            builder = builder.add_root_certificate(cert);
        }
        builder
            .build()
            .map_err(|e| BenchError::ConnectError(format!("building http client: {e}")))
    }
}

/// One protocol handshake for one warehouse type. A single call is a single
/// attempt; retries are layered on top by [`ResilientConnector`].
#[async_trait]
pub trait Connector: Send + Sync {
    async fn establish(
        &self,
        warehouse: &WarehouseConfig,
        schema: &str,
    ) -> Result<Box<dyn QueryExecutor>, BenchError>;
}
