use async_trait::async_trait;
use log::debug;

use crate::conf::{Config, WarehouseConfig, WarehouseType};
use crate::connect::{ConnectionSettings, Connector, ResilientConnector, RetryPolicy};
use crate::core::BenchError;

use super::QueryExecutor;
use super::kyuubi::KyuubiConnector;
use super::trino::TrinoConnector;

/// Produces ready-to-use executors for a warehouse.
#[async_trait]
pub trait ExecutorFactory: Send + Sync {
    async fn create(
        &self,
        warehouse: &WarehouseConfig,
        base_schema: &str,
    ) -> Result<Box<dyn QueryExecutor>, BenchError>;
}

/// Picks the handshake for the warehouse type and runs it under the retry policy.
pub struct WarehouseExecutorFactory {
    retry: ResilientConnector,
    trino: TrinoConnector,
    kyuubi: KyuubiConnector,
}

impl WarehouseExecutorFactory {
    pub fn new(settings: ConnectionSettings, policy: RetryPolicy) -> Self {
        Self {
            retry: ResilientConnector::new(policy),
            trino: TrinoConnector::new(settings.clone()),
            kyuubi: KyuubiConnector::new(settings),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ConnectionSettings::from_config(config),
            RetryPolicy::new(config.connection_retries, config.retry_delay),
        )
    }

    fn connector(&self, kind: WarehouseType) -> Result<&dyn Connector, BenchError> {
        match kind {
            WarehouseType::Trino => Ok(&self.trino),
            WarehouseType::Hive | WarehouseType::Spark => Ok(&self.kyuubi),
            // Impala speaks Thrift and Vertica its own wire protocol
            WarehouseType::Impala | WarehouseType::Vertica => {
                Err(BenchError::UnsupportedWarehouse(kind.to_string()))
            }
        }
    }
}

#[async_trait]
impl ExecutorFactory for WarehouseExecutorFactory {
    async fn create(
        &self,
        warehouse: &WarehouseConfig,
        base_schema: &str,
    ) -> Result<Box<dyn QueryExecutor>, BenchError> {
        let connector = self.connector(warehouse.kind)?;
        let schema = warehouse.schema_name(base_schema);
        let schema = schema.as_str();
        let label = format!("{}({}.{})", warehouse.kind, warehouse.name, schema);

        debug!("{label}: connecting");
        self.retry
            .acquire(&label, || connector.establish(warehouse, schema))
            .await
    }
}
