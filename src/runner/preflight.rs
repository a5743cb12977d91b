use std::time::Duration;

use log::{info, warn};

use crate::conf::Config;
use crate::core::BenchError;
use crate::executor::ExecutorFactory;

const CHECK_SQL: &str = "SELECT 1";
const CHECK_TIMEOUT: Duration = Duration::from_secs(120);

/// Opens one executor per enabled warehouse and runs a trivial statement on
/// it, so a broken config fails before the result file is created.
pub async fn preflight(config: &Config, factory: &dyn ExecutorFactory) -> Result<(), BenchError> {
    for warehouse in config.enabled_warehouses() {
        let schema = warehouse.schema_name(&config.schema);
        info!("checking {} ({}) with schema {schema}", warehouse.name, warehouse.kind);

        let mut executor = factory
            .create(warehouse, &config.schema)
            .await
            .map_err(|e| BenchError::ExecutorCreation {
                warehouse: warehouse.name.clone(),
                index: 0,
                source: Box::new(e),
            })?;

        let check = tokio::time::timeout(CHECK_TIMEOUT, executor.execute(CHECK_SQL, &schema)).await;
        if let Err(e) = executor.close().await {
            warn!("{}: closing check executor failed: {e}", warehouse.name);
        }

        let outcome = match check {
            Err(_) => {
                return Err(BenchError::QueryError(format!(
                    "{}: check query timed out after {}",
                    warehouse.name,
                    humantime::format_duration(CHECK_TIMEOUT)
                )));
            }
            Ok(result) => result?,
        };
        if let Some(message) = outcome.error {
            return Err(BenchError::QueryError(format!(
                "{}: check query failed: {message}",
                warehouse.name
            )));
        }
        info!("{} answered in {} ms", warehouse.name, outcome.duration.as_millis());
    }
    Ok(())
}
