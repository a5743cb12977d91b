//! Hive and Spark SQL through the Kyuubi REST frontend.
//!
//! One Kyuubi session backs one executor. Statements run asynchronously: the
//! executor submits them, polls the operation state, then drains the rowset
//! to count rows. The engine behind the session is picked with
//! `kyuubi.engine.type`.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::conf::{WarehouseConfig, WarehouseType};
use crate::connect::{ConnectionSettings, Connector};
use crate::core::BenchError;

use super::cancel::InFlight;
use super::{ExecutionOutcome, QueryExecutor, Stopwatch};

pub const ENGINE_TYPE_KEY: &str = "kyuubi.engine.type";
const DATABASE_KEY: &str = "use:database";
const HIVE_ENGINE: &str = "HIVE_SQL";

const DEFAULT_PORT: u16 = 10099;
const POLL_INTERVAL: Duration = Duration::from_millis(200);
const FETCH_SIZE: usize = 1000;

/// Engine the session should run on. An explicit `kyuubi.engine.type`
/// property wins; otherwise Hive asks for the Hive engine and Spark leaves
/// the server default.
pub fn engine_type(warehouse: &WarehouseConfig) -> Option<String> {
    if let Some(engine) = warehouse
        .connection
        .properties
        .get(ENGINE_TYPE_KEY)
        .filter(|e| !e.is_empty())
    {
        return Some(engine.clone());
    }
    match warehouse.kind {
        WarehouseType::Hive => Some(HIVE_ENGINE.to_string()),
        _ => None,
    }
}

/// Session configuration: the connection properties, the engine type and the
/// starting database.
pub fn session_configs(warehouse: &WarehouseConfig, schema: &str) -> BTreeMap<String, String> {
    let mut configs = warehouse.connection.properties.clone();
    if let Some(engine) = engine_type(warehouse) {
        configs.insert(ENGINE_TYPE_KEY.to_string(), engine);
    }
    if !schema.is_empty() {
        configs.insert(DATABASE_KEY.to_string(), schema.to_string());
    }
    configs
}

pub struct KyuubiConnector {
    settings: ConnectionSettings,
}

impl KyuubiConnector {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Connector for KyuubiConnector {
    async fn establish(
        &self,
        warehouse: &WarehouseConfig,
        schema: &str,
    ) -> Result<Box<dyn QueryExecutor>, BenchError> {
        let executor = KyuubiExecutor::connect(warehouse, schema, &self.settings).await?;
        Ok(Box::new(executor))
    }
}

#[derive(Debug, Deserialize)]
struct Handle {
    identifier: String,
}

#[derive(Debug, Deserialize)]
struct OperationEvent {
    state: String,
    #[serde(default)]
    exception: Option<String>,
}

#[derive(Debug, PartialEq)]
enum OperationState {
    Running,
    Finished,
    Failed(String),
}

impl OperationEvent {
    fn state(&self) -> OperationState {
        let state = self.state.to_ascii_uppercase();
        let state = state.strip_suffix("_STATE").unwrap_or(&state);
        match state {
            "FINISHED" => OperationState::Finished,
            "INITIALIZED" | "PENDING" | "RUNNING" | "COMPILED" => OperationState::Running,
            other => OperationState::Failed(
                self.exception
                    .clone()
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| format!("operation ended in state {other}")),
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RowSet {
    #[serde(default)]
    rows: Vec<serde_json::Value>,
}

pub struct KyuubiExecutor {
    name: String,
    client: Client,
    api_url: String,
    user: String,
    password: Option<String>,
    session: String,
    current_schema: String,
    in_flight: InFlight,
    closed: bool,
}

impl KyuubiExecutor {
    /// Opens a Kyuubi session on `schema` with the warehouse's engine
    /// settings.
    pub async fn connect(
        warehouse: &WarehouseConfig,
        schema: &str,
        settings: &ConnectionSettings,
    ) -> Result<Self, BenchError> {
        let conn = &warehouse.connection;
        if conn.host.is_empty() {
            return Err(BenchError::ConnectError(format!(
                "{}: no Kyuubi REST host configured (ZooKeeper discovery is not supported)",
                warehouse.name
            )));
        }

        let client = settings.http_client()?;
        let scheme = if conn.use_tls { "https" } else { "http" };
        let api_url = format!(
            "{scheme}://{}:{}/api/v1",
            conn.host,
            conn.port.unwrap_or(DEFAULT_PORT)
        );

        let mut executor = Self {
            name: warehouse.name.clone(),
            client,
            api_url,
            user: conn.username.clone(),
            password: conn.password.clone().filter(|p| !p.is_empty()),
            session: String::new(),
            current_schema: schema.to_string(),
            in_flight: InFlight::default(),
            closed: false,
        };

        let configs = session_configs(warehouse, schema);
        let url = format!("{}/sessions", executor.api_url);
        let resp = executor
            .authorize(executor.client.post(&url))
            .timeout(settings.connection_timeout)
            .json(&json!({ "configs": configs }))
            .send()
            .await
            .map_err(|e| BenchError::ConnectError(format!("{url}: {e}")))?;
        let handle: Handle = read_json(resp)
            .await
            .map_err(|e| BenchError::ConnectError(format!("{url}: {e}")))?;
        executor.session = handle.identifier;

        debug!(
            "{}: session {} opened on {} (engine {})",
            executor.name,
            executor.session,
            executor.api_url,
            configs.get(ENGINE_TYPE_KEY).map_or("default", String::as_str)
        );
        Ok(executor)
    }

    pub fn session_id(&self) -> &str {
        &self.session
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.basic_auth(&self.user, self.password.as_deref())
    }

    fn operation_url(&self, operation: &str) -> String {
        format!("{}/operations/{operation}", self.api_url)
    }

    async fn run_statement(&self, sql: &str) -> Result<u64, String> {
        let _cancel = self.in_flight.guard();

        let url = format!("{}/sessions/{}/operations/statement", self.api_url, self.session);
        let resp = self
            .authorize(self.client.post(&url))
            .json(&json!({ "statement": sql, "runAsync": true }))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let operation = read_json::<Handle>(resp).await?.identifier;

        self.in_flight.track(
            operation.as_str(),
            self.authorize(self.client.put(self.operation_url(&operation)))
                .json(&json!({ "action": "CANCEL" })),
        );
        let result = self.wait_and_count(&operation).await;
        self.in_flight.finish();

        self.close_operation(&operation).await;
        result
    }

    async fn wait_and_count(&self, operation: &str) -> Result<u64, String> {
        let event_url = format!("{}/event", self.operation_url(operation));
        loop {
            let resp = self
                .authorize(self.client.get(&event_url))
                .send()
                .await
                .map_err(|e| e.to_string())?;
            let event: OperationEvent = read_json(resp).await?;
            match event.state() {
                OperationState::Finished => break,
                OperationState::Failed(message) => return Err(message),
                OperationState::Running => tokio::time::sleep(POLL_INTERVAL).await,
            }
        }

        let rowset_url = format!("{}/rowset", self.operation_url(operation));
        let max_rows = FETCH_SIZE.to_string();
        let mut rows = 0u64;
        loop {
            let resp = self
                .authorize(self.client.get(&rowset_url))
                .query(&[("maxrows", max_rows.as_str()), ("fetchorientation", "FETCH_NEXT")])
                .send()
                .await
                .map_err(|e| e.to_string())?;
            let batch: RowSet = read_json(resp).await?;
            if batch.rows.is_empty() {
                return Ok(rows);
            }
            rows += batch.rows.len() as u64;
        }
    }

    async fn close_operation(&self, operation: &str) {
        let resp = self
            .authorize(self.client.put(self.operation_url(operation)))
            .json(&json!({ "action": "CLOSE" }))
            .send()
            .await;
        match resp {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => debug!("{}: closing operation {operation}: HTTP {}", self.name, resp.status()),
            Err(e) => debug!("{}: closing operation {operation}: {e}", self.name),
        }
    }
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, String> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(format!("HTTP {status}: {}", body.trim()));
    }
    resp.json::<T>()
        .await
        .map_err(|e| format!("decoding response: {e}"))
}

#[async_trait]
impl QueryExecutor for KyuubiExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&mut self, sql: &str, schema: &str) -> Result<ExecutionOutcome, BenchError> {
        if self.closed {
            return Err(BenchError::QueryError(format!("{}: executor is closed", self.name)));
        }

        if !schema.is_empty() && schema != self.current_schema {
            if let Err(message) = self.run_statement(&format!("USE {schema}")).await {
                return Ok(Stopwatch::start().failed(format!("switching to schema {schema}: {message}")));
            }
            self.current_schema = schema.to_string();
        }

        let stopwatch = Stopwatch::start();
        let outcome = match self.run_statement(sql).await {
            Ok(rows) => stopwatch.succeeded(rows),
            Err(message) => stopwatch.failed(message),
        };
        Ok(outcome)
    }

    async fn close(&mut self) -> Result<(), BenchError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.in_flight.settle().await;

        let url = format!("{}/sessions/{}", self.api_url, self.session);
        match self.authorize(self.client.delete(&url)).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!("{}: session {} closed", self.name, self.session);
                Ok(())
            }
            Ok(resp) => {
                warn!("{}: closing session {}: HTTP {}", self.name, self.session, resp.status());
                Err(BenchError::ConnectError(format!("{url} answered {}", resp.status())))
            }
            Err(e) => Err(BenchError::ConnectError(format!("{url}: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::ConnectionConfig;

    fn kyuubi(kind: WarehouseType, properties: &[(&str, &str)]) -> WarehouseConfig {
        WarehouseConfig {
            name: kind.to_string(),
            kind,
            enabled: true,
            table_type: None,
            storage_location: None,
            connection: ConnectionConfig {
                host: "kyuubi".to_string(),
                properties: properties
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                ..ConnectionConfig::default()
            },
        }
    }

    #[test]
    fn test_engine_type_defaults() {
        assert_eq!(engine_type(&kyuubi(WarehouseType::Hive, &[])).as_deref(), Some("HIVE_SQL"));
        assert_eq!(engine_type(&kyuubi(WarehouseType::Spark, &[])), None);
    }

    #[test]
    fn test_engine_type_property_wins() {
        let wh = kyuubi(WarehouseType::Hive, &[(ENGINE_TYPE_KEY, "SPARK_SQL")]);
        assert_eq!(engine_type(&wh).as_deref(), Some("SPARK_SQL"));
        let wh = kyuubi(WarehouseType::Spark, &[(ENGINE_TYPE_KEY, "")]);
        assert_eq!(engine_type(&wh), None);
    }

    #[test]
    fn test_session_configs_keep_properties() {
        let wh = kyuubi(WarehouseType::Hive, &[("spark.executor.memory", "4g")]);
        let configs = session_configs(&wh, "tpcds_s3");
        assert_eq!(configs.get("spark.executor.memory").map(String::as_str), Some("4g"));
        assert_eq!(configs.get(ENGINE_TYPE_KEY).map(String::as_str), Some("HIVE_SQL"));
        assert_eq!(configs.get(DATABASE_KEY).map(String::as_str), Some("tpcds_s3"));

        let configs = session_configs(&kyuubi(WarehouseType::Spark, &[]), "");
        assert!(configs.is_empty());
    }

    #[test]
    fn test_operation_states() {
        let event = |state: &str, exception: Option<&str>| OperationEvent {
            state: state.to_string(),
            exception: exception.map(str::to_string),
        };
        assert_eq!(event("FINISHED_STATE", None).state(), OperationState::Finished);
        assert_eq!(event("running", None).state(), OperationState::Running);
        assert_eq!(event("PENDING_STATE", None).state(), OperationState::Running);
        assert_eq!(
            event("ERROR_STATE", Some("Table not found: x")).state(),
            OperationState::Failed("Table not found: x".to_string())
        );
        assert_eq!(
            event("CANCELED", None).state(),
            OperationState::Failed("operation ended in state CANCELED".to_string())
        );
    }

    #[test]
    fn test_decode_rowset() {
        let body = r#"{"rows": [{"fields": [{"dataType": "INT", "value": 1}]}], "rowCount": 1}"#;
        let batch: RowSet = serde_json::from_str(body).unwrap();
        assert_eq!(batch.rows.len(), 1);
        let empty: RowSet = serde_json::from_str(r#"{"rowCount": 0}"#).unwrap();
        assert!(empty.rows.is_empty());
    }
}
