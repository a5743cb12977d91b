//! Trino over its HTTP client protocol.
//!
//! A statement is `POST`ed to `/v1/statement`; the coordinator answers with a
//! page of results and a `nextUri` to poll until the query finishes. Rows are
//! counted, never decoded. A statement abandoned before its last page gets a
//! `DELETE nextUri` so it stops on the cluster too.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use crate::conf::WarehouseConfig;
use crate::connect::{ConnectionSettings, Connector};
use crate::core::BenchError;

use super::cancel::InFlight;
use super::{ExecutionOutcome, QueryExecutor, Stopwatch};

const USER_HEADER: &str = "X-Trino-User";
const SOURCE_HEADER: &str = "X-Trino-Source";
const CATALOG_HEADER: &str = "X-Trino-Catalog";
const SCHEMA_HEADER: &str = "X-Trino-Schema";
const SESSION_HEADER: &str = "X-Trino-Session";
const SOURCE: &str = "dwbench";

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_TLS_PORT: u16 = 8443;

/// Pause before re-polling a page the coordinator was too busy to serve.
const BUSY_PAUSE: Duration = Duration::from_millis(100);

pub struct TrinoConnector {
    settings: ConnectionSettings,
}

impl TrinoConnector {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Connector for TrinoConnector {
    async fn establish(
        &self,
        warehouse: &WarehouseConfig,
        schema: &str,
    ) -> Result<Box<dyn QueryExecutor>, BenchError> {
        let executor = TrinoExecutor::connect(warehouse, schema, &self.settings).await?;
        Ok(Box::new(executor))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResults {
    id: String,
    #[serde(default)]
    next_uri: Option<String>,
    #[serde(default)]
    data: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    error: Option<QueryFailure>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryFailure {
    message: String,
    #[serde(default)]
    error_name: Option<String>,
}

impl QueryFailure {
    fn describe(&self) -> String {
        match &self.error_name {
            Some(name) => format!("{name}: {}", self.message),
            None => self.message.clone(),
        }
    }
}

pub struct TrinoExecutor {
    name: String,
    client: Client,
    base_url: String,
    user: String,
    password: Option<String>,
    catalog: String,
    default_schema: String,
    session: Option<String>,
    in_flight: InFlight,
    closed: bool,
}

impl TrinoExecutor {
    /// Builds the HTTP client and checks the coordinator answers `/v1/info`
    /// within the connection timeout.
    pub async fn connect(
        warehouse: &WarehouseConfig,
        schema: &str,
        settings: &ConnectionSettings,
    ) -> Result<Self, BenchError> {
        let conn = &warehouse.connection;

        let client = settings.http_client()?;

        let (scheme, default_port) = if conn.use_tls {
            ("https", DEFAULT_TLS_PORT)
        } else {
            ("http", DEFAULT_PORT)
        };
        let base_url = format!(
            "{scheme}://{}:{}",
            conn.host,
            conn.port.unwrap_or(default_port)
        );

        let session = (!conn.properties.is_empty()).then(|| {
            conn.properties
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(",")
        });

        let executor = Self {
            name: warehouse.name.clone(),
            client,
            base_url,
            user: conn.username.clone(),
            password: conn.password.clone().filter(|p| !p.is_empty()),
            catalog: conn.database.clone(),
            default_schema: schema.to_string(),
            session,
            in_flight: InFlight::default(),
            closed: false,
        };
        executor.ping(settings.connection_timeout).await?;

        debug!("{}: connected to {}", executor.name, executor.base_url);
        Ok(executor)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn ping(&self, timeout: Duration) -> Result<(), BenchError> {
        let url = format!("{}/v1/info", self.base_url);
        let resp = self
            .authorize(self.client.get(&url))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| BenchError::ConnectError(format!("{url}: {e}")))?;

        if !resp.status().is_success() {
            return Err(BenchError::ConnectError(format!(
                "{url} answered {}",
                resp.status()
            )));
        }
        Ok(())
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder
            .header(USER_HEADER, &self.user)
            .header(SOURCE_HEADER, SOURCE);
        match &self.password {
            Some(password) => builder.basic_auth(&self.user, Some(password)),
            None => builder,
        }
    }

    async fn run_statement(&self, sql: &str, schema: &str) -> Result<u64, String> {
        let _cancel = self.in_flight.guard();
        let mut request = self
            .authorize(self.client.post(format!("{}/v1/statement", self.base_url)))
            .header(CATALOG_HEADER, &self.catalog)
            .header(SCHEMA_HEADER, schema)
            .body(sql.to_string());
        if let Some(session) = &self.session {
            request = request.header(SESSION_HEADER, session);
        }

        let resp = request.send().await.map_err(|e| e.to_string())?;
        let mut page = read_page(resp).await?;
        let query_id = page.id.clone();
        let mut rows = 0u64;
        loop {
            if let Some(failure) = &page.error {
                self.in_flight.finish();
                return Err(failure.describe());
            }
            rows += page.data.as_ref().map_or(0, |data| data.len() as u64);
            match page.next_uri.take() {
                Some(next) => {
                    self.in_flight
                        .track(query_id.as_str(), self.authorize(self.client.delete(&next)));
                    page = self.poll(&next, &query_id).await?;
                }
                None => {
                    self.in_flight.finish();
                    return Ok(rows);
                }
            }
        }
    }

    async fn poll(&self, uri: &str, query_id: &str) -> Result<QueryResults, String> {
        loop {
            let resp = self
                .authorize(self.client.get(uri))
                .send()
                .await
                .map_err(|e| e.to_string())?;

            if matches!(
                resp.status(),
                StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
            ) {
                debug!("{}: query {query_id} busy ({}), polling again", self.name, resp.status());
                tokio::time::sleep(BUSY_PAUSE).await;
                continue;
            }
            return read_page(resp).await;
        }
    }
}

async fn read_page(resp: Response) -> Result<QueryResults, String> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(format!("HTTP {status}: {}", body.trim()));
    }
    resp.json::<QueryResults>()
        .await
        .map_err(|e| format!("decoding response: {e}"))
}

#[async_trait]
impl QueryExecutor for TrinoExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&mut self, sql: &str, schema: &str) -> Result<ExecutionOutcome, BenchError> {
        if self.closed {
            return Err(BenchError::QueryError(format!("{}: executor is closed", self.name)));
        }
        let schema = if schema.is_empty() { self.default_schema.as_str() } else { schema };

        let stopwatch = Stopwatch::start();
        let outcome = match self.run_statement(sql, schema).await {
            Ok(rows) => stopwatch.succeeded(rows),
            Err(message) => stopwatch.failed(message),
        };
        Ok(outcome)
    }

    async fn close(&mut self) -> Result<(), BenchError> {
        self.closed = true;
        self.in_flight.settle().await;
        debug!("{}: session to {} closed", self.name, self.base_url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_first_page() {
        let body = r#"{
            "id": "20240101_000000_00001_abcde",
            "infoUri": "http://trino/ui/query.html?20240101_000000_00001_abcde",
            "nextUri": "http://trino/v1/statement/queued/20240101_000000_00001_abcde/y/1",
            "stats": {"state": "QUEUED"}
        }"#;
        let page: QueryResults = serde_json::from_str(body).unwrap();
        assert!(page.next_uri.is_some());
        assert!(page.data.is_none());
        assert!(page.error.is_none());
    }

    #[test]
    fn test_decode_failure() {
        let body = r#"{
            "id": "q",
            "error": {"message": "line 1:8: Column 'x' cannot be resolved", "errorName": "COLUMN_NOT_FOUND", "errorCode": 47}
        }"#;
        let page: QueryResults = serde_json::from_str(body).unwrap();
        assert_eq!(
            page.error.unwrap().describe(),
            "COLUMN_NOT_FOUND: line 1:8: Column 'x' cannot be resolved"
        );
    }

    #[test]
    fn test_decode_data_rows() {
        let body = r#"{"id": "q", "data": [[1, "a"], [2, "b"]]}"#;
        let page: QueryResults = serde_json::from_str(body).unwrap();
        assert_eq!(page.data.unwrap().len(), 2);
        assert!(page.next_uri.is_none());
    }
}
