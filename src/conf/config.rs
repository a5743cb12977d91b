use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config as CConfig, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::{
    conf::{S3Config, WarehouseConfig},
    core::BenchError::{self, ConfigParsingError},
};

const ENV_PREFIX: &str = "DWBENCH";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub warehouses: Vec<WarehouseConfig>,
    #[serde(default)]
    pub schema: String,
    #[serde(default)]
    pub queries_path: PathBuf,
    #[serde(default)]
    pub results_path: PathBuf,
    /// Upper bound for a single query execution.
    #[serde(with = "humantime_serde", default = "Config::default_timeout")]
    pub timeout: Duration,
    /// Upper bound for one connection attempt, retries not included.
    #[serde(
        with = "humantime_serde",
        default = "Config::default_connection_timeout"
    )]
    pub connection_timeout: Duration,
    #[serde(default)]
    pub cert_path: Option<PathBuf>,
    #[serde(default = "Config::default_runs")]
    pub runs: u32,
    #[serde(default = "Config::default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "Config::default_connection_retries")]
    pub connection_retries: u32,
    #[serde(with = "humantime_serde", default = "Config::default_retry_delay")]
    pub retry_delay: Duration,
    #[serde(default, rename = "s3_config")]
    pub s3: Option<S3Config>,
}

impl Config {
    fn default_timeout() -> Duration {
        Duration::from_secs(5 * 60)
    }

    fn default_connection_timeout() -> Duration {
        Duration::from_secs(30)
    }

    fn default_runs() -> u32 {
        1
    }

    fn default_concurrency() -> usize {
        1
    }

    fn default_connection_retries() -> u32 {
        3
    }

    fn default_retry_delay() -> Duration {
        Duration::from_secs(5)
    }

    pub fn from_str(contents: &str, format: FileFormat) -> Result<Config, BenchError> {
        let config = CConfig::builder()
            .add_source(File::from_str(contents, format))
            .build()
            .map_err(|e| ConfigParsingError(e.to_string()))?
            .try_deserialize::<Config>()
            .map_err(|e| ConfigParsingError(e.to_string()))?;
        config.validate()
    }

    /// Loads a config file (format picked by extension) and applies
    /// `DWBENCH_*` environment overrides on top of it.
    pub fn load(path: &Path) -> Result<Config, BenchError> {
        if !path.is_file() {
            return Err(ConfigParsingError(format!(
                "config file {} not found",
                path.display()
            )));
        }
        let config = CConfig::builder()
            .add_source(File::from(path).required(true))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Config>()?;
        config.validate()
    }

    /// Rejects incomplete configs and raises out-of-range knobs to their defaults.
    pub fn validate(mut self) -> Result<Config, BenchError> {
        if self.warehouses.is_empty() {
            return Err(ConfigParsingError("no warehouses configured".into()));
        }
        if self.schema.is_empty() {
            return Err(ConfigParsingError("schema is not set".into()));
        }
        if self.queries_path.as_os_str().is_empty() {
            return Err(ConfigParsingError("queries_path is not set".into()));
        }
        if self.results_path.as_os_str().is_empty() {
            return Err(ConfigParsingError("results_path is not set".into()));
        }
        if let Some(s3) = self.s3.as_ref().filter(|s3| s3.enabled) {
            s3.validate()?;
        }

        if self.runs < 1 {
            self.runs = Self::default_runs();
        }
        if self.concurrency < 1 {
            self.concurrency = Self::default_concurrency();
        }
        if self.connection_retries < 1 {
            self.connection_retries = Self::default_connection_retries();
        }
        if self.retry_delay.is_zero() {
            self.retry_delay = Self::default_retry_delay();
        }
        if self
            .cert_path
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            self.cert_path = None;
        }

        Ok(self)
    }

    pub fn enabled_warehouses(&self) -> impl Iterator<Item = &WarehouseConfig> {
        self.warehouses.iter().filter(|w| w.enabled)
    }

    /// S3 settings, only when the upload is switched on.
    pub fn upload_target(&self) -> Option<&S3Config> {
        self.s3.as_ref().filter(|s3| s3.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::WarehouseType;

    const MINIMAL: &str = r#"
schema: tpcds_100
queries_path: queries
results_path: results
warehouses:
  - name: trino-prod
    type: trino
    enabled: true
    table_type: iceberg
    connection:
      host: trino.local
      port: 8443
      username: bench
      database: hive
      use_tls: true
      properties:
        query_max_run_time: 10m
"#;

    #[test]
    fn load_minimal_yaml_applies_defaults() {
        let conf = Config::from_str(MINIMAL, FileFormat::Yaml).unwrap();
        assert_eq!(conf.schema, "tpcds_100");
        assert_eq!(conf.runs, 1);
        assert_eq!(conf.concurrency, 1);
        assert_eq!(conf.connection_retries, 3);
        assert_eq!(conf.retry_delay, Duration::from_secs(5));
        assert_eq!(conf.timeout, Duration::from_secs(300));
        assert_eq!(conf.cert_path, None);
        assert!(conf.s3.is_none());

        let wh = &conf.warehouses[0];
        assert_eq!(wh.kind, WarehouseType::Trino);
        assert_eq!(wh.connection.port, Some(8443));
        assert!(wh.connection.use_tls);
        assert_eq!(
            wh.connection.properties.get("query_max_run_time"),
            Some(&"10m".to_string())
        );
        assert_eq!(wh.schema_name(&conf.schema), "tpcds_100_iceberg");
    }

    #[test]
    fn load_durations_and_knobs() {
        let yaml = format!(
            "{MINIMAL}\ntimeout: 90s\nconnection_timeout: 2s\nretry_delay: 250ms\nruns: 3\nconcurrency: 4\nconnection_retries: 5\n"
        );
        let conf = Config::from_str(&yaml, FileFormat::Yaml).unwrap();
        assert_eq!(conf.timeout, Duration::from_secs(90));
        assert_eq!(conf.connection_timeout, Duration::from_secs(2));
        assert_eq!(conf.retry_delay, Duration::from_millis(250));
        assert_eq!(conf.runs, 3);
        assert_eq!(conf.concurrency, 4);
        assert_eq!(conf.connection_retries, 5);
    }

    #[test]
    fn zero_knobs_are_raised_to_defaults() {
        let yaml = format!("{MINIMAL}\nruns: 0\nconcurrency: 0\nconnection_retries: 0\n");
        let conf = Config::from_str(&yaml, FileFormat::Yaml).unwrap();
        assert_eq!(conf.runs, 1);
        assert_eq!(conf.concurrency, 1);
        assert_eq!(conf.connection_retries, 3);
    }

    #[test]
    fn missing_schema_is_rejected() {
        let yaml = MINIMAL.replace("schema: tpcds_100\n", "");
        let err = Config::from_str(&yaml, FileFormat::Yaml).unwrap_err();
        assert_eq!(err, ConfigParsingError("schema is not set".into()));
    }

    #[test]
    fn no_warehouses_is_rejected() {
        let yaml = "schema: s\nqueries_path: q\nresults_path: r\n";
        let err = Config::from_str(yaml, FileFormat::Yaml).unwrap_err();
        assert_eq!(err, ConfigParsingError("no warehouses configured".into()));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let yaml = format!("{MINIMAL}\nparallelism: 3\n");
        assert!(Config::from_str(&yaml, FileFormat::Yaml).is_err());
    }

    #[test]
    fn unknown_warehouse_type_is_rejected() {
        let yaml = MINIMAL.replace("type: trino", "type: oracle");
        assert!(Config::from_str(&yaml, FileFormat::Yaml).is_err());
    }

    #[test]
    fn enabled_s3_requires_bucket() {
        let yaml = format!(
            "{MINIMAL}\ns3_config:\n  enabled: true\n  endpoint: minio:9000\n  access_key: a\n  secret_key: b\n"
        );
        let err = Config::from_str(&yaml, FileFormat::Yaml).unwrap_err();
        assert_eq!(err, ConfigParsingError("s3: bucket is not set".into()));
    }

    #[test]
    fn disabled_s3_is_not_validated() {
        let yaml = format!("{MINIMAL}\ns3_config:\n  enabled: false\n");
        let conf = Config::from_str(&yaml, FileFormat::Yaml).unwrap();
        assert!(conf.upload_target().is_none());
    }

    #[test]
    fn enabled_warehouses_skips_disabled() {
        let yaml = format!(
            "{MINIMAL}  - name: vertica-old\n    type: vertica\n    enabled: false\n"
        );
        let conf = Config::from_str(&yaml, FileFormat::Yaml).unwrap();
        assert_eq!(conf.warehouses.len(), 2);
        let names: Vec<_> = conf.enabled_warehouses().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["trino-prod"]);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, MINIMAL).unwrap();
        let conf = Config::load(&path).unwrap();
        assert_eq!(conf.warehouses[0].name, "trino-prod");
    }

    #[test]
    fn load_missing_file_errors() {
        let err = Config::load(Path::new("/nonexistent/config.yaml")).unwrap_err();
        assert!(matches!(err, ConfigParsingError(_)));
    }
}
