use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseType {
    Trino,
    Impala,
    Vertica,
    Hive,
    Spark,
}

impl fmt::Display for WarehouseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WarehouseType::Trino => "trino",
            WarehouseType::Impala => "impala",
            WarehouseType::Vertica => "vertica",
            WarehouseType::Hive => "hive",
            WarehouseType::Spark => "spark",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Catalog for Trino, database for the others.
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default)]
    pub zk_quorum: Option<String>,
    #[serde(default)]
    pub zk_namespace: Option<String>,
    /// Session properties applied to every connection.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WarehouseConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: WarehouseType,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub table_type: Option<String>,
    #[serde(default)]
    pub storage_location: Option<String>,
    #[serde(default)]
    pub connection: ConnectionConfig,
}

impl WarehouseConfig {
    /// Schema this warehouse keeps the benchmark tables in. Tables on S3 get
    /// `_s3`, iceberg tables get `_iceberg`, in that order.
    pub fn schema_name(&self, base_schema: &str) -> String {
        let mut schema = base_schema.to_string();
        if self.storage_location.as_deref() == Some("s3") {
            schema.push_str("_s3");
        }
        if self.table_type.as_deref() == Some("iceberg") {
            schema.push_str("_iceberg");
        }
        schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn warehouse(table_type: Option<&str>, storage_location: Option<&str>) -> WarehouseConfig {
        WarehouseConfig {
            name: "wh".to_string(),
            kind: WarehouseType::Trino,
            enabled: true,
            table_type: table_type.map(String::from),
            storage_location: storage_location.map(String::from),
            connection: ConnectionConfig::default(),
        }
    }

    #[rstest]
    #[case::plain(None, None, "tpcds")]
    #[case::iceberg(Some("iceberg"), None, "tpcds_iceberg")]
    #[case::s3(None, Some("s3"), "tpcds_s3")]
    #[case::s3_iceberg(Some("iceberg"), Some("s3"), "tpcds_s3_iceberg")]
    #[case::other_values(Some("hive"), Some("hdfs"), "tpcds")]
    fn test_schema_name(
        #[case] table_type: Option<&str>,
        #[case] storage_location: Option<&str>,
        #[case] expected: &str,
    ) {
        assert_eq!(
            warehouse(table_type, storage_location).schema_name("tpcds"),
            expected
        );
    }

    #[test]
    fn test_schema_name_is_stable() {
        let wh = warehouse(Some("iceberg"), Some("s3"));
        let first = wh.schema_name("base");
        assert_eq!(first, wh.schema_name("base"));
        assert_eq!(wh, warehouse(Some("iceberg"), Some("s3")));
    }

    #[test]
    fn test_type_display_matches_serde_name() {
        for kind in [
            WarehouseType::Trino,
            WarehouseType::Impala,
            WarehouseType::Vertica,
            WarehouseType::Hive,
            WarehouseType::Spark,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
    }
}
