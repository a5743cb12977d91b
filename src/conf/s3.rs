use serde::{Deserialize, Serialize};

use crate::core::BenchError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct S3Config {
    #[serde(default)]
    pub enabled: bool,
    /// `host:port` or a full URL.
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub use_ssl: bool,
    #[serde(default)]
    pub bucket: String,
    #[serde(default = "S3Config::default_region")]
    pub region: String,
    #[serde(default)]
    pub prefix: String,
}

impl S3Config {
    pub fn default_region() -> String {
        String::from("us-east-1")
    }

    pub fn validate(&self) -> Result<(), BenchError> {
        let required = [
            ("endpoint", &self.endpoint),
            ("access_key", &self.access_key),
            ("secret_key", &self.secret_key),
            ("bucket", &self.bucket),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(BenchError::ConfigParsingError(format!(
                    "s3: {field} is not set"
                )));
            }
        }
        Ok(())
    }

    pub fn endpoint_url(&self) -> String {
        if self.endpoint.contains("://") {
            return self.endpoint.clone();
        }
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{scheme}://{}", self.endpoint)
    }
}
