use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{
    Attribute, Attributes, Certificate, ClientOptions, ObjectStore, PutOptions, PutPayload,
};

use crate::conf::S3Config;
use crate::connect::read_certificate_pem;
use crate::core::BenchError;

const CSV_CONTENT_TYPE: &str = "text/csv";

/// Ships the finished result file somewhere outside the host.
#[async_trait]
pub trait ArtifactUploader: Send + Sync {
    async fn upload(&self, path: &Path) -> Result<(), BenchError>;
}

pub struct ObjectStoreUploader {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl ObjectStoreUploader {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// S3 (or any S3-compatible endpoint such as MinIO) from the upload
    /// settings. `cert_path` is the same CA bundle the warehouses are verified
    /// with.
    pub fn from_s3_config(config: &S3Config, cert_path: Option<&Path>) -> Result<Self, BenchError> {
        let endpoint = config.endpoint_url();
        let store = AmazonS3Builder::new()
            .with_client_options(client_options(cert_path)?)
            .with_bucket_name(&config.bucket)
            .with_region(&config.region)
            .with_access_key_id(&config.access_key)
            .with_secret_access_key(&config.secret_key)
            .with_allow_http(endpoint.starts_with("http://"))
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| {
                BenchError::UploadError(format!(
                    "creating S3 client for bucket '{}': {}",
                    config.bucket, e
                ))
            })?;

        Ok(Self::new(Arc::new(store), config.prefix.clone()))
    }

    pub fn object_key(&self, file_name: &str) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{prefix}/{file_name}")
        }
    }
}

fn client_options(cert_path: Option<&Path>) -> Result<ClientOptions, BenchError> {
    let mut options = ClientOptions::new();
    let Some(path) = cert_path else {
        return Ok(options);
    };

    let pem = read_certificate_pem(path)?;
    let certificates = Certificate::from_pem_bundle(&pem).map_err(|e| {
        BenchError::TlsError(format!("parsing certificate {}: {}", path.display(), e))
    })?;
    if certificates.is_empty() {
        return Err(BenchError::TlsError(format!(
            "no certificates in {}",
            path.display()
        )));
    }
    for certificate in certificates {
        options = options.with_root_certificate(certificate);
    }
    Ok(options)
}

#[async_trait]
impl ArtifactUploader for ObjectStoreUploader {
    async fn upload(&self, path: &Path) -> Result<(), BenchError> {
        let file_name = path.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
            BenchError::UploadError(format!("invalid artifact path: {}", path.display()))
        })?;
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| BenchError::UploadError(format!("reading {}: {}", path.display(), e)))?;
        let size = data.len();

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, CSV_CONTENT_TYPE.into());
        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        let location = ObjectPath::from(self.object_key(file_name));
        self.store
            .put_opts(&location, PutPayload::from(data), options)
            .await?;

        info!("uploaded {} ({size} bytes) to {location}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use tempfile::TempDir;

    #[test]
    fn test_object_key_joins_prefix() {
        let store = Arc::new(InMemory::new());
        assert_eq!(
            ObjectStoreUploader::new(store.clone(), "bench/results/").object_key("a.csv"),
            "bench/results/a.csv"
        );
        assert_eq!(ObjectStoreUploader::new(store, "").object_key("a.csv"), "a.csv");
    }

    #[tokio::test]
    async fn test_upload_puts_file_under_prefix() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1_runs.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();

        let store = Arc::new(InMemory::new());
        let uploader = ObjectStoreUploader::new(store.clone(), "results");
        uploader.upload(&path).await.unwrap();

        let stored = store
            .get(&ObjectPath::from("results/1_runs.csv"))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(stored.as_ref(), b"a,b\n1,2\n");
    }

    #[tokio::test]
    async fn test_upload_missing_file_errors() {
        let uploader = ObjectStoreUploader::new(Arc::new(InMemory::new()), "results");
        let err = uploader.upload(Path::new("/nonexistent/r.csv")).await.unwrap_err();
        assert!(matches!(err, BenchError::UploadError(_)));
    }

    #[test]
    fn test_from_s3_config_builds_client() {
        let config = S3Config {
            enabled: true,
            endpoint: "localhost:9000".to_string(),
            access_key: "minio".to_string(),
            secret_key: "minio123".to_string(),
            use_ssl: false,
            bucket: "bench".to_string(),
            region: S3Config::default_region(),
            prefix: "runs".to_string(),
        };
        let uploader = ObjectStoreUploader::from_s3_config(&config, None).unwrap();
        assert_eq!(uploader.object_key("x.csv"), "runs/x.csv");
    }

    #[test]
    fn test_from_s3_config_with_missing_ca_fails() {
        let config = S3Config {
            enabled: true,
            endpoint: "minio.internal:9000".to_string(),
            access_key: "minio".to_string(),
            secret_key: "minio123".to_string(),
            use_ssl: true,
            bucket: "bench".to_string(),
            region: S3Config::default_region(),
            prefix: String::new(),
        };
        let err = ObjectStoreUploader::from_s3_config(&config, Some(Path::new("/nonexistent/ca.pem")))
            .err()
            .unwrap();
        assert!(matches!(err, BenchError::TlsError(msg) if msg.contains("/nonexistent/ca.pem")));
    }

    #[test]
    fn test_ca_file_without_certificates_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ca.pem");
        std::fs::write(&path, "not a certificate\n").unwrap();
        assert!(matches!(client_options(Some(&path)), Err(BenchError::TlsError(_))));
        assert!(client_options(None).is_ok());
    }
}
