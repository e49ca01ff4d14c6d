use serde::{Deserialize, Serialize};
use std::env;

/// Default bucket holding both archive namespaces.
pub const DEFAULT_BUCKET: &str = "faa-cifp-data";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    /// Static credentials; the default AWS provider chain is used when unset
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub path_style: bool,
    /// Base URL used to build object locators
    pub public_url: Option<String>,
}

impl StorageConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            endpoint: env::var("S3_ENDPOINT").ok(),
            region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            bucket: env::var("S3_BUCKET").unwrap_or_else(|_| DEFAULT_BUCKET.to_string()),
            access_key: env::var("S3_ACCESS_KEY").ok(),
            secret_key: env::var("S3_SECRET_KEY").ok(),
            path_style: env::var("S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            public_url: env::var("S3_PUBLIC_URL").ok(),
        };

        if config.access_key.is_some() != config.secret_key.is_some() {
            anyhow::bail!("S3_ACCESS_KEY and S3_SECRET_KEY must be set together");
        }

        Ok(config)
    }

    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: "us-east-1".to_string(),
            bucket: bucket.into(),
            access_key: Some("minioadmin".to_string()),
            secret_key: Some("minioadmin".to_string()),
            path_style: true,
            public_url: None,
        }
    }

    /// Locator recorded for an object: `<public_url>/<bucket>/<key>` when a
    /// public URL is configured, otherwise `s3://<bucket>/<key>`.
    pub fn locator(&self, bucket: &str, key: &str) -> String {
        match &self.public_url {
            Some(base) => format!("{}/{}/{}", base.trim_end_matches('/'), bucket, key),
            None => format!("s3://{}/{}", bucket, key),
        }
    }
}
