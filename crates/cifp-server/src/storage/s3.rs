use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{BehaviorVersion, Credentials, Region},
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
    Client,
};
use tracing::{debug, info, warn};

use super::{config::StorageConfig, ObjectSink, ObjectWriter};

/// Size of one multipart upload part (S3 requires at least 5 MiB for all
/// parts but the last).
pub const PART_SIZE: usize = 8 * 1024 * 1024;

#[derive(Clone)]
pub struct S3ObjectSink {
    client: Client,
    config: StorageConfig,
}

impl S3ObjectSink {
    pub async fn new(config: StorageConfig) -> Result<Self> {
        debug!("Initializing storage with config: {:?}", config.endpoint);

        let mut s3_config_builder = match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                let credentials =
                    Credentials::new(access_key, secret_key, None, None, "cifp-storage");
                aws_sdk_s3::Config::builder()
                    .behavior_version(BehaviorVersion::latest())
                    .credentials_provider(credentials)
                    .region(Region::new(config.region.clone()))
            },
            _ => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(config.region.clone()))
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            },
        };

        s3_config_builder = s3_config_builder.force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!("Storage client initialized for bucket: {}", config.bucket);

        Ok(Self { client, config })
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }
}

#[async_trait]
impl ObjectSink for S3ObjectSink {
    async fn open_writer(&self, bucket: &str, name: &str) -> Result<Box<dyn ObjectWriter>> {
        debug!("Opening writer for s3://{}/{}", bucket, name);
        Ok(Box::new(S3ObjectWriter::new(self.client.clone(), bucket, name)))
    }

    fn locator(&self, bucket: &str, name: &str) -> String {
        self.config.locator(bucket, name)
    }
}

/// Buffers one part at a time; small objects are sent with a single
/// `PutObject` on close, larger ones as a multipart upload started lazily.
pub struct S3ObjectWriter {
    client: Client,
    bucket: String,
    key: String,
    buffer: Vec<u8>,
    upload_id: Option<String>,
    parts: Vec<CompletedPart>,
    finished: bool,
}

impl S3ObjectWriter {
    fn new(client: Client, bucket: &str, key: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            key: key.to_string(),
            buffer: Vec::new(),
            upload_id: None,
            parts: Vec::new(),
            finished: false,
        }
    }

    async fn ensure_upload(&mut self) -> Result<String> {
        if let Some(id) = &self.upload_id {
            return Ok(id.clone());
        }

        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .send()
            .await
            .context("Failed to start multipart upload")?;

        let id = output
            .upload_id()
            .ok_or_else(|| anyhow!("S3 returned no upload id for {}", self.key))?
            .to_string();

        debug!(upload_id = %id, "Started multipart upload for s3://{}/{}", self.bucket, self.key);
        self.upload_id = Some(id.clone());
        Ok(id)
    }

    async fn upload_part(&mut self, data: Vec<u8>) -> Result<()> {
        let upload_id = self.ensure_upload().await?;
        let part_number = i32::try_from(self.parts.len() + 1).context("Too many parts")?;

        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .with_context(|| format!("Failed to upload part {}", part_number))?;

        self.parts.push(
            CompletedPart::builder()
                .set_e_tag(output.e_tag().map(str::to_string))
                .part_number(part_number)
                .build(),
        );

        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let Some(upload_id) = self.upload_id.clone() else {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&self.key)
                .body(ByteStream::from(std::mem::take(&mut self.buffer)))
                .send()
                .await
                .context("Failed to upload to S3")?;
            return Ok(());
        };

        if !self.buffer.is_empty() {
            let last = std::mem::take(&mut self.buffer);
            self.upload_part(last).await?;
        }

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(std::mem::take(&mut self.parts)))
                    .build(),
            )
            .send()
            .await
            .context("Failed to complete multipart upload")?;

        Ok(())
    }
}

async fn abort_upload(client: &Client, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
    client
        .abort_multipart_upload()
        .bucket(bucket)
        .key(key)
        .upload_id(upload_id)
        .send()
        .await
        .context("Failed to abort multipart upload")?;
    Ok(())
}

#[async_trait]
impl ObjectWriter for S3ObjectWriter {
    async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(chunk);

        while self.buffer.len() >= PART_SIZE {
            let rest = self.buffer.split_off(PART_SIZE);
            let part = std::mem::replace(&mut self.buffer, rest);
            self.upload_part(part).await?;
        }

        Ok(())
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        let result = self.commit().await;

        if result.is_err() {
            if let Some(upload_id) = self.upload_id.take() {
                if let Err(e) = abort_upload(&self.client, &self.bucket, &self.key, &upload_id).await {
                    warn!(error = %e, "Abort after failed commit also failed");
                }
            }
        }

        self.finished = true;
        result?;

        info!("Committed s3://{}/{}", self.bucket, self.key);
        Ok(())
    }

    async fn abort(mut self: Box<Self>) -> Result<()> {
        self.finished = true;
        self.buffer.clear();

        match self.upload_id.take() {
            Some(upload_id) => {
                debug!("Aborting multipart upload for s3://{}/{}", self.bucket, self.key);
                abort_upload(&self.client, &self.bucket, &self.key, &upload_id).await
            },
            None => Ok(()),
        }
    }
}

impl Drop for S3ObjectWriter {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let Some(upload_id) = self.upload_id.take() else {
            return;
        };

        let client = self.client.clone();
        let bucket = std::mem::take(&mut self.bucket);
        let key = std::mem::take(&mut self.key);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = abort_upload(&client, &bucket, &key, &upload_id).await {
                        warn!(error = %e, "Failed to abort abandoned upload for s3://{}/{}", bucket, key);
                    }
                });
            },
            Err(_) => {
                warn!(upload_id = %upload_id, "No runtime to abort abandoned upload for s3://{}/{}", bucket, key);
            },
        }
    }
}
