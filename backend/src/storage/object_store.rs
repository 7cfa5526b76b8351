use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use std::path::Path;
use uuid::Uuid;

use super::{StorageError, StoredUpload};
use crate::config::StorageConfig;

/// Publicly readable bucket reached over the S3 API.
#[derive(Clone)]
pub struct ObjectStoreSink {
    client: Client,
    bucket_name: String,
    public_base_url: String,
}

impl ObjectStoreSink {
    pub fn new(client: Client, bucket_name: String, public_base_url: String) -> Self {
        Self {
            client,
            bucket_name,
            public_base_url,
        }
    }

    pub async fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        let bucket_name = config
            .bucket
            .clone()
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| StorageError::ObjectStore("no bucket configured".to_string()))?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        // Custom endpoints (GCS interoperability, MinIO) expect path-style addressing.
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.endpoint_url.is_some())
            .build();
        let client = Client::from_conf(s3_config);

        let public_base_url = public_base_url(config, &bucket_name);
        log::info!(
            "Object store sink: bucket {} served from {}",
            bucket_name,
            public_base_url
        );
        Ok(Self::new(client, bucket_name, public_base_url))
    }

    pub fn generate_object_key(file_extension: &str) -> String {
        format!("{}.{}", Uuid::new_v4().simple(), file_extension)
    }

    pub fn public_url(&self, object_key: &str) -> String {
        format!("{}/{}", self.public_base_url.trim_end_matches('/'), object_key)
    }

    pub async fn store(
        &self,
        source: &Path,
        file_extension: &str,
        content_type: &str,
    ) -> Result<StoredUpload, StorageError> {
        let object_key = Self::generate_object_key(file_extension);

        let body = ByteStream::from_path(source)
            .await
            .map_err(|e| StorageError::ObjectStore(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&object_key)
            .body(body)
            .content_type(content_type)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| StorageError::ObjectStore(e.to_string()))?;

        log::info!("Uploaded {} to bucket {}", object_key, self.bucket_name);
        let url = self.public_url(&object_key);
        Ok(StoredUpload {
            key: object_key,
            url,
        })
    }

    pub async fn remove(&self, object_key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(object_key)
            .send()
            .await
            .map_err(|e| StorageError::ObjectStore(e.to_string()))?;

        log::info!("Deleted {} from bucket {}", object_key, self.bucket_name);
        Ok(())
    }
}

fn public_base_url(config: &StorageConfig, bucket_name: &str) -> String {
    if let Some(base) = &config.public_base_url {
        return base.clone();
    }
    match &config.endpoint_url {
        Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), bucket_name),
        None => format!("https://{}.s3.amazonaws.com", bucket_name),
    }
}
