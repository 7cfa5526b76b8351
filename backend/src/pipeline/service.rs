use actix_multipart::Multipart;
use shared::InferenceResult;
use std::sync::Arc;
use std::time::Duration;

use super::PipelineError;
use super::upload::{StagedUpload, StagingConfig, stage_upload};
use crate::auth::{AuthError, CredentialProvider};
use crate::config::AppConfig;
use crate::imaging::decode_file;
use crate::imaging::gate::{self, XrayGate};
use crate::imaging::preprocess::{PreprocessedTensor, TensorPreprocessor};
use crate::inference::InferenceClient;
use crate::storage::{StorageError, StoredUpload, UploadSink};

#[derive(Debug, thiserror::Error)]
pub enum ServiceInitError {
    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to initialise credentials: {0}")]
    Auth(#[from] AuthError),
    #[error("Failed to initialise upload storage: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug)]
pub struct Analysis {
    pub result: InferenceResult,
    pub stored: StoredUpload,
}

/// An upload that passed the gate, with the tensor built from it.
struct PreparedUpload {
    upload: StagedUpload,
    tensor: PreprocessedTensor,
    extension: &'static str,
    detected_content_type: Option<&'static str>,
}

/// Decoding, gating and preprocessing. CPU bound, so it runs on the
/// blocking pool; `upload` is dropped there on failure.
fn prepare(
    gate: &dyn XrayGate,
    preprocessor: &TensorPreprocessor,
    upload: StagedUpload,
) -> Result<PreparedUpload, PipelineError> {
    let decoded = decode_file(upload.path())?;

    if !gate.classify(&decoded.pixels) {
        return Err(PipelineError::GateRejection { gate: gate.name() });
    }

    let tensor = preprocessor.preprocess(&decoded.pixels)?;
    log::debug!(
        "Preprocessed {}x{} image into tensor {:?}",
        decoded.pixels.width(),
        decoded.pixels.height(),
        tensor.shape()
    );

    Ok(PreparedUpload {
        upload,
        tensor,
        extension: decoded.extension(),
        detected_content_type: decoded.format.map(|_| decoded.content_type()),
    })
}

/// Runs an upload through gate, preprocessing, remote inference and storage.
#[derive(Clone)]
pub struct DiagnosisService {
    gate: Arc<dyn XrayGate>,
    preprocessor: TensorPreprocessor,
    credentials: CredentialProvider,
    inference: InferenceClient,
    sink: UploadSink,
    staging: StagingConfig,
}

impl DiagnosisService {
    pub fn new(
        gate: Arc<dyn XrayGate>,
        preprocessor: TensorPreprocessor,
        credentials: CredentialProvider,
        inference: InferenceClient,
        sink: UploadSink,
        staging: StagingConfig,
    ) -> Self {
        Self {
            gate,
            preprocessor,
            credentials,
            inference,
            sink,
            staging,
        }
    }

    pub async fn from_config(config: &AppConfig) -> Result<Self, ServiceInitError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let credentials = CredentialProvider::from_config(&config.credentials, http_client.clone())?;
        let inference = InferenceClient::new(http_client, config.endpoint_url.clone());
        let sink = UploadSink::from_config(&config.storage).await?;
        let gate = gate::from_config(&config.gate);

        log::info!(
            "Diagnosis pipeline: gate={}, input={}x{}, credentials={}, endpoint={}",
            gate.name(),
            config.image_size,
            config.image_size,
            credentials.describe(),
            inference.endpoint_url()
        );

        Ok(Self::new(
            gate,
            TensorPreprocessor::new(config.image_size),
            credentials,
            inference,
            sink,
            StagingConfig {
                temp_dir: config.temp_dir.clone(),
                max_upload_bytes: config.max_upload_bytes,
            },
        ))
    }

    pub fn sink(&self) -> &UploadSink {
        &self.sink
    }

    pub async fn stage(&self, payload: Multipart) -> Result<StagedUpload, PipelineError> {
        let upload = stage_upload(payload, &self.staging).await?;
        log::info!(
            "Received upload {:?} ({} bytes, declared {:?})",
            upload.original_name(),
            upload.size(),
            upload.declared_content_type()
        );
        Ok(upload)
    }

    /// Consumes the staged upload; its temporary file is gone when this
    /// returns, on success and on every error.
    pub async fn analyze(&self, upload: StagedUpload) -> Result<Analysis, PipelineError> {
        let gate = Arc::clone(&self.gate);
        let preprocessor = self.preprocessor.clone();
        let prepared =
            tokio::task::spawn_blocking(move || prepare(gate.as_ref(), &preprocessor, upload))
                .await
                .map_err(|e| PipelineError::Worker(e.to_string()))??;

        let token = self.credentials.token().await?;
        let confidence = self.inference.predict(&prepared.tensor, &token).await?;
        let result = InferenceResult::from_confidence(confidence);
        log::info!(
            "Model verdict {} (confidence {:.4})",
            result.label,
            result.confidence
        );

        let upload = &prepared.upload;
        let content_type = match prepared.detected_content_type {
            Some(detected) => detected,
            None => upload.declared_content_type().unwrap_or("application/octet-stream"),
        };
        let stored = self
            .sink
            .store(
                upload.path(),
                upload.original_name(),
                prepared.extension,
                content_type,
            )
            .await?;

        Ok(Analysis { result, stored })
    }

    /// Removes a stored upload that will never be shown.
    pub async fn discard(&self, stored: &StoredUpload) -> Result<(), StorageError> {
        self.sink.remove(stored).await
    }
}
