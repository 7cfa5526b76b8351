use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::imaging::preprocess::PreprocessedTensor;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Inference request timed out")]
    Timeout,
    #[error("Inference request failed: {0}")]
    Http(reqwest::Error),
    #[error("Inference endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Malformed inference response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for InferenceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            InferenceError::Timeout
        } else {
            InferenceError::Http(err)
        }
    }
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    instances: &'a PreprocessedTensor,
}

#[derive(Deserialize)]
struct PredictResponse {
    predictions: Vec<Vec<f64>>,
}

/// Client for the remote model's `:predict` endpoint.
#[derive(Clone)]
pub struct InferenceClient {
    http_client: HttpClient,
    endpoint_url: String,
}

impl InferenceClient {
    pub fn new(http_client: HttpClient, endpoint_url: String) -> Self {
        Self {
            http_client,
            endpoint_url,
        }
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    /// Sends the tensor and returns the model's confidence for the positive
    /// class, `predictions[0][0]`.
    pub async fn predict(
        &self,
        tensor: &PreprocessedTensor,
        token: &str,
    ) -> Result<f32, InferenceError> {
        let response = self
            .http_client
            .post(&self.endpoint_url)
            .bearer_auth(token)
            .json(&PredictRequest { instances: tensor })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            log::error!("Inference endpoint responded with {}: {}", status, body);
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_confidence(&body)
    }
}

fn parse_confidence(body: &str) -> Result<f32, InferenceError> {
    let parsed: PredictResponse = serde_json::from_str(body)
        .map_err(|e| InferenceError::MalformedResponse(e.to_string()))?;

    let confidence = parsed
        .predictions
        .first()
        .and_then(|row| row.first())
        .copied()
        .ok_or_else(|| InferenceError::MalformedResponse("empty predictions".to_string()))?;

    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(InferenceError::MalformedResponse(format!(
            "confidence {} outside [0, 1]",
            confidence
        )));
    }

    Ok(confidence as f32)
}
