pub mod service;
pub mod upload;

use actix_web::http::StatusCode;

use crate::auth::AuthError;
use crate::imaging::DecodeError;
use crate::inference::InferenceError;
use crate::storage::StorageError;
use upload::UploadError;

pub use service::{Analysis, DiagnosisService, ServiceInitError};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("Image rejected by the {gate} gate")]
    GateRejection { gate: &'static str },
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),
    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Image worker failed: {0}")]
    Worker(String),
}

pub const MSG_NO_FILE: &str = "No file was selected. Please choose a chest X-ray image.";
pub const MSG_TOO_LARGE: &str = "The file is too large. Please upload a smaller image.";
pub const MSG_BAD_UPLOAD: &str = "The upload could not be read. Please try again.";
pub const MSG_UNREADABLE: &str =
    "The uploaded file could not be processed. Make sure it is a chest X-ray image in a supported format.";
pub const MSG_NOT_XRAY: &str =
    "The image was not detected as an X-ray. Please upload a chest X-ray image.";
pub const MSG_FAILED: &str =
    "Something went wrong while analyzing the image. Please try again later.";

impl PipelineError {
    /// Text shown on the upload page.
    pub fn user_message(&self) -> &'static str {
        match self {
            PipelineError::Upload(UploadError::MissingFile) => MSG_NO_FILE,
            PipelineError::Upload(UploadError::TooLarge { .. }) => MSG_TOO_LARGE,
            PipelineError::Upload(_) => MSG_BAD_UPLOAD,
            PipelineError::Decode(_) => MSG_UNREADABLE,
            PipelineError::GateRejection { .. } => MSG_NOT_XRAY,
            PipelineError::Auth(_)
            | PipelineError::Inference(_)
            | PipelineError::Storage(_)
            | PipelineError::Worker(_) => MSG_FAILED,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::Upload(UploadError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            PipelineError::Upload(UploadError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            PipelineError::Upload(_) => StatusCode::BAD_REQUEST,
            PipelineError::Decode(_) | PipelineError::GateRejection { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            PipelineError::Auth(_) | PipelineError::Inference(_) => StatusCode::BAD_GATEWAY,
            PipelineError::Storage(_) | PipelineError::Worker(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Business-rule rejections caused by the user's input rather than a fault.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            PipelineError::Upload(UploadError::MissingFile)
                | PipelineError::Upload(UploadError::TooLarge { .. })
                | PipelineError::Decode(_)
                | PipelineError::GateRejection { .. }
        )
    }
}
