use serde::{Deserialize, Serialize};
use shared::InferenceResult;

pub const MAX_ANNOTATION_CHARS: usize = 500;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AnnotationError {
    #[error("Validation note must not be empty")]
    Empty,
    #[error("Validation note is longer than {MAX_ANNOTATION_CHARS} characters")]
    TooLong,
    #[error("There is no result to validate yet")]
    NoResult,
}

/// Manual validation a clinician attaches to a model result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorAnnotation(String);

impl DoctorAnnotation {
    pub fn parse(raw: &str) -> Result<Self, AnnotationError> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(AnnotationError::Empty);
        }
        if value.chars().count() > MAX_ANNOTATION_CHARS {
            return Err(AnnotationError::TooLong);
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Everything the result and validation pages need, carried by the session
/// cookie between requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub result: Option<InferenceResult>,
    pub image_url: Option<String>,
    pub doctor_annotation: Option<DoctorAnnotation>,
}

impl SessionState {
    /// Replaces the previous analysis; an earlier annotation no longer applies.
    pub fn record_result(&mut self, result: InferenceResult, image_url: String) {
        self.result = Some(result);
        self.image_url = Some(image_url);
        self.doctor_annotation = None;
    }

    pub fn annotate(&mut self, annotation: DoctorAnnotation) -> Result<(), AnnotationError> {
        if self.result.is_none() {
            return Err(AnnotationError::NoResult);
        }
        self.doctor_annotation = Some(annotation);
        Ok(())
    }

    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub state: SessionState,
    pub exp: usize,
    pub iat: usize,
}
