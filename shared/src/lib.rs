use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Confidence strictly above this value is read as pneumonia.
pub const PNEUMONIA_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum Diagnosis {
    Pneumonia,
    Normal,
}

impl Diagnosis {
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence > PNEUMONIA_THRESHOLD {
            Diagnosis::Pneumonia
        } else {
            Diagnosis::Normal
        }
    }

    pub fn explanation(&self) -> &'static str {
        match self {
            Diagnosis::Pneumonia => {
                "The model detected signs of pneumonia in the chest X-ray. \
                 Pneumonia can be caused by bacterial infection such as Streptococcus pneumoniae \
                 or by viruses such as influenza and COVID-19. Findings on the radiograph may include \
                 infiltrates, consolidation or localized opacities. \
                 Please consult a doctor promptly for appropriate medical care."
            }
            Diagnosis::Normal => {
                "The model found no prominent signs of pneumonia in the chest X-ray. \
                 The lungs appear clear and free of acute infection. \
                 Still seek a medical examination if you have any health complaints."
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct InferenceResult {
    pub confidence: f32,
    pub label: Diagnosis,
    pub explanation: String,
}

impl InferenceResult {
    pub fn from_confidence(confidence: f32) -> Self {
        let label = Diagnosis::from_confidence(confidence);
        Self {
            confidence,
            label,
            explanation: label.explanation().to_string(),
        }
    }
}
