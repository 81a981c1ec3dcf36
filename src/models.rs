//! Data models and structures
//!
//! Defines the generation parameters a user can pick in the dialog, the
//! request handed to the image-generation service and the mirrored remote
//! job status.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MIN_OUTPUTS: u32 = 1;
pub const MAX_OUTPUTS: u32 = 4;
pub const INFERENCE_STEP: u32 = 4;
pub const MAX_INFERENCE_STEPS: u32 = 48;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    #[default]
    Dev,
    Schnell,
}

impl ModelVariant {
    pub const ALL: [ModelVariant; 2] = [ModelVariant::Dev, ModelVariant::Schnell];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Schnell => "schnell",
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|variant| variant.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::invalid_field("model", format!("'{}' is not dev or schnell", s)))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    #[default]
    Webp,
    Jpg,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [OutputFormat::Png, OutputFormat::Webp, OutputFormat::Jpg];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Jpg => "jpg",
        }
    }

    /// File extension used for persisted assets.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                Error::invalid_field("output format", format!("'{}' is not png, webp or jpg", s))
            })
    }
}

/// Inference step choices offered to the user: 4, 8, ..., 48.
pub fn inference_step_choices() -> impl Iterator<Item = u32> {
    (1..=MAX_INFERENCE_STEPS / INFERENCE_STEP).map(|i| i * INFERENCE_STEP)
}

pub fn validate_num_outputs(value: u32) -> Result<u32> {
    if (MIN_OUTPUTS..=MAX_OUTPUTS).contains(&value) {
        Ok(value)
    } else {
        Err(Error::invalid_field(
            "number of outputs",
            format!("{} is outside {}-{}", value, MIN_OUTPUTS, MAX_OUTPUTS),
        ))
    }
}

pub fn validate_inference_steps(value: u32) -> Result<u32> {
    if inference_step_choices().any(|choice| choice == value) {
        Ok(value)
    } else {
        Err(Error::invalid_field(
            "inference steps",
            format!(
                "{} is not a multiple of {} between {} and {}",
                value, INFERENCE_STEP, INFERENCE_STEP, MAX_INFERENCE_STEPS
            ),
        ))
    }
}

/// Fully populated parameters for one image-generation job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub version: String,
    pub model: ModelVariant,
    pub num_outputs: u32,
    pub inference_steps: u32,
    pub output_format: OutputFormat,
    pub prompt: String,
}

/// Remote job state as reported by the prediction API.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    /// Any status string this client does not know; treated as still running.
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_variant_parsing() {
        assert_eq!("dev".parse::<ModelVariant>().unwrap(), ModelVariant::Dev);
        assert_eq!(" Schnell ".parse::<ModelVariant>().unwrap(), ModelVariant::Schnell);

        let err = "pro".parse::<ModelVariant>().unwrap_err();
        assert!(matches!(err, Error::InvalidField { .. }));
    }

    #[test]
    fn test_output_format_serialization() {
        let json = serde_json::to_string(&OutputFormat::Webp).unwrap();
        assert_eq!(json, "\"webp\"");
        assert_eq!("JPG".parse::<OutputFormat>().unwrap(), OutputFormat::Jpg);
        assert!("gif".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_inference_step_choices() {
        let choices: Vec<u32> = inference_step_choices().collect();
        assert_eq!(choices.len(), 12);
        assert_eq!(choices.first(), Some(&4));
        assert_eq!(choices.last(), Some(&48));

        assert!(validate_inference_steps(24).is_ok());
        assert!(validate_inference_steps(0).is_err());
        assert!(validate_inference_steps(10).is_err());
        assert!(validate_inference_steps(52).is_err());
    }

    #[test]
    fn test_num_outputs_bounds() {
        assert!(validate_num_outputs(1).is_ok());
        assert!(validate_num_outputs(4).is_ok());
        assert!(validate_num_outputs(0).is_err());
        assert!(validate_num_outputs(5).is_err());
    }

    #[test]
    fn test_job_status_unknown_is_not_terminal() {
        let status: JobStatus = serde_json::from_str("\"queued\"").unwrap();
        assert_eq!(status, JobStatus::Unknown);
        assert!(!status.is_terminal());

        let status: JobStatus = serde_json::from_str("\"succeeded\"").unwrap();
        assert!(status.is_terminal());
    }
}
