//! Replicate prediction payloads.

use crate::models::{GenerationRequest, JobStatus, ModelVariant, OutputFormat};
use serde::{Deserialize, Serialize};

pub const LORA_SCALE: u32 = 1;
pub const ASPECT_RATIO: &str = "16:9";
pub const GUIDANCE_SCALE: f64 = 3.5;
pub const OUTPUT_QUALITY: u32 = 100;

/// Body of `POST /v1/predictions`.
#[derive(Debug, Serialize)]
pub struct CreatePredictionRequest {
    pub version: String,
    pub input: PredictionInput,
}

#[derive(Debug, Serialize)]
pub struct PredictionInput {
    pub model: ModelVariant,
    pub prompt: String,
    pub lora_scale: u32,
    pub num_outputs: u32,
    pub aspect_ratio: &'static str,
    pub output_format: OutputFormat,
    pub guidance_scale: f64,
    pub output_quality: u32,
    pub num_inference_steps: u32,
}

impl From<&GenerationRequest> for CreatePredictionRequest {
    fn from(request: &GenerationRequest) -> Self {
        Self {
            version: request.version.clone(),
            input: PredictionInput {
                model: request.model,
                prompt: request.prompt.clone(),
                lora_scale: LORA_SCALE,
                num_outputs: request.num_outputs,
                aspect_ratio: ASPECT_RATIO,
                output_format: request.output_format,
                guidance_scale: GUIDANCE_SCALE,
                output_quality: OUTPUT_QUALITY,
                num_inference_steps: request.inference_steps,
            },
        }
    }
}

/// Prediction object returned by both create and get.
#[derive(Debug, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub output: Option<PredictionOutput>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

/// Some models return a single URL instead of a list.
///
/// Variant order matters for `#[serde(untagged)]` decoding.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PredictionOutput {
    Many(Vec<String>),
    One(String),
}

impl PredictionOutput {
    pub fn into_urls(self) -> Vec<String> {
        match self {
            Self::Many(urls) => urls,
            Self::One(url) => vec![url],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_request_has_fixed_input_shape() {
        let request = GenerationRequest {
            version: "v1".to_string(),
            model: ModelVariant::Dev,
            num_outputs: 2,
            inference_steps: 24,
            output_format: OutputFormat::Webp,
            prompt: "a lake at sunset, warm colors".to_string(),
        };

        let body = serde_json::to_value(CreatePredictionRequest::from(&request)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "version": "v1",
                "input": {
                    "model": "dev",
                    "prompt": "a lake at sunset, warm colors",
                    "lora_scale": 1,
                    "num_outputs": 2,
                    "aspect_ratio": "16:9",
                    "output_format": "webp",
                    "guidance_scale": 3.5,
                    "output_quality": 100,
                    "num_inference_steps": 24
                }
            })
        );
    }

    #[test]
    fn test_prediction_output_accepts_single_url() {
        let prediction: Prediction = serde_json::from_value(serde_json::json!({
            "id": "abc",
            "status": "succeeded",
            "output": "https://replicate.delivery/out.webp"
        }))
        .unwrap();

        let urls = prediction.output.unwrap().into_urls();
        assert_eq!(urls, vec!["https://replicate.delivery/out.webp".to_string()]);
    }
}
