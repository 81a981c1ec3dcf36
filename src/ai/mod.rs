//! AI service integration for prompt and image generation
//!
//! Provides interfaces to an OpenAI-compatible chat-completion API for
//! writing image prompts and to Replicate's prediction API for generating
//! the images themselves.

pub mod mock;
pub mod openai;
pub mod replicate;

pub use mock::{MockGenerationClient, MockPromptClient};
pub use openai::OpenAiPromptClient;
pub use replicate::ReplicateGenerationClient;

use crate::models::GenerationRequest;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use tokio_util::sync::CancellationToken;

/// Writes an image prompt from the text of a note.
#[async_trait]
pub trait PromptService: Send + Sync {
    async fn synthesize(&self, document_text: &str) -> Result<String>;
}

/// Submits image-generation jobs and waits for their outputs.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Create a remote job and return its id.
    async fn submit(&self, request: &GenerationRequest) -> Result<String>;

    /// Poll a job until it is terminal; returns the output URLs in remote order.
    async fn await_completion(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>>;
}

/// Turn a non-2xx response into the matching error kind.
///
/// Rejected credentials surface as [`Error::Configuration`]; every other
/// failure is a [`Error::Generation`].
pub(crate) async fn check_status(response: Response, provider: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response.text().await.unwrap_or_default();
    tracing::error!("{} API error (status {}): {}", provider, status, error_text);

    let message = format!("{} API error (status {}): {}", provider, status, error_text);
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Err(Error::Configuration(message))
    } else {
        Err(Error::Generation(message))
    }
}

pub(crate) fn request_failed(provider: &str, err: reqwest::Error) -> Error {
    tracing::error!("Failed to send request to {}: {}", provider, err);
    Error::Generation(format!("{} request failed: {}", provider, err))
}
