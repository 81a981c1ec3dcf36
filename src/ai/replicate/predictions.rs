use super::client::ReplicateHttpClient;
use super::types::CreatePredictionRequest;
use crate::ai::GenerationService;
use crate::models::{GenerationRequest, JobStatus};
use crate::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// [`GenerationService`] backed by Replicate predictions.
pub struct ReplicateGenerationClient {
    http: ReplicateHttpClient,
    poll_interval: Duration,
    max_wait: Duration,
}

impl ReplicateGenerationClient {
    pub fn new(api_token: String, max_wait: Duration) -> Self {
        Self::new_with_client(api_token, max_wait, reqwest::Client::new())
    }

    pub fn new_with_client(api_token: String, max_wait: Duration, client: reqwest::Client) -> Self {
        Self {
            http: ReplicateHttpClient::new_with_client(api_token, Duration::from_secs(30), client),
            poll_interval: POLL_INTERVAL,
            max_wait,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.http = self.http.with_base_url(base_url);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn poll(&self, job_id: &str, cancel: &CancellationToken) -> Result<Vec<String>> {
        let mut polls: u64 = 0;
        loop {
            let prediction = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                prediction = self.http.get_prediction(job_id) => prediction?,
            };
            polls += 1;

            match prediction.status {
                JobStatus::Succeeded => {
                    let urls = prediction
                        .output
                        .map(|output| output.into_urls())
                        .unwrap_or_default();
                    info!(
                        "Prediction {} succeeded after {} polls with {} output(s)",
                        job_id,
                        polls,
                        urls.len()
                    );
                    return Ok(urls);
                }
                JobStatus::Failed | JobStatus::Canceled => {
                    let reason = prediction
                        .error
                        .map(|e| match e {
                            serde_json::Value::String(text) => text,
                            other => other.to_string(),
                        })
                        .unwrap_or_else(|| "no error detail".to_string());
                    warn!("Prediction {} ended as {:?}: {}", job_id, prediction.status, reason);
                    return Err(Error::Generation(format!(
                        "Image generation failed ({:?}): {}",
                        prediction.status, reason
                    )));
                }
                status => debug!("Prediction {} still {:?} (poll {})", job_id, status, polls),
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

#[async_trait]
impl GenerationService for ReplicateGenerationClient {
    async fn submit(&self, request: &GenerationRequest) -> Result<String> {
        debug!(
            "Submitting prediction (model {}, {} output(s), {} steps, {})",
            request.model, request.num_outputs, request.inference_steps, request.output_format
        );

        let prediction = self
            .http
            .create_prediction(&CreatePredictionRequest::from(request))
            .await?;

        info!("Created prediction {}", prediction.id);
        Ok(prediction.id)
    }

    async fn await_completion(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        tokio::time::timeout(self.max_wait, self.poll(job_id, cancel))
            .await
            .map_err(|_| {
                warn!("Prediction {} did not finish within {:?}", job_id, self.max_wait);
                Error::Timeout(self.max_wait)
            })?
    }
}
