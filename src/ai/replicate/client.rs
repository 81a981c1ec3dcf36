use super::types::{CreatePredictionRequest, Prediction};
use crate::ai::{check_status, request_failed};
use crate::{Error, Result};
use reqwest::{Client, RequestBuilder};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.replicate.com";
const PROVIDER: &str = "Replicate";

/// Thin REST client for Replicate's prediction endpoints.
pub struct ReplicateHttpClient {
    client: Client,
    api_token: String,
    base_url: String,
    timeout: Duration,
}

impl ReplicateHttpClient {
    pub fn new_with_client(api_token: String, timeout: Duration, client: Client) -> Self {
        Self {
            client,
            api_token,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Prediction> {
        let response = builder
            .timeout(self.timeout)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| request_failed(PROVIDER, e))?;
        let response = check_status(response, PROVIDER).await?;

        let body = response.text().await.map_err(|e| request_failed(PROVIDER, e))?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse Replicate response: {}\nBody: {}", e, body);
            Error::Generation(format!("Failed to parse Replicate response: {}", e))
        })
    }

    pub async fn create_prediction(&self, request: &CreatePredictionRequest) -> Result<Prediction> {
        let url = format!("{}/v1/predictions", self.base_url);
        self.send(self.client.post(&url).json(request)).await
    }

    pub async fn get_prediction(&self, id: &str) -> Result<Prediction> {
        let url = format!("{}/v1/predictions/{}", self.base_url, id);
        self.send(self.client.get(&url)).await
    }
}
