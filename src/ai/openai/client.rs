use super::types::{ChatCompletionRequest, ChatCompletionResponse};
use crate::ai::{check_status, request_failed};
use crate::{Error, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

const PROVIDER: &str = "Chat completion";

/// Minimal client for OpenAI-compatible endpoints (OpenAI, OpenRouter, ...).
pub struct OpenAiHttpClient {
    pub(crate) client: Client,
    pub(crate) api_key: String,
    pub(crate) base_url: String,
    timeout: Duration,
    referer: Option<String>,
    title: Option<String>,
}

impl OpenAiHttpClient {
    pub fn new_with_client(
        api_key: String,
        base_url: String,
        timeout: Duration,
        client: Client,
    ) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            referer: None,
            title: None,
        }
    }

    /// Attribution headers OpenRouter uses for its app rankings.
    pub fn with_attribution(mut self, site_url: String, app_name: String) -> Self {
        self.referer = Some(site_url).filter(|s| !s.is_empty());
        self.title = Some(app_name).filter(|s| !s.is_empty());
        self
    }

    pub async fn post<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        path: &str,
        request: &Req,
    ) -> Result<Resp> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .bearer_auth(&self.api_key)
            .json(request);
        if let Some(referer) = &self.referer {
            builder = builder.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.title {
            builder = builder.header("X-Title", title);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| request_failed(PROVIDER, e))?;
        let response = check_status(response, PROVIDER).await?;

        let body = response.text().await.map_err(|e| request_failed(PROVIDER, e))?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse chat response: {}\nBody: {}", e, body);
            Error::Generation(format!("Failed to parse chat response: {}", e))
        })
    }

    pub async fn chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse> {
        self.post("/chat/completions", &request).await
    }
}
