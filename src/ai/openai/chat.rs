use super::client::OpenAiHttpClient;
use super::types::{ChatCompletionRequest, ChatMessage};
use crate::ai::PromptService;
use crate::settings::Settings;
use crate::{prompts, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Writes image prompts through an OpenAI-compatible chat endpoint.
pub struct OpenAiPromptClient {
    http: OpenAiHttpClient,
    model: String,
}

impl OpenAiPromptClient {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self::new_with_client(api_key, base_url, model, reqwest::Client::new())
    }

    pub fn new_with_client(
        api_key: String,
        base_url: String,
        model: String,
        client: reqwest::Client,
    ) -> Self {
        Self {
            http: OpenAiHttpClient::new_with_client(
                api_key,
                base_url,
                Duration::from_secs(60),
                client,
            ),
            model,
        }
    }

    pub fn from_settings(settings: &Settings, client: reqwest::Client) -> Self {
        let mut prompt_client = Self::new_with_client(
            settings.openai_api_key.clone(),
            settings.openai_base_path.clone(),
            settings.llm_model.clone(),
            client,
        );
        prompt_client.http = prompt_client
            .http
            .with_attribution(settings.site_url.clone(), settings.app_name.clone());
        prompt_client
    }
}

#[async_trait]
impl PromptService for OpenAiPromptClient {
    async fn synthesize(&self, document_text: &str) -> Result<String> {
        tracing::debug!(
            "Requesting image prompt from {} ({} chars of note text)",
            self.model,
            document_text.len()
        );

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(prompts::PROMPT_SYSTEM),
                ChatMessage::user(prompts::render(
                    prompts::PROMPT_USER,
                    &[("content", document_text)],
                )),
            ],
        };

        let response = self.http.chat_completion(request).await?;

        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }
}
