use super::{GenerationService, PromptService};
use crate::models::GenerationRequest;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct MockPromptClient {
    prompt_responses: Arc<Mutex<Vec<String>>>,
    call_count: Arc<Mutex<usize>>,
    delay: Duration,
    should_fail: bool,
}

impl MockPromptClient {
    pub fn new() -> Self {
        Self {
            prompt_responses: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(Mutex::new(0)),
            delay: Duration::ZERO,
            should_fail: false,
        }
    }

    pub fn with_prompt_response(self, response: String) -> Self {
        self.prompt_responses.lock().unwrap().push(response);
        self
    }

    /// Keep each call pending for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_failure(mut self, should_fail: bool) -> Self {
        self.should_fail = should_fail;
        self
    }

    pub fn get_call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

impl Default for MockPromptClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PromptService for MockPromptClient {
    async fn synthesize(&self, document_text: &str) -> Result<String> {
        let count = {
            let mut count = self.call_count.lock().unwrap();
            *count += 1;
            *count
        };

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.should_fail {
            return Err(Error::Generation("Mock prompt failure".to_string()));
        }

        let responses = self.prompt_responses.lock().unwrap();
        if responses.is_empty() {
            Ok(format!("An illustration of: {}", document_text))
        } else {
            Ok(responses[(count - 1) % responses.len()].clone())
        }
    }
}

#[derive(Clone)]
pub struct MockGenerationClient {
    outputs: Arc<Mutex<Vec<String>>>,
    submitted: Arc<Mutex<Vec<GenerationRequest>>>,
    await_count: Arc<Mutex<usize>>,
    fail_job: bool,
    delay: Duration,
}

impl MockGenerationClient {
    pub fn new() -> Self {
        Self {
            outputs: Arc::new(Mutex::new(Vec::new())),
            submitted: Arc::new(Mutex::new(Vec::new())),
            await_count: Arc::new(Mutex::new(0)),
            fail_job: false,
            delay: Duration::ZERO,
        }
    }

    pub fn with_output(self, url: String) -> Self {
        self.outputs.lock().unwrap().push(url);
        self
    }

    /// Make every job end in the remote "failed" state.
    pub fn with_failed_job(mut self, fail_job: bool) -> Self {
        self.fail_job = fail_job;
        self
    }

    /// Keep the job running for `delay` before it reaches a terminal state.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn get_submitted(&self) -> Vec<GenerationRequest> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn get_await_count(&self) -> usize {
        *self.await_count.lock().unwrap()
    }
}

impl Default for MockGenerationClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationService for MockGenerationClient {
    async fn submit(&self, request: &GenerationRequest) -> Result<String> {
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(request.clone());
        Ok(format!("mock-job-{}", submitted.len()))
    }

    async fn await_completion(
        &self,
        _job_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        *self.await_count.lock().unwrap() += 1;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(self.delay) => {}
        }
        if self.fail_job {
            return Err(Error::Generation("Image generation failed".to_string()));
        }
        Ok(self.outputs.lock().unwrap().clone())
    }
}
