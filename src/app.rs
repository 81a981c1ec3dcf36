//! Application orchestration for generating images into a note.

use crate::ai::{GenerationService, OpenAiPromptClient, PromptService, ReplicateGenerationClient};
use crate::dialog::{DialogDriver, DialogOutcome, GenerationDialog};
use crate::document::Document;
use crate::models::{GenerationRequest, OutputFormat};
use crate::settings::Settings;
use crate::storage::{AssetBatch, AssetPersister, VaultStorage};
use crate::ui::{BusyGuard, Notifier};
use crate::{Error, Result};
use futures::future::join_all;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const GENERATING_LABEL: &str = "Generating image...";
pub const FAILURE_NOTICE: &str =
    "Failed to generate or save image. Please check your settings and try again.";
pub const FOLDER_FAILURE_NOTICE: &str =
    "Failed to create output folder. Please check your settings.";

/// Wires the dialog, generation client and asset persister together.
pub struct App {
    settings: Settings,
    prompt: Arc<dyn PromptService>,
    generator: Box<dyn GenerationService>,
    assets: Box<dyn AssetPersister>,
    notifier: Arc<dyn Notifier>,
    in_flight: AtomicBool,
}

/// Injectable service bundle used to construct [`App`] in tests/harnesses.
pub struct AppServices {
    pub prompt: Arc<dyn PromptService>,
    pub generator: Box<dyn GenerationService>,
    pub assets: Box<dyn AssetPersister>,
    pub notifier: Arc<dyn Notifier>,
}

/// How one user trigger ended.
#[derive(Debug)]
pub enum TriggerOutcome {
    /// References to these vault paths were inserted, in output order.
    Inserted { paths: Vec<String> },
    Cancelled,
    /// Another generation was still running.
    Busy,
    Failed(Error),
}

/// Releases the single-request slot however a generation ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl App {
    /// Build an app from concrete service dependencies.
    ///
    /// This is primarily useful for integration tests and local harnesses that
    /// need to inject mocks.
    pub fn with_services(services: AppServices, settings: Settings) -> Self {
        Self {
            settings,
            prompt: services.prompt,
            generator: services.generator,
            assets: services.assets,
            notifier: services.notifier,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Construct the production app for a vault.
    ///
    /// The output folder is created eagerly; failing to do so is reported but
    /// does not stop startup.
    pub fn new(vault_root: &Path, settings: Settings, notifier: Arc<dyn Notifier>) -> Self {
        // Reuse one HTTP connection pool across provider clients.
        let http_client = reqwest::Client::new();

        let storage = VaultStorage::new_with_client(
            vault_root.to_path_buf(),
            &settings.output_folder,
            http_client.clone(),
        );
        prepare_output_folder(&storage, notifier.as_ref());

        info!("Prompt model: {} via {}", settings.llm_model, settings.openai_base_path);
        let prompt = Arc::new(OpenAiPromptClient::from_settings(&settings, http_client.clone()));
        let generator = Box::new(ReplicateGenerationClient::new_with_client(
            settings.replicate_api_token.clone(),
            Duration::from_secs(settings.poll_timeout_secs),
            http_client,
        ));

        Self::with_services(
            AppServices {
                prompt,
                generator,
                assets: Box::new(storage),
                notifier,
            },
            settings,
        )
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run the whole flow for the active note: dialog, generation, insertion.
    pub async fn handle_user_trigger(
        &self,
        document: &mut dyn Document,
        driver: &mut dyn DialogDriver,
        cancel: &CancellationToken,
    ) -> TriggerOutcome {
        let dialog = GenerationDialog::new(
            &self.settings,
            document.content(),
            self.prompt.clone(),
            self.notifier.clone(),
        );

        let request = match driver.drive(&dialog).await {
            Ok(DialogOutcome::Confirmed(request)) => request,
            Ok(DialogOutcome::Cancelled) => {
                info!("Generation dialog cancelled");
                return TriggerOutcome::Cancelled;
            }
            Err(e) => {
                error!("Generation dialog failed: {}", e);
                self.notifier.notice(&format!("Invalid generation settings: {}", e));
                return TriggerOutcome::Failed(e);
            }
        };

        self.generate_image(&request, document, cancel).await
    }

    /// Generate, persist and insert images for a confirmed request.
    ///
    /// The note is only modified when every asset was saved.
    pub async fn generate_image(
        &self,
        request: &GenerationRequest,
        document: &mut dyn Document,
        cancel: &CancellationToken,
    ) -> TriggerOutcome {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            warn!("Ignoring trigger: an image is already being generated");
            self.notifier.notice("An image is already being generated.");
            return TriggerOutcome::Busy;
        }
        let _slot = InFlight(&self.in_flight);
        let _busy = BusyGuard::acquire(self.notifier.clone(), GENERATING_LABEL);

        match self.run_generation(request, document, cancel).await {
            Ok(paths) => {
                if !paths.is_empty() {
                    self.notifier.notice(&format!(
                        "Successfully saved {} image(s) to {}",
                        paths.len(),
                        self.assets.output_folder()
                    ));
                }
                TriggerOutcome::Inserted { paths }
            }
            Err(e) => {
                error!("Error generating image: {}", e);
                self.notifier.notice(FAILURE_NOTICE);
                TriggerOutcome::Failed(e)
            }
        }
    }

    async fn run_generation(
        &self,
        request: &GenerationRequest,
        document: &mut dyn Document,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let job_id = self.generator.submit(request).await?;
        let urls = self.generator.await_completion(&job_id, cancel).await?;
        if urls.is_empty() {
            warn!("Prediction {} succeeded without outputs", job_id);
            return Ok(Vec::new());
        }

        let paths = self.persist_all(&urls, request.output_format).await?;

        if let Err(e) = document.insert_at_cursor(&image_markdown(&paths)).await {
            self.discard_all(&paths).await;
            return Err(e);
        }
        info!("Inserted {} image reference(s)", paths.len());
        Ok(paths)
    }

    /// Download every output concurrently; all-or-nothing.
    async fn persist_all(&self, urls: &[String], format: OutputFormat) -> Result<Vec<String>> {
        let batch = AssetBatch::new(format);
        let results = join_all(
            urls.iter()
                .enumerate()
                .map(|(index, url)| self.assets.persist(url, index, &batch)),
        )
        .await;

        let mut paths = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(path) => paths.push(path),
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(e) => warn!("Additional asset failure: {}", e),
            }
        }

        if let Some(e) = first_error {
            self.discard_all(&paths).await;
            return Err(e);
        }
        Ok(paths)
    }

    async fn discard_all(&self, paths: &[String]) {
        for path in paths {
            if let Err(e) = self.assets.discard(path).await {
                warn!("Failed to remove partially saved asset {}: {}", path, e);
            }
        }
    }
}

/// Create the output folder, or log and notify when that fails.
///
/// Returns whether the folder is usable. Callers carry on either way.
pub fn prepare_output_folder(storage: &VaultStorage, notifier: &dyn Notifier) -> bool {
    match storage.ensure_output_folder() {
        Ok(_) => true,
        Err(e) => {
            error!("Failed to create output folder: {}", e);
            notifier.notice(FOLDER_FAILURE_NOTICE);
            false
        }
    }
}

/// One Markdown image reference per path, in the given order.
pub fn image_markdown(paths: &[String]) -> String {
    paths
        .iter()
        .map(|path| format!("![Generated Image]({})\n", path))
        .collect()
}
