//! Generation dialog
//!
//! Holds the editable generation parameters for one trigger and the optional
//! prompt synthesis. Rendering is left to a [`DialogDriver`]: a preset driver
//! for non-interactive use and a line-based terminal driver.

use crate::ai::PromptService;
use crate::models::{
    validate_inference_steps, validate_num_outputs, GenerationRequest, ModelVariant, OutputFormat,
};
use crate::settings::Settings;
use crate::ui::{BusyGuard, Notifier};
use crate::Result;
use async_trait::async_trait;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::{debug, error, warn};

pub const PROMPT_FAILED_NOTICE: &str =
    "Failed to generate prompt. Please try again or enter manually.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogOutcome {
    Confirmed(GenerationRequest),
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisOutcome {
    Filled,
    /// Another synthesis was still running; nothing was requested.
    AlreadyRunning,
    Failed,
}

pub struct GenerationDialog {
    fields: Mutex<GenerationRequest>,
    document_text: String,
    auto_prompt: bool,
    prompt_service: Arc<dyn PromptService>,
    notifier: Arc<dyn Notifier>,
    synthesizing: AtomicBool,
}

/// Clears the in-progress flag however synthesis ends.
struct SynthesisFlag<'a>(&'a AtomicBool);

impl Drop for SynthesisFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl GenerationDialog {
    /// Open a dialog seeded with the configured defaults and an empty prompt.
    pub fn new(
        settings: &Settings,
        document_text: String,
        prompt_service: Arc<dyn PromptService>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            fields: Mutex::new(GenerationRequest {
                version: settings.default_version.clone(),
                model: settings.default_model,
                num_outputs: settings.default_num_outputs,
                inference_steps: settings.default_inference_steps,
                output_format: settings.default_output_format,
                prompt: String::new(),
            }),
            document_text,
            auto_prompt: settings.use_auto_prompt,
            prompt_service,
            notifier,
            synthesizing: AtomicBool::new(false),
        }
    }

    /// Snapshot of the current field values.
    pub fn fields(&self) -> GenerationRequest {
        self.lock_fields().clone()
    }

    pub fn auto_prompt_enabled(&self) -> bool {
        self.auto_prompt
    }

    pub fn is_synthesizing(&self) -> bool {
        self.synthesizing.load(Ordering::Acquire)
    }

    fn lock_fields(&self) -> std::sync::MutexGuard<'_, GenerationRequest> {
        // Every update is a single assignment, so a poisoned lock still holds valid fields.
        self.fields
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_version(&self, version: &str) {
        self.lock_fields().version = version.to_string();
    }

    pub fn set_model(&self, model: ModelVariant) {
        self.lock_fields().model = model;
    }

    pub fn set_num_outputs(&self, num_outputs: u32) -> Result<()> {
        self.lock_fields().num_outputs = validate_num_outputs(num_outputs)?;
        Ok(())
    }

    pub fn set_inference_steps(&self, steps: u32) -> Result<()> {
        self.lock_fields().inference_steps = validate_inference_steps(steps)?;
        Ok(())
    }

    pub fn set_output_format(&self, format: OutputFormat) {
        self.lock_fields().output_format = format;
    }

    pub fn set_prompt(&self, prompt: &str) {
        self.lock_fields().prompt = prompt.to_string();
    }

    /// Fill the prompt field from the note text.
    ///
    /// Re-triggering while a synthesis is pending is a no-op. Failures are
    /// reported through a notice and leave the dialog usable.
    pub async fn generate_prompt(&self) -> SynthesisOutcome {
        if self.synthesizing.swap(true, Ordering::AcqRel) {
            debug!("Prompt synthesis already running, ignoring trigger");
            return SynthesisOutcome::AlreadyRunning;
        }
        let _flag = SynthesisFlag(&self.synthesizing);
        let _busy = BusyGuard::acquire(self.notifier.clone(), "Generating prompt...");

        match self.prompt_service.synthesize(&self.document_text).await {
            Ok(prompt) => {
                self.set_prompt(&prompt);
                SynthesisOutcome::Filled
            }
            Err(e) => {
                error!("Error generating prompt: {}", e);
                self.notifier.notice(PROMPT_FAILED_NOTICE);
                SynthesisOutcome::Failed
            }
        }
    }

    pub fn confirm(&self) -> DialogOutcome {
        let request = self.fields();
        if request.prompt.trim().is_empty() {
            warn!("Confirming generation with an empty prompt");
        }
        DialogOutcome::Confirmed(request)
    }

    pub fn cancel(&self) -> DialogOutcome {
        DialogOutcome::Cancelled
    }
}

/// Renders a [`GenerationDialog`] and decides how it closes.
#[async_trait]
pub trait DialogDriver: Send {
    async fn drive(&mut self, dialog: &GenerationDialog) -> Result<DialogOutcome>;
}

/// Values supplied up front, e.g. from command-line flags.
#[derive(Debug, Clone, Default)]
pub struct DialogOverrides {
    pub version: Option<String>,
    pub model: Option<ModelVariant>,
    pub num_outputs: Option<u32>,
    pub inference_steps: Option<u32>,
    pub output_format: Option<OutputFormat>,
    pub prompt: Option<String>,
    /// Synthesize a prompt even when auto-prompt is off in the settings.
    pub auto_prompt: bool,
}

impl DialogOverrides {
    pub fn apply(&self, dialog: &GenerationDialog) -> Result<()> {
        if let Some(version) = &self.version {
            dialog.set_version(version);
        }
        if let Some(model) = self.model {
            dialog.set_model(model);
        }
        if let Some(num_outputs) = self.num_outputs {
            dialog.set_num_outputs(num_outputs)?;
        }
        if let Some(steps) = self.inference_steps {
            dialog.set_inference_steps(steps)?;
        }
        if let Some(format) = self.output_format {
            dialog.set_output_format(format);
        }
        if let Some(prompt) = &self.prompt {
            dialog.set_prompt(prompt);
        }
        Ok(())
    }

    fn wants_synthesis(&self, dialog: &GenerationDialog) -> bool {
        self.prompt.is_none() && (self.auto_prompt || dialog.auto_prompt_enabled())
    }
}

/// Non-interactive driver: applies overrides and confirms (or cancels).
pub struct PresetDialog {
    overrides: DialogOverrides,
    confirm: bool,
}

impl PresetDialog {
    pub fn confirming(overrides: DialogOverrides) -> Self {
        Self {
            overrides,
            confirm: true,
        }
    }

    pub fn cancelling() -> Self {
        Self {
            overrides: DialogOverrides::default(),
            confirm: false,
        }
    }
}

#[async_trait]
impl DialogDriver for PresetDialog {
    async fn drive(&mut self, dialog: &GenerationDialog) -> Result<DialogOutcome> {
        if !self.confirm {
            return Ok(dialog.cancel());
        }

        self.overrides.apply(dialog)?;
        if self.overrides.wants_synthesis(dialog)
            && dialog.generate_prompt().await == SynthesisOutcome::Failed
        {
            // Nobody is there to type a prompt by hand.
            return Ok(dialog.cancel());
        }
        Ok(dialog.confirm())
    }
}

/// Line-based dialog on a reader/writer pair (stdin/stdout in the CLI).
pub struct TerminalDialog<R, W> {
    lines: Lines<R>,
    out: W,
    overrides: DialogOverrides,
}

impl<R, W> TerminalDialog<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: Write + Send,
{
    pub fn new(reader: R, out: W, overrides: DialogOverrides) -> Self {
        Self {
            lines: reader.lines(),
            out,
            overrides,
        }
    }

    async fn ask(&mut self, question: &str) -> Result<Option<String>> {
        write!(self.out, "{}", question)?;
        self.out.flush()?;
        Ok(self.lines.next_line().await?.map(|line| line.trim().to_string()))
    }

    fn show_fields(&mut self, dialog: &GenerationDialog) -> Result<()> {
        let fields = dialog.fields();
        writeln!(self.out, "Generate Image")?;
        writeln!(self.out, "  Version:          {}", fields.version)?;
        writeln!(self.out, "  Model:            {}", fields.model)?;
        writeln!(self.out, "  Outputs:          {}", fields.num_outputs)?;
        writeln!(self.out, "  Inference steps:  {}", fields.inference_steps)?;
        writeln!(self.out, "  Output format:    {}", fields.output_format)?;
        Ok(())
    }
}

#[async_trait]
impl<R, W> DialogDriver for TerminalDialog<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: Write + Send,
{
    async fn drive(&mut self, dialog: &GenerationDialog) -> Result<DialogOutcome> {
        self.overrides.apply(dialog)?;
        self.show_fields(dialog)?;

        let mut ask_prompt = self.overrides.prompt.is_none();
        if ask_prompt && self.overrides.wants_synthesis(dialog) {
            ask_prompt = dialog.generate_prompt().await != SynthesisOutcome::Filled;
        }
        if ask_prompt {
            let Some(answer) = self
                .ask("Image prompt (leave empty to generate one from the note): ")
                .await?
            else {
                return Ok(dialog.cancel());
            };
            if answer.is_empty() {
                dialog.generate_prompt().await;
            } else {
                dialog.set_prompt(&answer);
            }
        }

        writeln!(self.out, "  Prompt:           {}", dialog.fields().prompt)?;
        let answer = self.ask("Generate image? [Y/n] ").await?;
        match answer.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("" | "y" | "yes") => Ok(dialog.confirm()),
            _ => Ok(dialog.cancel()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockPromptClient;
    use crate::ui::RecordingNotifier;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn dialog_with(prompt: MockPromptClient, notifier: RecordingNotifier) -> GenerationDialog {
        GenerationDialog::new(
            &Settings::default(),
            "The sun sets over a quiet lake.".to_string(),
            Arc::new(prompt),
            Arc::new(notifier),
        )
    }

    #[test]
    fn test_dialog_is_seeded_with_defaults() {
        let dialog = dialog_with(MockPromptClient::new(), RecordingNotifier::new());
        let fields = dialog.fields();

        assert_eq!(fields.model, ModelVariant::Dev);
        assert_eq!(fields.num_outputs, 1);
        assert_eq!(fields.inference_steps, 24);
        assert_eq!(fields.output_format, OutputFormat::Webp);
        assert_eq!(fields.version, Settings::default().default_version);
        assert_eq!(fields.prompt, "");
    }

    #[test]
    fn test_setters_validate_ranges() {
        let dialog = dialog_with(MockPromptClient::new(), RecordingNotifier::new());

        assert!(dialog.set_num_outputs(4).is_ok());
        assert!(dialog.set_num_outputs(5).is_err());
        assert!(dialog.set_inference_steps(48).is_ok());
        assert!(dialog.set_inference_steps(30).is_err());

        let fields = dialog.fields();
        assert_eq!(fields.num_outputs, 4);
        assert_eq!(fields.inference_steps, 48);
    }

    #[tokio::test]
    async fn test_generate_prompt_fills_field() {
        let prompt = MockPromptClient::new().with_prompt_response("a lake at dusk".to_string());
        let notifier = RecordingNotifier::new();
        let dialog = dialog_with(prompt, notifier.clone());

        assert_eq!(dialog.generate_prompt().await, SynthesisOutcome::Filled);
        assert_eq!(dialog.fields().prompt, "a lake at dusk");
        assert!(!dialog.is_synthesizing());
        assert_eq!(notifier.busy_depth(), 0);
    }

    #[tokio::test]
    async fn test_second_trigger_while_pending_is_noop() {
        let prompt = MockPromptClient::new()
            .with_prompt_response("only once".to_string())
            .with_delay(Duration::from_millis(50));
        let calls = prompt.clone();
        let dialog = dialog_with(prompt, RecordingNotifier::new());

        let (first, second) = tokio::join!(dialog.generate_prompt(), dialog.generate_prompt());

        assert_eq!(first, SynthesisOutcome::Filled);
        assert_eq!(second, SynthesisOutcome::AlreadyRunning);
        assert_eq!(calls.get_call_count(), 1);

        // The flag is released once the first call finishes.
        assert_eq!(dialog.generate_prompt().await, SynthesisOutcome::Filled);
        assert_eq!(calls.get_call_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_synthesis_notifies_and_keeps_dialog_usable() {
        let notifier = RecordingNotifier::new();
        let dialog = dialog_with(MockPromptClient::new().with_failure(true), notifier.clone());
        dialog.set_prompt("typed by hand");

        assert_eq!(dialog.generate_prompt().await, SynthesisOutcome::Failed);
        assert_eq!(notifier.get_notices(), vec![PROMPT_FAILED_NOTICE.to_string()]);
        assert_eq!(notifier.busy_depth(), 0);
        assert_eq!(dialog.fields().prompt, "typed by hand");
        assert!(!dialog.is_synthesizing());
    }

    #[tokio::test]
    async fn test_preset_dialog_applies_overrides() {
        let dialog = dialog_with(MockPromptClient::new(), RecordingNotifier::new());
        let mut driver = PresetDialog::confirming(DialogOverrides {
            model: Some(ModelVariant::Schnell),
            num_outputs: Some(2),
            output_format: Some(OutputFormat::Png),
            prompt: Some("a red fox".to_string()),
            ..DialogOverrides::default()
        });

        let outcome = driver.drive(&dialog).await.unwrap();
        let DialogOutcome::Confirmed(request) = outcome else {
            panic!("expected confirmation");
        };
        assert_eq!(request.model, ModelVariant::Schnell);
        assert_eq!(request.num_outputs, 2);
        assert_eq!(request.output_format, OutputFormat::Png);
        assert_eq!(request.prompt, "a red fox");
    }

    #[tokio::test]
    async fn test_preset_dialog_auto_prompt_only_without_explicit_prompt() {
        let prompt = MockPromptClient::new().with_prompt_response("auto".to_string());
        let calls = prompt.clone();
        let dialog = dialog_with(prompt, RecordingNotifier::new());

        let mut driver = PresetDialog::confirming(DialogOverrides {
            auto_prompt: true,
            ..DialogOverrides::default()
        });
        let outcome = driver.drive(&dialog).await.unwrap();
        assert!(matches!(outcome, DialogOutcome::Confirmed(ref r) if r.prompt == "auto"));

        let mut driver = PresetDialog::confirming(DialogOverrides {
            auto_prompt: true,
            prompt: Some("manual".to_string()),
            ..DialogOverrides::default()
        });
        driver.drive(&dialog).await.unwrap();
        assert_eq!(calls.get_call_count(), 1);
    }

    #[tokio::test]
    async fn test_prompt_is_synthesized_only_when_asked_or_toggled() {
        let prompt = MockPromptClient::new().with_prompt_response("auto".to_string());
        let calls = prompt.clone();

        let dialog = dialog_with(prompt.clone(), RecordingNotifier::new());
        let outcome = PresetDialog::confirming(DialogOverrides::default())
            .drive(&dialog)
            .await
            .unwrap();
        assert!(matches!(outcome, DialogOutcome::Confirmed(ref r) if r.prompt.is_empty()));
        assert_eq!(calls.get_call_count(), 0);

        let settings = Settings {
            use_auto_prompt: true,
            ..Settings::default()
        };
        let dialog = GenerationDialog::new(
            &settings,
            "note".to_string(),
            Arc::new(prompt),
            Arc::new(RecordingNotifier::new()),
        );
        let outcome = PresetDialog::confirming(DialogOverrides::default())
            .drive(&dialog)
            .await
            .unwrap();
        assert!(matches!(outcome, DialogOutcome::Confirmed(ref r) if r.prompt == "auto"));
        assert_eq!(calls.get_call_count(), 1);
    }

    #[tokio::test]
    async fn test_cancelling_dialog_emits_nothing() {
        let dialog = dialog_with(MockPromptClient::new(), RecordingNotifier::new());
        let outcome = PresetDialog::cancelling().drive(&dialog).await.unwrap();
        assert_eq!(outcome, DialogOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_terminal_dialog_reads_prompt_and_confirms() {
        let dialog = dialog_with(MockPromptClient::new(), RecordingNotifier::new());
        let input: &[u8] = b"a lake at sunset, warm colors\ny\n";
        let mut out = Vec::new();

        let outcome = TerminalDialog::new(input, &mut out, DialogOverrides::default())
            .drive(&dialog)
            .await
            .unwrap();

        let DialogOutcome::Confirmed(request) = outcome else {
            panic!("expected confirmation");
        };
        assert_eq!(request.prompt, "a lake at sunset, warm colors");
        let shown = String::from_utf8(out).unwrap();
        assert!(shown.contains("Model:            dev"));
        assert!(shown.contains("Generate image?"));
    }

    #[tokio::test]
    async fn test_terminal_dialog_empty_prompt_synthesizes_then_declines() {
        let prompt = MockPromptClient::new().with_prompt_response("generated".to_string());
        let calls = prompt.clone();
        let dialog = dialog_with(prompt, RecordingNotifier::new());
        let input: &[u8] = b"\nn\n";
        let mut out = Vec::new();

        let outcome = TerminalDialog::new(input, &mut out, DialogOverrides::default())
            .drive(&dialog)
            .await
            .unwrap();

        assert_eq!(outcome, DialogOutcome::Cancelled);
        assert_eq!(calls.get_call_count(), 1);
        assert!(String::from_utf8(out).unwrap().contains("generated"));
    }
}
