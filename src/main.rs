use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use note_image_generator::app::{prepare_output_folder, App, TriggerOutcome};
use note_image_generator::dialog::{DialogDriver, DialogOverrides, PresetDialog, TerminalDialog};
use note_image_generator::document::{CursorPosition, MarkdownNote};
use note_image_generator::models::{ModelVariant, OutputFormat};
use note_image_generator::settings::{SettingsStore, SETTINGS_SCHEMA};
use note_image_generator::storage::VaultStorage;
use note_image_generator::ui::TerminalNotifier;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "note-image-generator")]
#[command(about = "Generate AI images for Markdown notes")]
struct CliArgs {
    /// Vault root; output folders and note paths are relative to it.
    #[arg(long, global = true, default_value = ".")]
    vault: PathBuf,

    /// Settings file (defaults to <vault>/.note-image-generator/settings.json).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate images for a note and insert them at the cursor.
    Generate(GenerateArgs),
    /// Show or change settings.
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Debug, Args)]
struct GenerateArgs {
    /// Note path, relative to the vault.
    #[arg(value_name = "NOTE")]
    note: PathBuf,

    /// One-based cursor position, LINE[:COL]. Defaults to the end of the note.
    #[arg(long, value_name = "LINE[:COL]", value_parser = parse_cursor_arg)]
    cursor: Option<CursorPosition>,

    /// Image prompt; skips prompt synthesis.
    #[arg(long)]
    prompt: Option<String>,

    /// Synthesize the prompt from the note even if disabled in settings.
    #[arg(long)]
    auto_prompt: bool,

    #[arg(long, value_parser = parse_model_arg)]
    model: Option<ModelVariant>,

    /// Replicate model version identifier.
    #[arg(long = "model-version", value_name = "VERSION")]
    model_version: Option<String>,

    /// Number of images (1-4).
    #[arg(long)]
    outputs: Option<u32>,

    /// Inference steps (4-48, multiples of 4).
    #[arg(long)]
    steps: Option<u32>,

    #[arg(long, value_parser = parse_format_arg)]
    format: Option<OutputFormat>,

    /// Confirm without asking.
    #[arg(long, short = 'y')]
    yes: bool,
}

#[derive(Debug, Subcommand)]
enum SettingsCommand {
    /// Print every setting (secrets masked).
    Show,
    /// Set one setting by key, e.g. `outputFolder art/ai`.
    Set { key: String, value: String },
}

fn parse_cursor_arg(input: &str) -> std::result::Result<CursorPosition, String> {
    input
        .parse()
        .map_err(|_| format!("Invalid cursor '{}'. Expected format: LINE[:COL]", input))
}

fn parse_model_arg(input: &str) -> std::result::Result<ModelVariant, String> {
    input.parse().map_err(|e| format!("{}", e))
}

fn parse_format_arg(input: &str) -> std::result::Result<OutputFormat, String> {
    input.parse().map_err(|e| format!("{}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "note_image_generator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = CliArgs::parse();
    let store = match &args.settings {
        Some(path) => SettingsStore::new(path.clone()),
        None => SettingsStore::for_vault(&args.vault),
    };

    match args.command {
        Command::Settings(command) => run_settings(&store, &args.vault, command),
        Command::Generate(generate) => run_generate(&store, args.vault, generate).await,
    }
}

fn run_settings(store: &SettingsStore, vault: &std::path::Path, command: SettingsCommand) -> Result<()> {
    let mut settings = store.load().context("Failed to load settings")?;

    match command {
        SettingsCommand::Show => {
            println!("Settings ({})", store.path().display());
            for field in SETTINGS_SCHEMA {
                println!(
                    "  {:<24} {:<22} {}",
                    field.label,
                    field.key,
                    settings.display_value(field)?
                );
            }
        }
        SettingsCommand::Set { key, value } => {
            settings.set(&key, &value)?;
            store.save(&settings).context("Failed to save settings")?;
            info!("Updated {}", key);

            if key == "outputFolder" {
                let storage = VaultStorage::new(vault.to_path_buf(), &settings.output_folder);
                prepare_output_folder(&storage, &TerminalNotifier);
            }
        }
    }
    Ok(())
}

async fn run_generate(store: &SettingsStore, vault: PathBuf, args: GenerateArgs) -> Result<()> {
    let settings = store
        .load()
        .context("Failed to load settings")?
        .with_env_fallbacks();
    if settings.replicate_api_token.is_empty() {
        warn!("Replicate API token is not set; generation will be rejected");
    }

    let note_path = vault.join(&args.note);
    let mut note = MarkdownNote::open(&note_path, args.cursor)
        .with_context(|| format!("Failed to open note {}", note_path.display()))?;

    let overrides = DialogOverrides {
        version: args.model_version,
        model: args.model,
        num_outputs: args.outputs,
        inference_steps: args.steps,
        output_format: args.format,
        prompt: args.prompt,
        auto_prompt: args.auto_prompt,
    };
    let mut driver: Box<dyn DialogDriver> = if args.yes {
        Box::new(PresetDialog::confirming(overrides))
    } else {
        Box::new(TerminalDialog::new(
            BufReader::new(tokio::io::stdin()),
            std::io::stdout(),
            overrides,
        ))
    };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling generation");
            ctrl_c.cancel();
        }
    });

    let app = App::new(&vault, settings, Arc::new(TerminalNotifier));
    match app
        .handle_user_trigger(&mut note, driver.as_mut(), &cancel)
        .await
    {
        TriggerOutcome::Inserted { paths } => {
            info!("Inserted {} image(s) into {}", paths.len(), note_path.display());
            Ok(())
        }
        TriggerOutcome::Cancelled => {
            info!("Generation cancelled");
            Ok(())
        }
        TriggerOutcome::Busy => Ok(()),
        TriggerOutcome::Failed(e) => {
            error!("Generation failed: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cursor_arg_valid() {
        let parsed = parse_cursor_arg("12:3").unwrap();
        assert_eq!(parsed, CursorPosition { line: 11, ch: 2 });
    }

    #[test]
    fn test_parse_cursor_arg_invalid() {
        let err = parse_cursor_arg("twelve").unwrap_err();
        assert!(err.contains("LINE[:COL]"));
    }

    #[test]
    fn test_parse_model_and_format_args() {
        assert_eq!(parse_model_arg("schnell").unwrap(), ModelVariant::Schnell);
        assert_eq!(parse_format_arg("jpg").unwrap(), OutputFormat::Jpg);
        assert!(parse_format_arg("gif").is_err());
    }

    #[test]
    fn test_cli_parses_generate_flags() {
        let args = CliArgs::try_parse_from([
            "note-image-generator",
            "--vault",
            "/notes",
            "generate",
            "daily.md",
            "--outputs",
            "2",
            "--model-version",
            "abc",
            "--yes",
        ])
        .unwrap();

        assert_eq!(args.vault, PathBuf::from("/notes"));
        let Command::Generate(generate) = args.command else {
            panic!("expected generate");
        };
        assert_eq!(generate.outputs, Some(2));
        assert_eq!(generate.model_version.as_deref(), Some("abc"));
        assert!(generate.yes);
    }
}
