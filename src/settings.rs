//! Persistent user settings
//!
//! Settings are stored as camelCase JSON inside the vault and merged over the
//! built-in defaults on load. Every field is described once in
//! [`SETTINGS_SCHEMA`]; reading and editing fields by key goes through that
//! schema instead of per-field code.

use crate::models::{ModelVariant, OutputFormat};
use crate::storage::write_atomic;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const SETTINGS_DIR: &str = ".note-image-generator";
pub const SETTINGS_FILE: &str = "settings.json";

pub const REPLICATE_TOKEN_ENV: &str = "REPLICATE_API_TOKEN";
pub const LLM_API_KEY_ENV: &str = "OPENROUTER_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub replicate_api_token: String,
    pub openai_api_key: String,
    pub openai_base_path: String,
    pub app_name: String,
    pub site_url: String,
    pub use_auto_prompt: bool,
    pub llm_model: String,
    pub default_version: String,
    pub default_model: ModelVariant,
    pub default_num_outputs: u32,
    pub default_inference_steps: u32,
    pub default_output_format: OutputFormat,
    pub output_folder: String,
    pub poll_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            replicate_api_token: String::new(),
            openai_api_key: String::new(),
            openai_base_path: "https://openrouter.ai/api/v1".to_string(),
            app_name: "Obsidian Image Generator".to_string(),
            site_url: "https://obsidian.md".to_string(),
            use_auto_prompt: false,
            llm_model: "liquid/lfm-40b:free".to_string(),
            default_version: "42799c2b58e0a6ca82d3a1d90f655f6386542e325d2017e3256b092189f567b8"
                .to_string(),
            default_model: ModelVariant::Dev,
            default_num_outputs: 1,
            default_inference_steps: 24,
            default_output_format: OutputFormat::Webp,
            output_folder: "generated-images".to_string(),
            poll_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// Text that is masked when displayed.
    Secret,
    Toggle,
    Choice(&'static [&'static str]),
    Number { min: u64, max: u64, step: u64 },
}

#[derive(Debug, Clone, Copy)]
pub struct SettingField {
    pub key: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub kind: FieldKind,
}

pub const SETTINGS_SCHEMA: &[SettingField] = &[
    SettingField {
        key: "outputFolder",
        label: "Output Folder",
        description: "Folder path where generated images will be saved (relative to vault)",
        kind: FieldKind::Text,
    },
    SettingField {
        key: "replicateApiToken",
        label: "Replicate API Token",
        description: "Token used for the image-generation API",
        kind: FieldKind::Secret,
    },
    SettingField {
        key: "openaiApiKey",
        label: "OpenRouter API Key",
        description: "Key used for prompt generation",
        kind: FieldKind::Secret,
    },
    SettingField {
        key: "openaiBasePath",
        label: "OpenRouter Base Path",
        description: "Base path of the chat-completion API",
        kind: FieldKind::Text,
    },
    SettingField {
        key: "appName",
        label: "App Name",
        description: "App name sent to OpenRouter for rankings",
        kind: FieldKind::Text,
    },
    SettingField {
        key: "siteUrl",
        label: "Site URL",
        description: "Site URL sent to OpenRouter for rankings",
        kind: FieldKind::Text,
    },
    SettingField {
        key: "llmModel",
        label: "LLM Model",
        description: "Model used for prompt generation",
        kind: FieldKind::Text,
    },
    SettingField {
        key: "defaultVersion",
        label: "Default Version",
        description: "Default image model version",
        kind: FieldKind::Text,
    },
    SettingField {
        key: "defaultModel",
        label: "Default Model",
        description: "Default image model type",
        kind: FieldKind::Choice(&["dev", "schnell"]),
    },
    SettingField {
        key: "defaultNumOutputs",
        label: "Default Number of Outputs",
        description: "Default number of images to generate (1-4)",
        kind: FieldKind::Number {
            min: 1,
            max: 4,
            step: 1,
        },
    },
    SettingField {
        key: "defaultInferenceSteps",
        label: "Default Inference Steps",
        description: "Default number of inference steps (4-48)",
        kind: FieldKind::Number {
            min: 4,
            max: 48,
            step: 4,
        },
    },
    SettingField {
        key: "defaultOutputFormat",
        label: "Default Output Format",
        description: "Default image output format",
        kind: FieldKind::Choice(&["png", "webp", "jpg"]),
    },
    SettingField {
        key: "useAutoPrompt",
        label: "Auto Prompt",
        description: "Write a prompt from the note as soon as the dialog opens, without waiting to be asked",
        kind: FieldKind::Toggle,
    },
    SettingField {
        key: "pollTimeoutSecs",
        label: "Generation Timeout",
        description: "Seconds to wait for a generation job before giving up",
        kind: FieldKind::Number {
            min: 1,
            max: 86_400,
            step: 1,
        },
    },
];

/// Look up a schema entry by its stored key.
pub fn field(key: &str) -> Result<&'static SettingField> {
    SETTINGS_SCHEMA
        .iter()
        .find(|field| field.key == key)
        .ok_or_else(|| Error::invalid_field(key, "unknown setting"))
}

impl FieldKind {
    fn parse(&self, key: &str, raw: &str) -> Result<Value> {
        match self {
            Self::Text | Self::Secret => Ok(Value::String(raw.to_string())),
            Self::Toggle => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "on" | "yes" | "1" => Ok(Value::Bool(true)),
                "false" | "off" | "no" | "0" => Ok(Value::Bool(false)),
                other => Err(Error::invalid_field(key, format!("'{}' is not a toggle value", other))),
            },
            Self::Choice(options) => options
                .iter()
                .find(|option| option.eq_ignore_ascii_case(raw.trim()))
                .map(|option| Value::String(option.to_string()))
                .ok_or_else(|| {
                    Error::invalid_field(key, format!("expected one of {}", options.join(", ")))
                }),
            Self::Number { min, max, step } => {
                let value: u64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| Error::invalid_field(key, format!("'{}' is not a number", raw)))?;
                if value < *min || value > *max || (value - min) % step != 0 {
                    return Err(Error::invalid_field(
                        key,
                        format!("{} is outside {}..={} (step {})", value, min, max, step),
                    ));
                }
                Ok(Value::from(value))
            }
        }
    }
}

impl Settings {
    /// Current value of a field rendered as text.
    pub fn get(&self, key: &str) -> Result<String> {
        field(key)?;
        let value = serde_json::to_value(self)?;
        match value.get(key) {
            Some(Value::String(text)) => Ok(text.clone()),
            Some(other) => Ok(other.to_string()),
            None => Err(Error::Invariant(format!("setting {} missing from record", key))),
        }
    }

    /// Parse `raw` according to the field's schema entry and store it.
    pub fn set(&mut self, key: &str, raw: &str) -> Result<()> {
        let parsed = field(key)?.kind.parse(key, raw)?;
        let mut value = serde_json::to_value(&*self)?;
        let record = value
            .as_object_mut()
            .ok_or_else(|| Error::Invariant("settings did not serialize to an object".to_string()))?;
        record.insert(key.to_string(), parsed);
        *self = serde_json::from_value(value)?;
        Ok(())
    }

    /// Value suitable for showing to the user; secrets are masked.
    pub fn display_value(&self, field: &SettingField) -> Result<String> {
        let value = self.get(field.key)?;
        if field.kind != FieldKind::Secret {
            return Ok(value);
        }
        if value.is_empty() {
            return Ok("(not set)".to_string());
        }
        let tail: String = value
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        Ok(format!("****{}", tail))
    }

    /// Fill empty credentials from the environment (and `.env`) without persisting them.
    pub fn with_env_fallbacks(mut self) -> Self {
        dotenvy::dotenv().ok();

        if self.replicate_api_token.is_empty() {
            if let Ok(token) = std::env::var(REPLICATE_TOKEN_ENV) {
                debug!("Using {} from environment", REPLICATE_TOKEN_ENV);
                self.replicate_api_token = token;
            }
        }
        if self.openai_api_key.is_empty() {
            if let Ok(key) = std::env::var(LLM_API_KEY_ENV) {
                debug!("Using {} from environment", LLM_API_KEY_ENV);
                self.openai_api_key = key;
            }
        }
        self
    }
}

/// Merge stored values over [`Settings::default`] one key at a time.
///
/// A value the field cannot hold keeps the default for that field only.
/// Unknown keys are ignored.
fn merge_over_defaults(stored: Value) -> Result<Settings> {
    let defaults = serde_json::to_value(Settings::default())?;
    let Value::Object(mut merged) = defaults.clone() else {
        return Err(Error::Invariant("settings did not serialize to an object".to_string()));
    };
    let Value::Object(stored) = stored else {
        warn!("Stored settings are not a JSON object, using defaults");
        return Ok(Settings::default());
    };

    for (key, value) in stored {
        if !merged.contains_key(&key) {
            debug!("Ignoring unknown setting {}", key);
            continue;
        }
        let mut candidate = defaults.clone();
        if let Value::Object(record) = &mut candidate {
            record.insert(key.clone(), value.clone());
        }
        match serde_json::from_value::<Settings>(candidate) {
            Ok(_) => {
                merged.insert(key, value);
            }
            Err(e) => warn!("Ignoring stored value for {}: {}", key, e),
        }
    }

    Ok(serde_json::from_value(Value::Object(merged))?)
}

/// JSON-file backed settings persistence.
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Default location inside a vault.
    pub fn for_vault(vault: &Path) -> Self {
        Self::new(vault.join(SETTINGS_DIR).join(SETTINGS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Settings> {
        let content = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings at {}, using defaults", self.path.display());
                return Ok(Settings::default());
            }
            Err(err) => return Err(err.into()),
        };

        let stored: Value = serde_json::from_str(&content).map_err(|e| {
            tracing::error!("Failed to parse settings {}: {}", self.path.display(), e);
            e
        })?;
        let settings = merge_over_defaults(stored)?;
        info!("Loaded settings from {}", self.path.display());
        Ok(settings)
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        let json = serde_json::to_string_pretty(settings)?;
        write_atomic(&self.path, json.as_bytes())?;
        debug!("Saved settings to {}", self.path.display());
        Ok(())
    }
}
