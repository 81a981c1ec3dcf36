//! AI image generation for Markdown notes
//!
//! Builds an image prompt (typed, or synthesized from the note by an
//! OpenAI-compatible chat model), runs a Replicate prediction, saves every
//! output into the vault and inserts Markdown references at the cursor.

pub mod ai;
pub mod app;
pub mod dialog;
pub mod document;
pub mod error;
pub mod models;
pub mod prompts;
pub mod settings;
pub mod storage;
pub mod ui;

pub use error::{Error, Result};
