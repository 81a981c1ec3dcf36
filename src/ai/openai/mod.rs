pub mod chat;
pub mod client;
pub mod types;

pub use chat::OpenAiPromptClient;
