pub mod client;
pub mod predictions;
pub mod types;

pub use predictions::{ReplicateGenerationClient, POLL_INTERVAL};
