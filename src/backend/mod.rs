mod client;
mod fallback;
mod lmstudio;
mod ollama;
mod types;

pub use client::{BackendClient, create_backend_client, resolve_model};
pub use fallback::FallbackClient;
pub use lmstudio::LmStudioClient;
pub use ollama::OllamaClient;
pub use types::*;
