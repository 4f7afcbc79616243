use crate::config::BackendKind;
use crate::input::ImageInput;
use serde_json::Value;

/// A schema-constrained completion, independent of the runtime wire format.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_text: String,
    pub images: Vec<ImageInput>,
    pub schema: Value,
    /// Identifier sent alongside the schema where the runtime asks for one.
    pub schema_name: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(
        system_prompt: impl Into<String>,
        user_text: impl Into<String>,
        schema: Value,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_text: user_text.into(),
            images: Vec::new(),
            schema,
            schema_name: "structured_output".to_string(),
            temperature: 0.2,
            max_tokens: 4096,
        }
    }

    pub fn with_images(mut self, images: Vec<ImageInput>) -> Self {
        self.images = images;
        self
    }

    pub fn with_schema_name(mut self, name: impl Into<String>) -> Self {
        self.schema_name = name.into();
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }
}

/// Parsed runtime output plus provenance.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Content text as returned by the runtime.
    pub content: String,
    /// `content` parsed as JSON; not yet checked against the schema.
    pub output: Value,
    /// The runtime that actually answered (never `Auto`).
    pub backend: BackendKind,
    pub model: String,
    pub latency_ms: u64,
}
