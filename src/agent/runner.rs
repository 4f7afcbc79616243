use crate::{
    Error, Result,
    backend::{BackendClient, CompletionRequest},
    config::{BackendConfig, BackendKind},
    input::{ImageInput, InputFile, compose_user_message},
    schema::{self, SchemaStrictness},
    store::{PROMPT_FILE, PairingStore, SCHEMA_FILE, sanitize_name},
};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// One structured-inference call against a stored pairing.
#[derive(Debug, Clone, Default)]
pub struct InferenceRequest {
    /// Pairing name, or a path to a schema file.
    pub pairing: String,
    /// Pairing name or prompt file; the schema's own prompt when unset.
    pub prompt: Option<String>,
    pub text: String,
    pub files: Vec<InputFile>,
    pub images: Vec<ImageInput>,
    /// Falls back to the backend default when unset.
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl InferenceRequest {
    pub fn new(pairing: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            pairing: pairing.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_files(mut self, files: Vec<InputFile>) -> Self {
        self.files = files;
        self
    }

    pub fn with_images(mut self, images: Vec<ImageInput>) -> Self {
        self.images = images;
        self
    }

    fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.files.is_empty() && self.images.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct InferenceOutput {
    /// Conforms to the pairing's schema.
    pub value: Value,
    pub pairing: String,
    pub backend: BackendKind,
    pub model: String,
    pub latency_ms: u64,
}

/// Schema and prompt after resolving names and file paths.
struct Resolved {
    name: String,
    schema: Value,
    prompt: String,
    from_file: bool,
}

#[derive(Debug, Clone, Copy)]
struct Sampling {
    temperature: f32,
    max_tokens: u32,
}

pub struct InferenceRunner {
    store: Arc<PairingStore>,
    backend: Arc<dyn BackendClient>,
    defaults: Sampling,
}

impl InferenceRunner {
    pub fn new(
        store: Arc<PairingStore>,
        backend: Arc<dyn BackendClient>,
        defaults: &BackendConfig,
    ) -> Self {
        Self {
            store,
            backend,
            defaults: Sampling {
                temperature: defaults.temperature,
                max_tokens: defaults.max_tokens,
            },
        }
    }

    pub async fn run(&self, request: InferenceRequest) -> Result<InferenceOutput> {
        if request.is_empty() {
            return Err(Error::invalid_input(
                "provide input text, a file or an image",
            ));
        }

        let pairing = self.resolve(&request).await?;
        let validator = schema::compile(&pairing.schema).map_err(|e| {
            if pairing.from_file {
                Error::InvalidSchema(e)
            } else {
                Error::corrupt(&pairing.name, SCHEMA_FILE, e)
            }
        })?;

        let user_text = compose_user_message(&request.text, &request.files);
        debug!(
            "Running '{}' with {} chars of text, {} files, {} images",
            pairing.name,
            user_text.len(),
            request.files.len(),
            request.images.len()
        );

        let (wire_schema, renames) = schema::escape_reserved_properties(&pairing.schema);
        if !renames.is_empty() {
            debug!(
                "Escaped reserved property names for the backend: {:?}",
                renames.values().collect::<Vec<_>>()
            );
        }

        let completion_request =
            CompletionRequest::new(pairing.prompt.clone(), user_text, wire_schema)
                .with_schema_name(pairing.name.clone())
                .with_images(request.images)
                .with_sampling(
                    request.temperature.unwrap_or(self.defaults.temperature),
                    request.max_tokens.unwrap_or(self.defaults.max_tokens),
                );

        let mut completion = self.backend.complete(completion_request).await?;
        completion.output = schema::restore_reserved_properties(completion.output, &renames);

        schema::validate_instance(&validator, &completion.output).map_err(|violations| {
            Error::malformed(format!(
                "output does not conform to '{}': {}",
                pairing.name,
                violations.join("; ")
            ))
        })?;

        info!(
            "Pairing '{}' answered by {} ({}) in {} ms",
            pairing.name, completion.backend, completion.model, completion.latency_ms
        );

        Ok(InferenceOutput {
            value: completion.output,
            pairing: pairing.name,
            backend: completion.backend,
            model: completion.model,
            latency_ms: completion.latency_ms,
        })
    }

    async fn resolve(&self, request: &InferenceRequest) -> Result<Resolved> {
        let schema_ref = request.pairing.trim();
        let prompt_ref = request
            .prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());

        if !is_file_reference(schema_ref) {
            let pairing = self.store.load(schema_ref).await?;
            let prompt = match prompt_ref {
                None => pairing.prompt,
                Some(r) if !is_file_reference(r) && sanitize_name(r)? == pairing.name => {
                    pairing.prompt
                }
                Some(r) => self.resolve_prompt(r).await?,
            };
            return Ok(Resolved {
                name: pairing.name,
                schema: pairing.schema,
                prompt,
                from_file: false,
            });
        }

        let path = Path::new(schema_ref);
        let schema = read_schema_file(path).await?;
        let prompt = match prompt_ref {
            Some(r) => self.resolve_prompt(r).await?,
            None => {
                let sibling = path.with_file_name(PROMPT_FILE);
                match tokio::fs::read_to_string(&sibling).await {
                    Ok(prompt) => prompt,
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        return Err(Error::invalid_input(format!(
                            "no prompt for schema file {}; pass one with --prompt",
                            path.display()
                        )));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };
        let name = path
            .file_stem()
            .and_then(|stem| sanitize_name(&stem.to_string_lossy()).ok())
            .unwrap_or_else(|| "schema".to_string());
        debug!("Using schema file {} as '{}'", path.display(), name);

        Ok(Resolved {
            name,
            schema,
            prompt,
            from_file: true,
        })
    }

    async fn resolve_prompt(&self, reference: &str) -> Result<String> {
        if !is_file_reference(reference) {
            return Ok(self.store.load(reference).await?.prompt);
        }
        tokio::fs::read_to_string(reference).await.map_err(|e| {
            Error::invalid_input(format!("cannot read prompt file {}: {}", reference, e))
        })
    }
}

/// Names are store lookups; anything with a path separator or a `.json` or
/// `.txt` extension is read from disk.
fn is_file_reference(reference: &str) -> bool {
    reference.contains('/')
        || reference.contains('\\')
        || Path::new(reference)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json") || ext.eq_ignore_ascii_case("txt"))
}

async fn read_schema_file(path: &Path) -> Result<Value> {
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        Error::invalid_input(format!("cannot read schema file {}: {}", path.display(), e))
    })?;
    let schema: Value = serde_json::from_str(&text).map_err(|e| {
        Error::InvalidSchema(format!("{} is not valid JSON: {}", path.display(), e))
    })?;
    schema::check_pairing_schema(&schema, SchemaStrictness::Standard).map_err(|problems| {
        Error::InvalidSchema(format!("{}: {}", path.display(), problems.join("; ")))
    })?;
    Ok(schema)
}
