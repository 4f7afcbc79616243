use crate::{
    Error, Result,
    backend::{BackendClient, CompletionRequest},
    config::CreatorConfig,
    schema::{self, check_pairing_schema},
    store::{Pairing, PairingInfo, PairingStore, sanitize_name},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

const CREATOR_SCHEMA_NAME: &str = "pairing_definition";

const CREATOR_SYSTEM_PROMPT: &str = "You are an expert JSON Schema architect. For the task \
described by the user, produce:\n\
1) description: one line saying what the pairing extracts\n\
2) system_prompt: precise instructions for a model performing the task\n\
3) schema: a JSON Schema (Draft 7) for the model's answer\n\n\
Rules for schema:\n\
- The root is {\"type\": \"object\"} with \"properties\"\n\
- Set \"additionalProperties\": false on every object\n\
- List every property in \"required\" (an array of property names)\n\
- Give every field a \"description\"\n\
- Use \"enum\" for closed sets of values";

/// The shape the backend must answer with during pairing generation.
pub fn meta_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "description": {
                "type": "string",
                "description": "One-line description of what this pairing does",
                "minLength": 1
            },
            "system_prompt": {
                "type": "string",
                "description": "Detailed system prompt for the task",
                "minLength": 1
            },
            "schema": {
                "type": "object",
                "description": "JSON Schema (Draft 7) for the task output"
            }
        },
        "required": ["description", "system_prompt", "schema"]
    })
}

/// Generates schema + prompt pairings from a natural-language brief.
pub struct SchemaAgent {
    store: Arc<PairingStore>,
    backend: Arc<dyn BackendClient>,
    config: CreatorConfig,
}

impl SchemaAgent {
    pub fn new(
        store: Arc<PairingStore>,
        backend: Arc<dyn BackendClient>,
        config: CreatorConfig,
    ) -> Self {
        Self {
            store,
            backend,
            config,
        }
    }

    pub async fn create(&self, brief: &str, name: &str, overwrite: bool) -> Result<Pairing> {
        let name = sanitize_name(name)?;
        if brief.trim().is_empty() {
            return Err(Error::invalid_input("the brief must not be empty"));
        }
        if !overwrite && self.store.exists(&name).await? {
            return Err(Error::AlreadyExists { name });
        }

        info!("Generating pairing '{}' via {}", name, self.backend.kind());
        let request = CompletionRequest::new(
            CREATOR_SYSTEM_PROMPT,
            format!("Create schema for: {}", brief.trim()),
            meta_schema(),
        )
        .with_schema_name(CREATOR_SCHEMA_NAME)
        .with_sampling(self.config.temperature, self.config.max_tokens);

        let completion = self.backend.complete(request).await?;
        debug!(
            "Generation answered by {} ({}) in {} ms",
            completion.backend, completion.model, completion.latency_ms
        );

        let (description, system_prompt, generated) =
            self.accept_generation(&completion.output)?;

        self.store
            .save(
                &name,
                &generated,
                &system_prompt,
                PairingInfo {
                    description,
                    brief: Some(brief.trim().to_string()),
                    backend: Some(completion.backend.to_string()),
                    model: Some(completion.model),
                },
                overwrite,
            )
            .await?;

        self.store.load(&name).await
    }

    /// Checks the generated object against the meta-schema and the pairing
    /// schema rules; returns description, prompt and the (repaired) schema.
    fn accept_generation(&self, output: &Value) -> Result<(String, String, Value)> {
        let validator = schema::compile(&meta_schema()).map_err(Error::internal)?;
        if let Err(violations) = schema::validate_instance(&validator, output) {
            warn!("Generation does not match the pairing definition shape");
            return Err(Error::generation_invalid(violations.join("; ")));
        }

        let text = |field: &str| {
            output
                .get(field)
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string())
                .unwrap_or_default()
        };
        let description = text("description");
        let system_prompt = text("system_prompt");
        if system_prompt.is_empty() {
            return Err(Error::generation_invalid("system_prompt is blank"));
        }

        let generated = check_pairing_schema(&output["schema"], self.config.strictness)
            .map_err(|problems| {
                warn!(
                    "Generated schema rejected at {:?} strictness",
                    self.config.strictness
                );
                Error::generation_invalid(problems.join("; "))
            })?;

        Ok((description, system_prompt, generated))
    }
}
