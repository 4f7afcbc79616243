use super::client::{BackendClient, ModelSelector, body_preview, build_http_client, resolve_model};
use super::types::*;
use crate::{
    Error, Result,
    config::{BackendConfig, BackendKind},
    schema::parse_json_output,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Instant;
use tracing::{debug, warn};

/// Ollama through its native `/api/chat` endpoint. Schema enforcement rides
/// on the `format` field, which carries the raw JSON Schema.
pub struct OllamaClient {
    base_url: String,
    http: reqwest::Client,
    model: ModelSelector,
}

#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    message: Option<ChatMessageBody>,
}

#[derive(Debug, Deserialize)]
struct ChatMessageBody {
    #[serde(default)]
    content: String,
}

impl OllamaClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.endpoint(BackendKind::Ollama),
            http: build_http_client(config)?,
            model: ModelSelector::new(config.model.clone()),
        })
    }

    /// Builds the `/api/chat` payload. Images ride on the user message as
    /// base64 strings.
    pub fn build_request(&self, model: &str, request: &CompletionRequest) -> Value {
        let mut user = json!({
            "role": "user",
            "content": request.user_text,
        });
        if !request.images.is_empty() {
            user["images"] = json!(
                request
                    .images
                    .iter()
                    .map(|image| image.to_base64())
                    .collect::<Vec<_>>()
            );
        }

        json!({
            "model": model,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                user,
            ],
            "stream": false,
            "format": request.schema,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            }
        })
    }

    async fn fetch_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(Error::BackendRejected {
                status: status.as_u16(),
                detail: body_preview(&text),
            });
        }

        let tags: TagList = serde_json::from_str(&text)
            .map_err(|e| Error::malformed(format!("Invalid model list from Ollama: {}", e)))?;
        Ok(tags
            .models
            .into_iter()
            .filter_map(|m| m.name.or(m.model))
            .collect())
    }
}

#[async_trait]
impl BackendClient for OllamaClient {
    fn kind(&self) -> BackendKind {
        BackendKind::Ollama
    }

    fn endpoint(&self) -> String {
        self.base_url.clone()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let model = self.ensure_model().await?;
        let body = self.build_request(&model, &request);

        debug!(
            "Ollama completion: model={}, schema={}, images={}",
            model,
            request.schema_name,
            request.images.len()
        );

        let start = Instant::now();
        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        let latency_ms = start.elapsed().as_millis() as u64;

        if !status.is_success() {
            warn!("Ollama returned error: HTTP {}", status);
            return Err(Error::BackendRejected {
                status: status.as_u16(),
                detail: body_preview(&text),
            });
        }

        let parsed: ChatBody = serde_json::from_str(&text).map_err(|e| {
            Error::malformed(format!(
                "Unexpected chat body: {}. Body: {}",
                e,
                body_preview(&text)
            ))
        })?;

        let content = parsed
            .message
            .map(|m| m.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::malformed("Empty response from model"))?;

        let output = parse_json_output(&content).map_err(Error::MalformedResponse)?;

        debug!("Ollama completion finished in {}ms", latency_ms);

        Ok(Completion {
            content,
            output,
            backend: BackendKind::Ollama,
            model,
            latency_ms,
        })
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        self.fetch_models().await
    }

    async fn ensure_model(&self) -> Result<String> {
        if let Some(model) = self.model.resolved() {
            return Ok(model);
        }
        let available = self.fetch_models().await?;
        let model = resolve_model(self.model.requested().as_deref(), &available)?;
        self.model.set_resolved(&model)?;
        debug!("Ollama model resolved: {}", model);
        Ok(model)
    }

    async fn select_model(&self, name: &str) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid_input("Model name cannot be empty"));
        }
        let available = self.fetch_models().await?;
        let model = resolve_model(Some(name), &available)?;
        self.model.set(name, &model)?;
        Ok(model)
    }

    fn model(&self) -> Option<String> {
        self.model.resolved()
    }
}
