use super::client::{BackendClient, ModelSelector, body_preview, build_http_client, resolve_model};
use super::types::*;
use crate::{
    Error, Result,
    config::{BackendConfig, BackendKind},
    input::ImageInput,
    schema::parse_json_output,
};
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
    ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessageArgs,
    ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs, ImageUrl, ResponseFormat,
    ResponseFormatJsonSchema,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::RwLock;
use std::time::Instant;
use tracing::{debug, info, warn};

/// LM Studio through its OpenAI-compatible API. Schema enforcement rides on
/// `response_format: {type: json_schema}`.
pub struct LmStudioClient {
    base_url: RwLock<String>,
    /// Alternative base URLs tried once when `base_url` is unreachable.
    scan_urls: Vec<String>,
    http: reqwest::Client,
    model: ModelSelector,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionBody {
    #[serde(default)]
    choices: Vec<ChatChoiceBody>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceBody {
    message: ChatMessageBody,
}

#[derive(Debug, Deserialize)]
struct ChatMessageBody {
    content: Option<String>,
}

impl LmStudioClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        Ok(Self {
            base_url: RwLock::new(config.endpoint(BackendKind::LmStudio)),
            scan_urls: config.lmstudio_scan_endpoints(),
            http: build_http_client(config)?,
            model: ModelSelector::new(config.model.clone()),
        })
    }

    /// Replaces the URLs scanned when the configured endpoint is unreachable.
    pub fn with_scan_urls(mut self, urls: Vec<String>) -> Self {
        self.scan_urls = urls
            .into_iter()
            .map(|u| u.trim_end_matches('/').to_string())
            .collect();
        self
    }

    fn base_url(&self) -> String {
        match self.base_url.read() {
            Ok(url) => url.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_base_url(&self, url: &str) -> Result<()> {
        let mut current = self
            .base_url
            .write()
            .map_err(|e| Error::internal(format!("Endpoint lock poisoned: {e}")))?;
        *current = url.to_string();
        Ok(())
    }

    /// Builds the chat request body. Images follow the text as `image_url`
    /// parts of the same user message.
    #[allow(deprecated)]
    pub fn build_request(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<CreateChatCompletionRequest> {
        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(ChatCompletionRequestSystemMessageContent::Text(
                request.system_prompt.clone(),
            ))
            .build()?;

        let content = if request.images.is_empty() {
            ChatCompletionRequestUserMessageContent::Text(request.user_text.clone())
        } else {
            ChatCompletionRequestUserMessageContent::Array(user_parts(
                &request.user_text,
                &request.images,
            ))
        };
        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()?;

        let messages: Vec<ChatCompletionRequestMessage> = vec![system.into(), user.into()];

        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: None,
                name: request.schema_name.clone(),
                schema: Some(request.schema.clone()),
                strict: Some(true),
            },
        };

        let body = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .response_format(response_format)
            .temperature(request.temperature)
            .max_tokens(request.max_tokens)
            .build()?;
        Ok(body)
    }

    async fn fetch_models(&self) -> Result<Vec<String>> {
        let base_url = self.base_url();
        match self.fetch_models_at(&base_url).await {
            Err(e) if e.is_unreachable() && !self.scan_urls.is_empty() => {
                warn!("LM Studio unreachable at {} ({}), scanning common ports", base_url, e);
                self.scan_ports().await
            }
            other => other,
        }
    }

    async fn scan_ports(&self) -> Result<Vec<String>> {
        for candidate in &self.scan_urls {
            match self.fetch_models_at(candidate).await {
                Ok(models) => {
                    info!("LM Studio found at {}", candidate);
                    self.set_base_url(candidate)?;
                    return Ok(models);
                }
                Err(e) if e.is_unreachable() => debug!("No LM Studio at {}: {}", candidate, e),
                Err(e) => return Err(e),
            }
        }
        Err(Error::unreachable(format!(
            "LM Studio not reachable at {} or any of: {}",
            self.base_url(),
            self.scan_urls.join(", ")
        )))
    }

    async fn fetch_models_at(&self, base_url: &str) -> Result<Vec<String>> {
        let url = format!("{}/models", base_url);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(Error::BackendRejected {
                status: status.as_u16(),
                detail: body_preview(&text),
            });
        }

        let list: ModelList = serde_json::from_str(&text)
            .map_err(|e| Error::malformed(format!("Invalid model list from LM Studio: {}", e)))?;
        Ok(list.data.into_iter().filter_map(|m| m.id).collect())
    }
}

fn user_parts(text: &str, images: &[ImageInput]) -> Vec<ChatCompletionRequestUserMessageContentPart> {
    let mut parts = vec![ChatCompletionRequestUserMessageContentPart::Text(
        ChatCompletionRequestMessageContentPartText {
            text: text.to_string(),
        },
    )];
    for image in images {
        parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
            ChatCompletionRequestMessageContentPartImage {
                image_url: ImageUrl {
                    url: image.data_url(),
                    detail: None,
                },
            },
        ));
    }
    parts
}

#[async_trait]
impl BackendClient for LmStudioClient {
    fn kind(&self) -> BackendKind {
        BackendKind::LmStudio
    }

    fn endpoint(&self) -> String {
        self.base_url()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let model = self.ensure_model().await?;
        let body = self.build_request(&model, &request)?;

        debug!(
            "LM Studio completion: model={}, schema={}, images={}",
            model,
            request.schema_name,
            request.images.len()
        );

        let start = Instant::now();
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url()))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        let latency_ms = start.elapsed().as_millis() as u64;

        if !status.is_success() {
            warn!("LM Studio returned error: HTTP {}", status);
            return Err(Error::BackendRejected {
                status: status.as_u16(),
                detail: body_preview(&text),
            });
        }

        let parsed: ChatCompletionBody = serde_json::from_str(&text).map_err(|e| {
            Error::malformed(format!(
                "Unexpected chat completion body: {}. Body: {}",
                e,
                body_preview(&text)
            ))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::malformed("Empty response from model"))?;

        let output = parse_json_output(&content).map_err(Error::MalformedResponse)?;

        debug!("LM Studio completion finished in {}ms", latency_ms);

        Ok(Completion {
            content,
            output,
            backend: BackendKind::LmStudio,
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
        debug!("LM Studio model resolved: {}", model);
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
