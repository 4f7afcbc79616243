use super::{fallback::FallbackClient, lmstudio::LmStudioClient, ollama::OllamaClient, types::*};
use crate::{
    Error, Result,
    config::{BackendConfig, BackendKind},
};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

#[async_trait]
pub trait BackendClient: Send + Sync {
    /// The configured runtime kind (`Auto` for the fallback client).
    fn kind(&self) -> BackendKind;

    fn endpoint(&self) -> String;

    /// Runs a completion whose output the runtime constrains to `request.schema`.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;

    async fn list_models(&self) -> Result<Vec<String>>;

    /// Resolves (once) and returns the model used for completions.
    async fn ensure_model(&self) -> Result<String>;

    /// Switches to another model available on the runtime.
    async fn select_model(&self, name: &str) -> Result<String>;

    /// The currently resolved model, if any.
    fn model(&self) -> Option<String>;
}

pub fn create_backend_client(config: &BackendConfig) -> Result<Arc<dyn BackendClient>> {
    debug!("Creating backend client: {}", config.kind);

    let client: Arc<dyn BackendClient> = match config.kind {
        BackendKind::LmStudio => Arc::new(LmStudioClient::new(config)?),
        BackendKind::Ollama => Arc::new(OllamaClient::new(config)?),
        BackendKind::Auto => {
            let primary = Box::new(LmStudioClient::new(config)?);
            let secondary = Box::new(OllamaClient::new(config)?);
            Arc::new(FallbackClient::new(primary, secondary))
        }
    };

    info!(
        "Backend client ready: {} at {}",
        client.kind(),
        client.endpoint()
    );
    Ok(client)
}

pub(crate) fn build_http_client(config: &BackendConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout()?)
        .timeout(config.timeout()?)
        .build()
        .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))
}

/// Truncated body text for error reports.
pub(crate) fn body_preview(body: &str) -> String {
    const LIMIT: usize = 500;
    if body.chars().count() > LIMIT {
        format!("{}...", body.chars().take(LIMIT).collect::<String>())
    } else {
        body.to_string()
    }
}

/// Requested model plus the name it resolved to on the runtime.
#[derive(Debug, Default)]
pub(crate) struct ModelSelector {
    requested: RwLock<Option<String>>,
    resolved: RwLock<Option<String>>,
}

impl ModelSelector {
    pub fn new(requested: Option<String>) -> Self {
        Self {
            requested: RwLock::new(requested.filter(|m| !m.trim().is_empty())),
            resolved: RwLock::new(None),
        }
    }

    pub fn resolved(&self) -> Option<String> {
        self.resolved.read().ok().and_then(|r| r.clone())
    }

    pub fn requested(&self) -> Option<String> {
        self.requested.read().ok().and_then(|r| r.clone())
    }

    pub fn set(&self, requested: &str, resolved: &str) -> Result<()> {
        let mut req = self
            .requested
            .write()
            .map_err(|e| Error::internal(format!("Model lock poisoned: {e}")))?;
        let mut res = self
            .resolved
            .write()
            .map_err(|e| Error::internal(format!("Model lock poisoned: {e}")))?;
        *req = Some(requested.to_string());
        *res = Some(resolved.to_string());
        Ok(())
    }

    pub fn set_resolved(&self, resolved: &str) -> Result<()> {
        let mut res = self
            .resolved
            .write()
            .map_err(|e| Error::internal(format!("Model lock poisoned: {e}")))?;
        *res = Some(resolved.to_string());
        Ok(())
    }
}

/// Picks a model from what the runtime reports: exact id, then a unique
/// case-insensitive partial match, else the first available model when
/// nothing was requested.
pub fn resolve_model(requested: Option<&str>, available: &[String]) -> Result<String> {
    if available.is_empty() {
        return Err(Error::config(
            "No models available on the backend. Load or pull a model first.",
        ));
    }

    let Some(requested) = requested.map(str::trim).filter(|m| !m.is_empty()) else {
        return Ok(available[0].clone());
    };

    if let Some(exact) = available.iter().find(|m| m.as_str() == requested) {
        return Ok(exact.clone());
    }

    let needle = requested.to_lowercase();
    // Ollama tags ("llama3.1:8b") also match on the bare model name
    let short = needle.split(':').next().unwrap_or(&needle).to_string();
    let partial: Vec<&String> = available
        .iter()
        .filter(|m| {
            let candidate = m.to_lowercase();
            candidate.contains(&needle) || candidate.starts_with(&short)
        })
        .collect();

    match partial.as_slice() {
        [single] => Ok((*single).clone()),
        [] => Err(Error::config(format!(
            "Model '{}' not found. Available: {}",
            requested,
            available.join(", ")
        ))),
        many => Err(Error::config(format!(
            "Model '{}' is ambiguous. Matches: {}",
            requested,
            many.iter()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}
