use super::client::BackendClient;
use super::types::*;
use crate::{Result, config::BackendKind};
use async_trait::async_trait;
use tracing::{debug, warn};

/// The `auto` selection policy: every call goes to the primary runtime and,
/// only when that runtime cannot be reached, once to the secondary.
///
/// Calls are strictly sequential so a request never runs on both runtimes.
pub struct FallbackClient {
    primary: Box<dyn BackendClient>,
    secondary: Box<dyn BackendClient>,
}

impl FallbackClient {
    pub fn new(primary: Box<dyn BackendClient>, secondary: Box<dyn BackendClient>) -> Self {
        Self { primary, secondary }
    }

    fn announce_fallback(&self, operation: &str, reason: &crate::Error) {
        warn!(
            "{} unreachable during {} ({}), falling back to {} at {}",
            self.primary.kind(),
            operation,
            reason,
            self.secondary.kind(),
            self.secondary.endpoint()
        );
    }
}

#[async_trait]
impl BackendClient for FallbackClient {
    fn kind(&self) -> BackendKind {
        BackendKind::Auto
    }

    fn endpoint(&self) -> String {
        format!("{} | {}", self.primary.endpoint(), self.secondary.endpoint())
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        match self.primary.complete(request.clone()).await {
            Err(e) if e.is_unreachable() => {
                self.announce_fallback("completion", &e);
                self.secondary.complete(request).await
            }
            other => {
                debug!("Completion served by {}", self.primary.kind());
                other
            }
        }
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        match self.primary.list_models().await {
            Err(e) if e.is_unreachable() => {
                self.announce_fallback("model listing", &e);
                self.secondary.list_models().await
            }
            other => other,
        }
    }

    async fn ensure_model(&self) -> Result<String> {
        match self.primary.ensure_model().await {
            Err(e) if e.is_unreachable() => {
                self.announce_fallback("model resolution", &e);
                self.secondary.ensure_model().await
            }
            other => other,
        }
    }

    async fn select_model(&self, name: &str) -> Result<String> {
        match self.primary.select_model(name).await {
            Err(e) if e.is_unreachable() => {
                self.announce_fallback("model selection", &e);
                self.secondary.select_model(name).await
            }
            other => other,
        }
    }

    fn model(&self) -> Option<String> {
        self.primary.model().or_else(|| self.secondary.model())
    }
}
