use async_trait::async_trait;
use jig::{
    Error, Result,
    backend::{BackendClient, Completion, CompletionRequest},
    config::BackendKind,
};
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Scripted backend: answers completions from a queue and records requests.
#[derive(Debug)]
pub struct MockBackendClient {
    pub kind: BackendKind,
    pub model: String,
    pub responses: Arc<Mutex<Vec<Result<Value>>>>,
    pub requests: Arc<Mutex<Vec<CompletionRequest>>>,
    pub models: Vec<String>,
    pub error: Option<Error>,
}

impl MockBackendClient {
    pub fn new() -> Self {
        Self {
            kind: BackendKind::Ollama,
            model: "mock-model".to_string(),
            responses: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            models: vec!["mock-model".to_string()],
            error: None,
        }
    }

    pub fn with_outputs(self, outputs: Vec<Value>) -> Self {
        *self.responses.lock().unwrap() = outputs.into_iter().map(Ok).collect();
        self
    }

    pub fn with_error(mut self, error: Error) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_kind(mut self, kind: BackendKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn add_output(&self, output: Value) {
        self.responses.lock().unwrap().push(Ok(output));
    }

    pub fn get_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockBackendClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackendClient for MockBackendClient {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn endpoint(&self) -> String {
        "mock://backend".to_string()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        self.requests.lock().unwrap().push(request);

        if let Some(ref error) = self.error {
            return Err(error.clone());
        }

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(Error::internal("No more mock responses available"));
        }

        let output = responses.remove(0)?;
        Ok(Completion {
            content: output.to_string(),
            output,
            backend: self.kind,
            model: self.model.clone(),
            latency_ms: 1,
        })
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        if let Some(ref error) = self.error {
            return Err(error.clone());
        }
        Ok(self.models.clone())
    }

    async fn ensure_model(&self) -> Result<String> {
        Ok(self.model.clone())
    }

    async fn select_model(&self, name: &str) -> Result<String> {
        jig::backend::resolve_model(Some(name), &self.models)
    }

    fn model(&self) -> Option<String> {
        Some(self.model.clone())
    }
}
