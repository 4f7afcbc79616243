use jig::{
    config::{BackendConfig, BackendKind, CreatorConfig},
    store::PairingStore,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Creates a store in a fresh temporary directory. Keep the `TempDir` alive
/// for the duration of the test.
pub async fn create_test_store() -> (TempDir, Arc<PairingStore>) {
    let temp_dir = TempDir::new().unwrap();
    let store = PairingStore::open(temp_dir.path().join("pairings"), Duration::from_secs(2))
        .await
        .unwrap();
    (temp_dir, Arc::new(store))
}

pub fn create_test_backend_config(kind: BackendKind, base_url: &str) -> BackendConfig {
    BackendConfig {
        kind,
        base_url: Some(base_url.to_string()),
        model: Some("test-model".to_string()),
        connect_timeout_secs: 1.0,
        timeout_secs: 5.0,
        ..BackendConfig::default()
    }
}

pub fn create_test_creator_config() -> CreatorConfig {
    CreatorConfig::default()
}

/// The incident triage schema used throughout the scenarios.
pub fn incident_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "urgency": {
                "type": "string",
                "description": "How quickly the incident needs attention",
                "enum": ["critical", "high", "medium", "low"]
            },
            "impacted_system": {
                "type": "string",
                "description": "The system affected by the incident"
            }
        },
        "required": ["urgency", "impacted_system"]
    })
}

pub const INCIDENT_PROMPT: &str =
    "Classify the incident report. Pick the urgency and name the impacted system.";

/// What the backend returns when asked to generate the incident pairing.
pub fn incident_generation() -> Value {
    json!({
        "description": "Incident urgency and impacted system",
        "system_prompt": INCIDENT_PROMPT,
        "schema": incident_schema()
    })
}

pub fn incident_output() -> Value {
    json!({"urgency": "critical", "impacted_system": "payments-db"})
}
