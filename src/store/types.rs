use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

pub const SCHEMA_FILE: &str = "schema.json";
pub const PROMPT_FILE: &str = "prompt.txt";
pub const META_FILE: &str = "meta.json";

/// Caller-supplied metadata; the store fills in name, timestamps and revision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairingInfo {
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brief: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl PairingInfo {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }
}

/// Contents of `meta.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairingMeta {
    pub name: String,
    #[serde(flatten)]
    pub info: PairingInfo,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    /// Unique per save; lets readers detect a concurrent swap.
    pub revision: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pairing {
    pub name: String,
    pub schema: Value,
    pub prompt: String,
    pub meta: PairingMeta,
}

/// Where a save landed.
#[derive(Debug, Clone, PartialEq)]
pub struct PairingRef {
    pub name: String,
    pub path: PathBuf,
    /// Snapshot of the replaced version, when the save overwrote one.
    pub backup: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactStatus {
    Valid,
    Missing,
    Invalid,
}

impl ArtifactStatus {
    pub fn is_valid(self) -> bool {
        self == Self::Valid
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairingListing {
    pub name: String,
    pub schema: ArtifactStatus,
    pub prompt: ArtifactStatus,
    pub meta: ArtifactStatus,
    pub description: String,
}

impl PairingListing {
    pub fn is_complete(&self) -> bool {
        self.schema.is_valid() && self.prompt.is_valid() && self.meta.is_valid()
    }
}
