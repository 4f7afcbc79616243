use crate::{Error, Result, schema::SchemaStrictness};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const LMSTUDIO_DEFAULT_PORT: u16 = 1234;
pub const OLLAMA_DEFAULT_PORT: u16 = 11434;
/// Ports scanned for LM Studio when `scan_ports` is on.
pub const LMSTUDIO_COMMON_PORTS: [u16; 3] = [1234, 4321, 8080];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub creator: CreatorConfig,
    #[serde(default)]
    pub logs: LogsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    /// Full base URL; wins over host/port for a single-runtime kind.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Per-runtime base URLs, mainly for `auto` with runtimes on different hosts.
    #[serde(default)]
    pub lmstudio_url: Option<String>,
    #[serde(default)]
    pub ollama_url: Option<String>,
    /// Scan the common LM Studio ports when the configured one is unreachable.
    #[serde(default)]
    pub scan_ports: bool,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: f64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: f64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_pairings_dir")]
    pub pairings_dir: PathBuf,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatorConfig {
    #[serde(default = "default_creator_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub strictness: SchemaStrictness,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[value(name = "lmstudio")]
    #[serde(rename = "lmstudio")]
    LmStudio,
    Ollama,
    /// LM Studio first, Ollama when LM Studio cannot be reached.
    #[default]
    Auto,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::LmStudio => "lmstudio",
            Self::Ollama => "ollama",
            Self::Auto => "auto",
        };
        f.write_str(label)
    }
}

impl BackendConfig {
    /// Base URL for one concrete runtime. `Auto` has no endpoint of its own.
    pub fn endpoint(&self, kind: BackendKind) -> String {
        if let Some(url) = self.explicit_url(kind) {
            return url.trim_end_matches('/').to_string();
        }

        match kind {
            BackendKind::LmStudio => lmstudio_url(
                &self.host,
                self.port.unwrap_or(LMSTUDIO_DEFAULT_PORT),
            ),
            BackendKind::Ollama | BackendKind::Auto => format!(
                "http://{}:{}",
                self.host,
                self.port.unwrap_or(OLLAMA_DEFAULT_PORT)
            ),
        }
    }

    fn explicit_url(&self, kind: BackendKind) -> Option<&String> {
        let specific = match kind {
            BackendKind::LmStudio => self.lmstudio_url.as_ref(),
            BackendKind::Ollama => self.ollama_url.as_ref(),
            BackendKind::Auto => None,
        };
        if kind == self.kind {
            self.base_url.as_ref().or(specific)
        } else {
            specific
        }
    }

    /// Other LM Studio base URLs to try when the configured one cannot be
    /// reached. Empty unless `scan_ports` is set and no URL was pinned.
    pub fn lmstudio_scan_endpoints(&self) -> Vec<String> {
        if !self.scan_ports || self.explicit_url(BackendKind::LmStudio).is_some() {
            return Vec::new();
        }
        let configured = self.port.unwrap_or(LMSTUDIO_DEFAULT_PORT);
        LMSTUDIO_COMMON_PORTS
            .iter()
            .filter(|&&port| port != configured)
            .map(|&port| lmstudio_url(&self.host, port))
            .collect()
    }

    pub fn connect_timeout(&self) -> Result<Duration> {
        seconds("connect_timeout_secs", self.connect_timeout_secs)
    }

    pub fn timeout(&self) -> Result<Duration> {
        seconds("timeout_secs", self.timeout_secs)
    }
}

fn lmstudio_url(host: &str, port: u16) -> String {
    format!("http://{}:{}/v1", host, port)
}

fn seconds(field: &str, value: f64) -> Result<Duration> {
    if value.is_nan() || value <= 0.0 {
        return Err(Error::config(format!(
            "{} must be a positive number of seconds, got {}",
            field, value
        )));
    }
    Duration::try_from_secs_f64(value)
        .map_err(|e| Error::config(format!("{} is out of range ({}): {}", field, value, e)))
}

impl StoreConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            host: default_host(),
            port: None,
            base_url: None,
            lmstudio_url: None,
            ollama_url: None,
            scan_ports: false,
            model: None,
            connect_timeout_secs: default_connect_timeout(),
            timeout_secs: default_timeout(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            pairings_dir: default_pairings_dir(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl Default for CreatorConfig {
    fn default() -> Self {
        Self {
            temperature: default_creator_temperature(),
            max_tokens: default_max_tokens(),
            strictness: SchemaStrictness::default(),
        }
    }
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_connect_timeout() -> f64 {
    3.0
}

fn default_timeout() -> f64 {
    120.0
}

fn default_temperature() -> f32 {
    0.2
}

fn default_creator_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_pairings_dir() -> PathBuf {
    PathBuf::from("pairings")
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "warn".to_string()
}
