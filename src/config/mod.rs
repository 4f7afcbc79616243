mod types;

pub use types::*;

use crate::Result;
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_ENV: &str = "JIG_CONFIG";
pub const PAIRINGS_DIR_ENV: &str = "JIG_PAIRINGS_DIR";

/// Loads the YAML config. An explicit path must exist; the default
/// `jig.yaml` is optional and falls back to built-in defaults.
pub async fn load(explicit: Option<&Path>) -> Result<Config> {
    let (config_path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => match env::var(CONFIG_ENV) {
            Ok(path) => (PathBuf::from(path), true),
            Err(_) => (PathBuf::from("jig.yaml"), false),
        },
    };

    let mut config = if !required && !tokio::fs::try_exists(&config_path).await? {
        debug!(
            "No configuration file at {}, using defaults",
            config_path.display()
        );
        Config::default()
    } else {
        debug!("Loading configuration from: {}", config_path.display());
        let config_str = tokio::fs::read_to_string(&config_path).await?;
        parse(&config_str)?
    };

    if let Ok(dir) = env::var(PAIRINGS_DIR_ENV) {
        debug!("Pairings directory overridden by {}: {}", PAIRINGS_DIR_ENV, dir);
        config.store.pairings_dir = PathBuf::from(dir);
    }

    Ok(config)
}

pub fn parse(config_str: &str) -> Result<Config> {
    // serde_yaml rejects an empty document; treat it as "all defaults"
    if config_str.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(config_str)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaStrictness;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.backend.kind, BackendKind::Auto);
        assert_eq!(config.backend.host, "localhost");
        assert_eq!(config.backend.temperature, 0.2);
        assert_eq!(config.backend.max_tokens, 4096);
        assert_eq!(config.creator.temperature, 0.7);
        assert_eq!(config.creator.strictness, SchemaStrictness::Standard);
        assert_eq!(config.store.pairings_dir, PathBuf::from("pairings"));
        assert_eq!(config.logs.level, "warn");
    }

    #[test]
    fn test_partial_document() {
        let config = parse(
            r#"
backend:
  kind: ollama
  model: "llama3.1:8b"
  timeout_secs: 30
creator:
  strictness: strict
store:
  pairings_dir: /var/lib/jig
logs:
  level: debug
  json: true
"#,
        )
        .unwrap();

        assert_eq!(config.backend.kind, BackendKind::Ollama);
        assert_eq!(config.backend.model.as_deref(), Some("llama3.1:8b"));
        assert_eq!(config.backend.timeout_secs, 30.0);
        assert_eq!(config.backend.connect_timeout_secs, 3.0);
        assert_eq!(config.creator.strictness, SchemaStrictness::Strict);
        assert_eq!(config.store.pairings_dir, PathBuf::from("/var/lib/jig"));
        assert!(config.logs.json);
    }

    #[test]
    fn test_invalid_backend_kind_is_rejected() {
        let result = parse("backend:\n  kind: vllm\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_endpoints_per_runtime() {
        let config = BackendConfig::default();
        assert_eq!(
            config.endpoint(BackendKind::LmStudio),
            "http://localhost:1234/v1"
        );
        assert_eq!(config.endpoint(BackendKind::Ollama), "http://localhost:11434");

        let custom = BackendConfig {
            kind: BackendKind::Ollama,
            base_url: Some("http://gpu-box:9000/".to_string()),
            ..BackendConfig::default()
        };
        assert_eq!(custom.endpoint(BackendKind::Ollama), "http://gpu-box:9000");
        // the override belongs to the configured kind only
        assert_eq!(
            custom.endpoint(BackendKind::LmStudio),
            "http://localhost:1234/v1"
        );
    }

    #[test]
    fn test_per_runtime_urls_apply_under_auto() {
        let config = parse(
            r#"
backend:
  kind: auto
  base_url: http://ignored:1/
  lmstudio_url: http://desk:1234/v1/
  ollama_url: http://gpu-box:11434
"#,
        )
        .unwrap();
        assert_eq!(config.backend.endpoint(BackendKind::LmStudio), "http://desk:1234/v1");
        assert_eq!(config.backend.endpoint(BackendKind::Ollama), "http://gpu-box:11434");
    }

    #[test]
    fn test_scan_endpoints_skip_configured_port() {
        let mut config = BackendConfig::default();
        assert!(config.lmstudio_scan_endpoints().is_empty());

        config.scan_ports = true;
        config.port = Some(4321);
        assert_eq!(
            config.lmstudio_scan_endpoints(),
            vec!["http://localhost:1234/v1", "http://localhost:8080/v1"]
        );

        config.lmstudio_url = Some("http://desk:1234/v1".to_string());
        assert!(config.lmstudio_scan_endpoints().is_empty());
    }

    #[test]
    fn test_unusable_timeouts_are_config_errors() {
        for value in [f64::INFINITY, f64::NAN, 0.0, -1.0, 1e30] {
            let config = BackendConfig {
                timeout_secs: value,
                ..BackendConfig::default()
            };
            assert!(
                matches!(config.timeout(), Err(crate::Error::Config(_))),
                "{} should be rejected",
                value
            );
        }

        let config = parse("backend:\n  connect_timeout_secs: .inf\n").unwrap();
        assert!(matches!(
            config.backend.connect_timeout(),
            Err(crate::Error::Config(_))
        ));

        let config = BackendConfig::default();
        assert_eq!(config.timeout().unwrap(), std::time::Duration::from_secs(120));
        assert_eq!(
            config.connect_timeout().unwrap(),
            std::time::Duration::from_secs(3)
        );
    }

    #[tokio::test]
    async fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load(Some(&dir.path().join("nope.yaml"))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jig.yaml");
        tokio::fs::write(&path, "backend:\n  kind: lmstudio\n  port: 4321\n")
            .await
            .unwrap();

        let config = load(Some(&path)).await.unwrap();
        assert_eq!(config.backend.kind, BackendKind::LmStudio);
        assert_eq!(
            config.backend.endpoint(BackendKind::LmStudio),
            "http://localhost:4321/v1"
        );
    }
}
