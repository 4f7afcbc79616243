use crate::config::{BackendKind, Config};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Schema-constrained structured output from local LLM runtimes.
#[derive(Parser, Debug)]
#[command(name = "jig", version)]
pub struct Cli {
    /// Runtime to use; `auto` tries LM Studio, then Ollama.
    #[arg(long, value_enum, global = true)]
    pub backend: Option<BackendKind>,

    #[arg(long, global = true)]
    pub host: Option<String>,

    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Model id; partial names are matched against the runtime's list.
    #[arg(long, global = true)]
    pub model: Option<String>,

    #[arg(long, global = true)]
    pub temperature: Option<f32>,

    /// Request timeout in seconds.
    #[arg(long, global = true)]
    pub timeout: Option<f64>,

    /// Try LM Studio's common ports when the configured one is unreachable.
    #[arg(long = "auto-probe", global = true)]
    pub scan_ports: bool,

    #[arg(long, global = true)]
    pub pairings_dir: Option<PathBuf>,

    /// YAML configuration file (default: $JIG_CONFIG or ./jig.yaml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Generate a schema + prompt pairing from a task description.
    Create {
        /// What the pairing should extract or produce.
        brief: String,
        #[arg(short, long)]
        name: String,
        /// Replace an existing pairing (the old one is backed up).
        #[arg(short, long)]
        force: bool,
    },
    /// Run structured inference with a stored pairing.
    Run {
        /// Pairing name, or a path to a schema .json file.
        #[arg(short, long = "schema")]
        schema: String,
        /// Pairing name or prompt .txt file (default: the schema's pairing).
        #[arg(short, long)]
        prompt: Option<String>,
        /// Input text, or a path to a .txt file.
        #[arg(short, long)]
        input: Option<String>,
        /// Text file to attach (repeatable).
        #[arg(long = "file")]
        files: Vec<PathBuf>,
        /// Image path or data URL (repeatable).
        #[arg(long = "image")]
        images: Vec<String>,
        /// Write the JSON result to this file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List stored pairings.
    List,
    /// Print a pairing's description, prompt and schema.
    Show { name: String },
    /// List models on the runtime, optionally selecting one.
    Models {
        #[arg(long)]
        set: Option<String>,
    },
}

impl Cli {
    /// Command-line flags win over the file and environment.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(kind) = self.backend {
            config.backend.kind = kind;
        }
        if let Some(ref host) = self.host {
            config.backend.host = host.clone();
        }
        if let Some(port) = self.port {
            config.backend.port = Some(port);
        }
        if let Some(ref model) = self.model {
            config.backend.model = Some(model.clone());
        }
        if let Some(temperature) = self.temperature {
            config.backend.temperature = temperature;
        }
        if let Some(timeout) = self.timeout {
            config.backend.timeout_secs = timeout;
        }
        if self.scan_ports {
            config.backend.scan_ports = true;
        }
        if let Some(ref dir) = self.pairings_dir {
            config.store.pairings_dir = dir.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_run_with_attachments() {
        let cli = Cli::try_parse_from([
            "jig", "run", "-s", "incident", "-i", "db down", "--file", "log.txt", "--image",
            "a.png", "--image", "b.jpg", "-o", "out.json", "--backend", "ollama",
        ])
        .unwrap();

        assert_eq!(cli.backend, Some(BackendKind::Ollama));
        assert_eq!(
            cli.command,
            Command::Run {
                schema: "incident".to_string(),
                prompt: None,
                input: Some("db down".to_string()),
                files: vec![PathBuf::from("log.txt")],
                images: vec!["a.png".to_string(), "b.jpg".to_string()],
                output: Some(PathBuf::from("out.json")),
            }
        );
    }

    #[test]
    fn test_parse_create_and_models() {
        let cli = Cli::try_parse_from(["jig", "create", "triage tickets", "-n", "triage", "-f"])
            .unwrap();
        assert_eq!(
            cli.command,
            Command::Create {
                brief: "triage tickets".to_string(),
                name: "triage".to_string(),
                force: true,
            }
        );

        let cli = Cli::try_parse_from(["jig", "--backend", "lmstudio", "models", "--set", "qwen"])
            .unwrap();
        assert_eq!(cli.backend, Some(BackendKind::LmStudio));
        assert_eq!(
            cli.command,
            Command::Models {
                set: Some("qwen".to_string())
            }
        );
    }

    #[test]
    fn test_parse_run_with_schema_and_prompt_files() {
        let cli = Cli::try_parse_from([
            "jig",
            "run",
            "-s",
            "./schemas/ticket.json",
            "-p",
            "prompts/ticket.txt",
            "-i",
            "printer on fire",
            "--auto-probe",
        ])
        .unwrap();

        assert!(cli.scan_ports);
        assert_eq!(
            cli.command,
            Command::Run {
                schema: "./schemas/ticket.json".to_string(),
                prompt: Some("prompts/ticket.txt".to_string()),
                input: Some("printer on fire".to_string()),
                files: vec![],
                images: vec![],
                output: None,
            }
        );

        let mut config = Config::default();
        cli.apply_overrides(&mut config);
        assert!(config.backend.scan_ports);
    }

    #[test]
    fn test_rejects_unknown_backend() {
        assert!(Cli::try_parse_from(["jig", "--backend", "vllm", "list"]).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "jig",
            "list",
            "--host",
            "gpu-box",
            "--port",
            "9000",
            "--timeout",
            "30",
            "--pairings-dir",
            "/tmp/p",
        ])
        .unwrap();
        let mut config = Config::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.backend.host, "gpu-box");
        assert_eq!(config.backend.port, Some(9000));
        assert_eq!(config.backend.timeout_secs, 30.0);
        assert_eq!(config.store.pairings_dir, PathBuf::from("/tmp/p"));
        assert_eq!(config.backend.kind, BackendKind::Auto);
        assert!(!config.backend.scan_ports);
    }
}
