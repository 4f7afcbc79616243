use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Pairing '{name}' already exists")]
    AlreadyExists { name: String },

    #[error("Pairing '{name}' not found")]
    NotFound { name: String },

    #[error("Pairing '{name}' is corrupt: {file}: {reason}")]
    Corrupt {
        name: String,
        file: String,
        reason: String,
    },

    #[error("Generated pairing is invalid: {0}")]
    GenerationInvalid(String),

    #[error("Backend unreachable: {0}")]
    BackendUnreachable(String),

    #[error("Backend rejected request with status {status}: {detail}")]
    BackendRejected { status: u16, detail: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid pairing name: {0}")]
    InvalidName(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Pairing '{name}' is busy (another write is in progress)")]
    StoreBusy { name: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("OpenAI request error: {0}")]
    OpenAi(#[from] async_openai::error::OpenAIError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else if let Some(status) = err.status() {
            Self::BackendRejected {
                status: status.as_u16(),
                detail: err.to_string(),
            }
        } else {
            // connect failures, timeouts, and anything else at the transport level
            Self::BackendUnreachable(err.to_string())
        }
    }
}

impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Self::AlreadyExists { name } => Self::AlreadyExists { name: name.clone() },
            Self::NotFound { name } => Self::NotFound { name: name.clone() },
            Self::Corrupt { name, file, reason } => Self::Corrupt {
                name: name.clone(),
                file: file.clone(),
                reason: reason.clone(),
            },
            Self::GenerationInvalid(s) => Self::GenerationInvalid(s.clone()),
            Self::BackendUnreachable(s) => Self::BackendUnreachable(s.clone()),
            Self::BackendRejected { status, detail } => Self::BackendRejected {
                status: *status,
                detail: detail.clone(),
            },
            Self::MalformedResponse(s) => Self::MalformedResponse(s.clone()),
            Self::InvalidSchema(s) => Self::InvalidSchema(s.clone()),
            Self::InvalidName(s) => Self::InvalidName(s.clone()),
            Self::InvalidInput(s) => Self::InvalidInput(s.clone()),
            Self::StoreBusy { name } => Self::StoreBusy { name: name.clone() },
            Self::Config(s) => Self::Config(s.clone()),
            Self::Internal(s) => Self::Internal(s.clone()),
            // For errors that can't be cloned, convert to string representation
            Self::Serialization(e) => Self::Internal(format!("Serialization error: {}", e)),
            Self::Yaml(e) => Self::Internal(format!("YAML error: {}", e)),
            Self::Io(e) => Self::Internal(format!("IO error: {}", e)),
            Self::OpenAi(e) => Self::Internal(format!("OpenAI request error: {}", e)),
        }
    }
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::BackendUnreachable(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    pub fn generation_invalid(msg: impl Into<String>) -> Self {
        Self::GenerationInvalid(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn corrupt(
        name: impl Into<String>,
        file: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Corrupt {
            name: name.into(),
            file: file.into(),
            reason: reason.into(),
        }
    }

    /// True for transport-level failures, the only class the `auto` backend
    /// retries against its secondary runtime.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::BackendUnreachable(_))
    }
}
