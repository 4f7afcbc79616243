use crate::{Error, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use std::fmt;
use std::path::Path;
use tracing::debug;

pub const SUPPORTED_IMAGE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
];

/// Placeholder sent when the user supplied images only.
pub const EMPTY_TEXT_PLACEHOLDER: &str = "(no text)";

/// Binary image payload with its MIME type.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageInput {
    data: Vec<u8>,
    mime: String,
}

impl ImageInput {
    pub fn new(data: Vec<u8>, mime: impl Into<String>) -> Result<Self> {
        let mime = mime.into().trim().to_ascii_lowercase();
        if !SUPPORTED_IMAGE_TYPES.contains(&mime.as_str()) {
            return Err(Error::invalid_input(format!(
                "unsupported image type '{}' (supported: {})",
                mime,
                SUPPORTED_IMAGE_TYPES.join(", ")
            )));
        }
        if data.is_empty() {
            return Err(Error::invalid_input("image payload is empty"));
        }
        Ok(Self { data, mime })
    }

    /// Accepts either a `data:` URL or a path to an image file.
    pub async fn load(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.starts_with("data:") {
            Self::from_data_url(reference)
        } else {
            Self::from_path(reference).await
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await.map_err(|e| {
            Error::invalid_input(format!("cannot read image {}: {}", path.display(), e))
        })?;
        debug!("Loaded image {} ({} bytes)", path.display(), data.len());
        Self::new(data, mime_for_path(path))
    }

    pub fn from_data_url(url: &str) -> Result<Self> {
        let (header, payload) = url
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(";base64,"))
            .ok_or_else(|| Error::invalid_input("expected a data:<mime>;base64,<payload> URL"))?;

        let mime = if header.trim().is_empty() {
            "image/jpeg"
        } else {
            header
        };
        let data = BASE64
            .decode(payload.trim())
            .map_err(|e| Error::invalid_input(format!("invalid base64 image data: {}", e)))?;
        Self::new(data, mime)
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.data)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.to_base64())
    }
}

impl fmt::Debug for ImageInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageInput")
            .field("mime", &self.mime)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Text file content attached to a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub name: String,
    pub content: String,
}

impl InputFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::invalid_input(format!("cannot read file {}: {}", path.display(), e))
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, content))
    }
}

/// Returns the content of `value` when it names an existing `.txt` file,
/// otherwise `value` itself.
pub async fn read_input_text(value: &str) -> Result<String> {
    let path = Path::new(value);
    let is_txt = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
    if is_txt && tokio::fs::try_exists(path).await.unwrap_or(false) {
        debug!("Reading input text from {}", path.display());
        return Ok(tokio::fs::read_to_string(path).await?);
    }
    Ok(value.to_string())
}

/// Joins free text and attached files into the user message.
pub fn compose_user_message(text: &str, files: &[InputFile]) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !text.trim().is_empty() {
        parts.push(text.to_string());
    }
    for file in files {
        parts.push(format!("[File: {}]\n{}", file.name, file.content));
    }

    if parts.is_empty() {
        EMPTY_TEXT_PLACEHOLDER.to_string()
    } else {
        parts.join("\n\n")
    }
}

fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "image/jpeg",
    }
}
