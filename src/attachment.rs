//! Uploaded study documents
//!
//! An attachment is captured once, validated against the mime allow-list and
//! the size limit, and never mutated afterwards.

use crate::gateway::InlineData;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Mime types the gateway accepts for analysis
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "audio/mpeg",
    "audio/mp3",
    "text/plain",
];

/// Default decoded size limit (matches the provider's inline payload cap)
pub const DEFAULT_MAX_BYTES: usize = 20 * 1024 * 1024;

/// Input rejected before any gateway call is made
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("No document has been uploaded")]
    MissingAttachment,
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("Uploaded file is empty")]
    EmptyFile,
    #[error("File is too large ({size} bytes, limit {limit})")]
    TooLarge { size: usize, limit: usize },
    #[error("File data is not valid base64: {0}")]
    InvalidEncoding(String),
    #[error("A summary language is required")]
    EmptyLanguage,
    #[error("Message text is empty")]
    EmptyMessage,
}

/// A captured upload
#[derive(Debug, Clone)]
pub struct Attachment {
    bytes: Arc<[u8]>,
    mime_type: String,
    display_name: String,
}

impl Attachment {
    /// Capture raw bytes, validating type and size
    pub fn new(
        bytes: Vec<u8>,
        mime_type: &str,
        display_name: &str,
        max_bytes: usize,
    ) -> Result<Self, ValidationError> {
        let mime_type = normalize_mime(mime_type);
        if !is_supported(&mime_type) {
            return Err(ValidationError::UnsupportedType(mime_type));
        }
        if bytes.is_empty() {
            return Err(ValidationError::EmptyFile);
        }
        if bytes.len() > max_bytes {
            return Err(ValidationError::TooLarge {
                size: bytes.len(),
                limit: max_bytes,
            });
        }

        let display_name = display_name.trim();
        Ok(Self {
            bytes: Arc::from(bytes),
            mime_type,
            display_name: if display_name.is_empty() {
                "document".to_string()
            } else {
                display_name.to_string()
            },
        })
    }

    /// Capture an upload sent as a data URL (`data:<mime>;base64,<payload>`)
    /// or as bare base64.
    ///
    /// The mime type is taken from `mime_type`, else the data URL header,
    /// else guessed from the file name.
    pub fn from_data_url(
        file_data: &str,
        mime_type: Option<&str>,
        file_name: Option<&str>,
        max_bytes: usize,
    ) -> Result<Self, ValidationError> {
        let file_data = file_data.trim();
        if file_data.is_empty() {
            return Err(ValidationError::MissingAttachment);
        }

        let (header_mime, payload) = split_data_url(file_data)?;
        let bytes = BASE64
            .decode(payload.as_bytes())
            .map_err(|e| ValidationError::InvalidEncoding(e.to_string()))?;

        let name = file_name.unwrap_or_default();
        let mime = mime_type
            .filter(|m| !m.trim().is_empty())
            .map(str::to_string)
            .or(header_mime)
            .or_else(|| {
                mime_guess::from_path(name)
                    .first()
                    .map(|m| m.essence_str().to_string())
            })
            .unwrap_or_default();

        Self::new(bytes, &mime, name, max_bytes)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Human-readable kind, e.g. "PDF Document"
    pub fn description(&self) -> &'static str {
        match self.mime_type.as_str() {
            "application/pdf" => "PDF Document",
            "image/jpeg" => "JPEG Image",
            "image/png" => "PNG Image",
            "image/gif" => "GIF Image",
            "image/webp" => "WebP Image",
            "audio/mpeg" | "audio/mp3" => "MP3 Audio",
            "text/plain" => "Text File",
            _ => "Unknown File Type",
        }
    }

    /// Payload for the gateway. Shares the bytes, no copy.
    pub fn inline_data(&self) -> InlineData {
        InlineData {
            data: Arc::clone(&self.bytes),
            mime_type: self.mime_type.clone(),
        }
    }

    pub fn info(&self) -> AttachmentInfo {
        AttachmentInfo {
            display_name: self.display_name.clone(),
            mime_type: self.mime_type.clone(),
            description: self.description().to_string(),
            size_bytes: self.bytes.len(),
        }
    }
}

/// Attachment metadata for display
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentInfo {
    pub display_name: String,
    pub mime_type: String,
    pub description: String,
    pub size_bytes: usize,
}

pub fn is_supported(mime_type: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&mime_type)
}

/// Trimmed summary language, rejected when blank
pub fn validate_language(language: &str) -> Result<String, ValidationError> {
    let language = language.trim();
    if language.is_empty() {
        Err(ValidationError::EmptyLanguage)
    } else {
        Ok(language.to_string())
    }
}

fn normalize_mime(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Split a data URL into its declared mime type and base64 payload
fn split_data_url(file_data: &str) -> Result<(Option<String>, &str), ValidationError> {
    let Some(rest) = file_data.strip_prefix("data:") else {
        return Ok((None, file_data));
    };
    let Some((header, payload)) = rest.split_once(',') else {
        return Err(ValidationError::InvalidEncoding(
            "data URL has no payload".to_string(),
        ));
    };

    let mut params = header.split(';');
    let mime = params
        .next()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string);
    if !params.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return Err(ValidationError::InvalidEncoding(
            "only base64 data URLs are supported".to_string(),
        ));
    }

    Ok((mime, payload))
}
