//! The single typed result of one `run` call

use base64::Engine;
use serde::Serialize;

/// Image encodings the kernel can hand back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageEncoding {
    Png,
}

impl ImageEncoding {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageEncoding::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageEncoding::Png => "png",
        }
    }
}

/// Outcome of executing one code submission
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExecutionOutcome {
    /// Accumulated stdout and expression values
    Text { content: String },
    /// First rich image the code displayed
    Image {
        encoding: ImageEncoding,
        content_base64: String,
    },
    /// Exception raised by the code, or unparseable output
    Error { message: String },
}

impl ExecutionOutcome {
    pub fn text(content: impl Into<String>) -> Self {
        ExecutionOutcome::Text {
            content: content.into(),
        }
    }

    pub fn png(content_base64: impl Into<String>) -> Self {
        ExecutionOutcome::Image {
            encoding: ImageEncoding::Png,
            content_base64: content_base64.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ExecutionOutcome::Error {
            message: message.into(),
        }
    }

    /// Short label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionOutcome::Text { .. } => "text",
            ExecutionOutcome::Image { .. } => "image",
            ExecutionOutcome::Error { .. } => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ExecutionOutcome::Error { .. })
    }

    /// Text content, error message, or the base64 payload of an image
    pub fn content(&self) -> &str {
        match self {
            ExecutionOutcome::Text { content } => content,
            ExecutionOutcome::Image { content_base64, .. } => content_base64,
            ExecutionOutcome::Error { message } => message,
        }
    }

    /// Raw image bytes; `None` for text and error outcomes
    pub fn image_bytes(&self) -> Option<Result<Vec<u8>, base64::DecodeError>> {
        match self {
            ExecutionOutcome::Image { content_base64, .. } => {
                // Kernels sometimes wrap long base64 lines
                let compact: String = content_base64.split_whitespace().collect();
                Some(base64::engine::general_purpose::STANDARD.decode(compact))
            }
            _ => None,
        }
    }
}
