//! Common types for model gateway interactions

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Author of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One `{role, text}` pair of the context history sent with a follow-up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextTurn {
    pub role: Role,
    pub text: String,
}

#[cfg(test)]
impl ContextTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Binary payload sent inline with a prompt
#[derive(Debug, Clone)]
pub struct InlineData {
    pub data: Arc<[u8]>,
    pub mime_type: String,
}

/// Request for a generation call
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub attachment: Option<InlineData>,
    /// Prior turns, oldest first. Empty for a fresh analysis.
    pub history: Vec<ContextTurn>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            attachment: None,
            history: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: InlineData) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn with_history(mut self, history: Vec<ContextTurn>) -> Self {
        self.history = history;
        self
    }
}

/// One event of a streamed generation.
///
/// A well-formed stream is any number of `Content` events followed by exactly
/// one `Done` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Content { text: String },
    Done,
    Error { message: String },
}

impl StreamEvent {
    pub fn content(text: impl Into<String>) -> Self {
        StreamEvent::Content { text: text.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error {
            message: message.into(),
        }
    }
}
