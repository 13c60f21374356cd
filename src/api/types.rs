//! API request and response types

use crate::gateway::{ContextTurn, Role};
use crate::quiz::Quiz;
use serde::{Deserialize, Serialize};

/// Request for a one-off streamed summary or follow-up reply
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub file_data: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub chat_history: Vec<HistoryTurn>,
    #[serde(default)]
    pub is_initial_analysis: bool,
    #[serde(default)]
    pub user_message: Option<String>,
}

/// A prior turn. Accepts `{role, text}` as well as the provider's
/// `{role, parts: [{text}]}` shape.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextPart {
    #[serde(default)]
    pub text: String,
}

impl From<HistoryTurn> for ContextTurn {
    fn from(turn: HistoryTurn) -> Self {
        let text = turn
            .text
            .unwrap_or_else(|| turn.parts.into_iter().map(|p| p.text).collect());
        ContextTurn {
            role: turn.role,
            text,
        }
    }
}

/// Request for a one-off quiz
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizRequest {
    #[serde(default)]
    pub file_data: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

/// Quiz response. `success` is always true; a fallback quiz carries a
/// warning.
#[derive(Debug, Serialize)]
pub struct QuizResponse {
    pub success: bool,
    pub quiz: Quiz,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Upload a document into a session
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRequest {
    pub file_data: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LanguageRequest {
    pub language: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    pub question_id: u32,
    pub option: usize,
}

/// Response for lifecycle actions
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
