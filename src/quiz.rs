//! Quiz generation, validation and the quiz session
//!
//! Model output is untrusted: it goes through a strict decode-then-validate
//! pipeline and is either a full, well-shaped quiz or an error. The caller
//! degrades errors to the fallback quiz so the user always gets a quiz.

mod fallback;
mod session;
mod validate;

pub use session::{QuizSession, QuizSessionError, QuizSnapshot, QuizStep};

use crate::attachment::Attachment;
use crate::gateway::{GatewayError, GenerateRequest, ModelGateway};
use crate::prompts::{self, QUIZ_OPTION_COUNT};
use serde::Serialize;
use thiserror::Error;

/// Warning attached to a fallback quiz
pub const FALLBACK_WARNING: &str = "Using fallback quiz due to processing error";

/// One validated multiple-choice question
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    /// 1-based position in the quiz
    pub id: u32,
    #[serde(rename = "question")]
    pub prompt: String,
    pub options: [String; QUIZ_OPTION_COUNT],
    #[serde(rename = "correctAnswer")]
    pub correct_option: usize,
    pub explanation: String,
}

/// A complete quiz. Only constructed by validation or as the fallback, so it
/// always holds exactly five well-shaped questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Quiz {
    questions: Vec<QuizQuestion>,
}

impl Quiz {
    /// Decode and validate raw model output
    pub fn parse(raw: &str) -> Result<Self, QuizError> {
        validate::parse_questions(raw).map(|questions| Self { questions })
    }

    /// The fixed quiz used when generation fails
    pub fn fallback() -> Self {
        Self {
            questions: fallback::questions(),
        }
    }

    pub fn questions(&self) -> &[QuizQuestion] {
        &self.questions
    }
}

#[derive(Debug, Clone, Error)]
pub enum QuizError {
    #[error("quiz generation failed: {0}")]
    Gateway(#[from] GatewayError),
    #[error("model output is not a JSON array: {0}")]
    Parse(String),
    #[error("{}", shape_message(.index, .reason))]
    Shape {
        /// Offending question, or `None` when the array itself is wrong
        index: Option<usize>,
        reason: String,
    },
}

fn shape_message(index: &Option<usize>, reason: &str) -> String {
    match index {
        Some(i) => format!("question {}: {reason}", i + 1),
        None => format!("quiz: {reason}"),
    }
}

/// A quiz ready to install, with the warning set when it is the fallback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizOutcome {
    pub quiz: Quiz,
    pub warning: Option<String>,
}

/// Ask the gateway for a quiz over `attachment` and validate the result
pub async fn generate_quiz(
    gateway: &dyn ModelGateway,
    attachment: &Attachment,
) -> Result<Quiz, QuizError> {
    let request = GenerateRequest::new(prompts::quiz_prompt()).with_attachment(attachment.inline_data());
    let raw = gateway.generate_once(&request).await?;
    Quiz::parse(&raw)
}

/// Like [`generate_quiz`], but never fails: any error yields the fallback
/// quiz with a warning.
pub async fn generate_quiz_or_fallback(
    gateway: &dyn ModelGateway,
    attachment: &Attachment,
) -> QuizOutcome {
    match generate_quiz(gateway, attachment).await {
        Ok(quiz) => QuizOutcome {
            quiz,
            warning: None,
        },
        Err(e) => {
            tracing::warn!(
                error = %e,
                document = %attachment.display_name(),
                "Quiz generation failed, serving fallback quiz"
            );
            QuizOutcome {
                quiz: Quiz::fallback(),
                warning: Some(FALLBACK_WARNING.to_string()),
            }
        }
    }
}
