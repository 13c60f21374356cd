//! Session phases and the facts transitions are decided on

use serde::{Deserialize, Serialize};
use std::fmt;

/// Current step of the user journey. Exactly one is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Idle,
    AwaitingAttachment,
    Analyzing,
    ResultsReady,
    QuizActive,
    QuizReview,
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::AwaitingAttachment => "awaiting_attachment",
            SessionPhase::Analyzing => "analyzing",
            SessionPhase::ResultsReady => "results_ready",
            SessionPhase::QuizActive => "quiz_active",
            SessionPhase::QuizReview => "quiz_review",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position within the active quiz
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizPosition {
    pub index: usize,
    pub len: usize,
    pub completed: bool,
}

impl QuizPosition {
    pub fn is_last(&self) -> bool {
        self.index + 1 >= self.len
    }
}

/// Snapshot of session data taken by the runtime before each transition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    pub has_attachment: bool,
    /// Trimmed summary language, empty when unset
    pub language: String,
    /// A summary or chat reply is still streaming
    pub reply_in_flight: bool,
    /// Request id of the outstanding quiz generation
    pub quiz_pending: Option<u64>,
    /// Id the next quiz request will carry
    pub next_quiz_request: u64,
    pub quiz: Option<QuizPosition>,
}
