//! Events that drive the session

use crate::attachment::Attachment;
use crate::quiz::QuizOutcome;

/// User actions and completion signals from background work
#[derive(Debug, Clone)]
pub enum SessionEvent {
    // User input
    AttachmentSelected {
        attachment: Attachment,
    },
    LanguageChanged {
        language: String,
    },
    AnalyzeRequested,
    ChatSubmitted {
        text: String,
    },
    QuizRequested,
    AnswerSelected {
        question_id: u32,
        option: usize,
    },
    NextQuestion,
    PreviousQuestion,
    BackToSummary,

    // Background completions
    /// The summary stream ended. A failure has already replaced the
    /// placeholder with an error turn.
    SummaryFinished,
    QuizReady {
        request_id: u64,
        outcome: QuizOutcome,
    },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::AttachmentSelected { .. } => "attachment_selected",
            SessionEvent::LanguageChanged { .. } => "language_changed",
            SessionEvent::AnalyzeRequested => "analyze_requested",
            SessionEvent::ChatSubmitted { .. } => "chat_submitted",
            SessionEvent::QuizRequested => "quiz_requested",
            SessionEvent::AnswerSelected { .. } => "answer_selected",
            SessionEvent::NextQuestion => "next_question",
            SessionEvent::PreviousQuestion => "previous_question",
            SessionEvent::BackToSummary => "back_to_summary",
            SessionEvent::SummaryFinished => "summary_finished",
            SessionEvent::QuizReady { .. } => "quiz_ready",
        }
    }
}
