//! Effects produced by session transitions

use crate::attachment::Attachment;
use crate::quiz::QuizOutcome;

/// Work the runtime performs after a transition is accepted
#[derive(Debug, Clone)]
pub enum Effect {
    /// Replace the session's attachment
    StoreAttachment { attachment: Attachment },

    StoreLanguage { language: String },

    /// Push the initial user turn and summary placeholder, then stream the
    /// summary into it
    StartSummary,

    /// Push the user turn and reply placeholder, then stream the reply
    StartChatReply { text: String },

    /// Spawn a one-shot quiz generation tagged with `request_id`
    RequestQuiz { request_id: u64 },

    /// Replace the quiz session with a fresh one
    InstallQuiz { outcome: QuizOutcome },

    RecordAnswer { question_id: u32, option: usize },

    /// Move to the next question, finishing the quiz on the last one
    AdvanceQuiz,

    RetreatQuiz,
}
