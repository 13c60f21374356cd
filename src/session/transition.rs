//! Pure state transition function

use super::{Effect, QuizPosition, SessionContext, SessionEvent, SessionPhase};
use crate::attachment::{validate_language, ValidationError};
use crate::prompts::QUIZ_OPTION_COUNT;
use crate::quiz::QuizSessionError;
use thiserror::Error;

/// Result of an accepted transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_phase: SessionPhase,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(phase: SessionPhase) -> Self {
        Self {
            new_phase: phase,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Why an event was rejected. A rejection never changes state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Quiz(#[from] QuizSessionError),
    #[error("A reply is still streaming")]
    ReplyInFlight,
    #[error("A quiz is already being generated")]
    QuizPending,
    #[error("Quiz result {0} is no longer expected")]
    StaleQuiz(u64),
    #[error("Already at the first question")]
    AtFirstQuestion,
    #[error("{event} is not allowed while {phase}")]
    Illegal {
        phase: SessionPhase,
        event: &'static str,
    },
}

/// Pure transition function: same inputs, same outputs, no I/O.
pub fn transition(
    phase: SessionPhase,
    context: &SessionContext,
    event: SessionEvent,
) -> Result<TransitionResult, TransitionError> {
    use SessionPhase::{Analyzing, AwaitingAttachment, Idle, QuizActive, QuizReview, ResultsReady};

    match (phase, event) {
        // ============================================================
        // Upload
        // ============================================================
        (Idle | AwaitingAttachment, SessionEvent::AttachmentSelected { attachment }) => {
            Ok(TransitionResult::new(AwaitingAttachment)
                .with_effect(Effect::StoreAttachment { attachment }))
        }

        (Idle | AwaitingAttachment, SessionEvent::LanguageChanged { language }) => {
            Ok(TransitionResult::new(AwaitingAttachment).with_effect(Effect::StoreLanguage {
                language: language.trim().to_string(),
            }))
        }

        (Idle | AwaitingAttachment, SessionEvent::AnalyzeRequested) => {
            if !context.has_attachment {
                return Err(ValidationError::MissingAttachment.into());
            }
            validate_language(&context.language)?;
            Ok(TransitionResult::new(Analyzing).with_effect(Effect::StartSummary))
        }

        // ============================================================
        // Summary and chat
        // ============================================================

        // Success and failure both land on ResultsReady; a failure has
        // already been written into the conversation as an error turn.
        (Analyzing, SessionEvent::SummaryFinished) => {
            Ok(TransitionResult::new(ResultsReady))
        }

        (ResultsReady, SessionEvent::ChatSubmitted { text }) => {
            if context.reply_in_flight {
                return Err(TransitionError::ReplyInFlight);
            }
            let text = text.trim();
            if text.is_empty() {
                return Err(ValidationError::EmptyMessage.into());
            }
            Ok(TransitionResult::new(ResultsReady).with_effect(Effect::StartChatReply {
                text: text.to_string(),
            }))
        }

        // ============================================================
        // Quiz generation
        // ============================================================
        (ResultsReady | QuizReview, SessionEvent::QuizRequested) => {
            if context.quiz_pending.is_some() {
                return Err(TransitionError::QuizPending);
            }
            if !context.has_attachment {
                return Err(ValidationError::MissingAttachment.into());
            }
            Ok(TransitionResult::new(phase).with_effect(Effect::RequestQuiz {
                request_id: context.next_quiz_request,
            }))
        }

        (ResultsReady | QuizReview, SessionEvent::QuizReady { request_id, outcome }) => {
            if context.quiz_pending != Some(request_id) {
                return Err(TransitionError::StaleQuiz(request_id));
            }
            Ok(TransitionResult::new(QuizActive).with_effect(Effect::InstallQuiz { outcome }))
        }

        (_, SessionEvent::QuizReady { request_id, .. }) => {
            Err(TransitionError::StaleQuiz(request_id))
        }

        // ============================================================
        // Quiz taking
        // ============================================================
        (QuizActive, SessionEvent::AnswerSelected { question_id, option }) => {
            let position = active_quiz(context)?;
            let known = usize::try_from(question_id)
                .is_ok_and(|id| (1..=position.len).contains(&id));
            if !known {
                return Err(QuizSessionError::UnknownQuestion(question_id).into());
            }
            if option >= QUIZ_OPTION_COUNT {
                return Err(QuizSessionError::InvalidOption(option).into());
            }
            Ok(TransitionResult::new(QuizActive)
                .with_effect(Effect::RecordAnswer { question_id, option }))
        }

        (QuizActive, SessionEvent::NextQuestion) => {
            let position = active_quiz(context)?;
            let next = if position.is_last() { QuizReview } else { QuizActive };
            Ok(TransitionResult::new(next).with_effect(Effect::AdvanceQuiz))
        }

        (QuizActive, SessionEvent::PreviousQuestion) => {
            let position = active_quiz(context)?;
            if position.index == 0 {
                return Err(TransitionError::AtFirstQuestion);
            }
            Ok(TransitionResult::new(QuizActive).with_effect(Effect::RetreatQuiz))
        }

        (QuizReview, SessionEvent::BackToSummary) => Ok(TransitionResult::new(ResultsReady)),

        // ============================================================
        // Everything else is illegal and leaves state untouched
        // ============================================================
        (phase, event) => Err(TransitionError::Illegal {
            phase,
            event: event.name(),
        }),
    }
}

fn active_quiz(context: &SessionContext) -> Result<QuizPosition, TransitionError> {
    match context.quiz {
        Some(position) if !position.completed => Ok(position),
        Some(_) => Err(QuizSessionError::Completed.into()),
        None => Err(TransitionError::Illegal {
            phase: SessionPhase::QuizActive,
            event: "quiz_navigation",
        }),
    }
}
