//! Session state machine
//!
//! Elm-style: a pure `transition(phase, context, event)` returns the next
//! phase plus the effects the runtime must execute. Nothing in here does I/O.

mod effect;
mod event;
mod phase;
mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::SessionEvent;
pub use phase::{QuizPosition, SessionContext, SessionPhase};
pub use transition::{transition, TransitionError};

use serde::Serialize;

/// Which user actions the current state would accept. Each flag is computed
/// by probing [`transition`], so the UI disables exactly what would be
/// rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Actions {
    pub analyze: bool,
    pub send_message: bool,
    pub generate_quiz: bool,
    pub next_question: bool,
    pub previous_question: bool,
    pub back_to_summary: bool,
}

impl Actions {
    pub fn available(phase: SessionPhase, context: &SessionContext) -> Self {
        let allows = |event: SessionEvent| transition(phase, context, event).is_ok();
        Self {
            analyze: allows(SessionEvent::AnalyzeRequested),
            send_message: allows(SessionEvent::ChatSubmitted {
                text: "?".to_string(),
            }),
            generate_quiz: allows(SessionEvent::QuizRequested),
            next_question: allows(SessionEvent::NextQuestion),
            previous_question: allows(SessionEvent::PreviousQuestion),
            back_to_summary: allows(SessionEvent::BackToSummary),
        }
    }
}
