//! Property-based tests for the session state machine

use super::*;
use crate::attachment::{Attachment, ValidationError, DEFAULT_MAX_BYTES};
use crate::quiz::{Quiz, QuizOutcome};
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_phase() -> impl Strategy<Value = SessionPhase> {
    prop_oneof![
        Just(SessionPhase::Idle),
        Just(SessionPhase::AwaitingAttachment),
        Just(SessionPhase::Analyzing),
        Just(SessionPhase::ResultsReady),
        Just(SessionPhase::QuizActive),
        Just(SessionPhase::QuizReview),
    ]
}

fn arb_quiz_position() -> impl Strategy<Value = Option<QuizPosition>> {
    proptest::option::of((0usize..5, any::<bool>()).prop_map(|(index, completed)| QuizPosition {
        index,
        len: 5,
        completed,
    }))
}

fn arb_context() -> impl Strategy<Value = SessionContext> {
    (
        any::<bool>(),
        prop_oneof![Just(String::new()), Just("  ".to_string()), "[A-Za-z]{1,10}"],
        any::<bool>(),
        proptest::option::of(0u64..4),
        0u64..4,
        arb_quiz_position(),
    )
        .prop_map(
            |(has_attachment, language, reply_in_flight, quiz_pending, next_quiz_request, quiz)| {
                SessionContext {
                    has_attachment,
                    language,
                    reply_in_flight,
                    quiz_pending,
                    next_quiz_request,
                    quiz,
                }
            },
        )
}

fn attachment() -> Attachment {
    Attachment::new(b"GIF89a".to_vec(), "image/gif", "diagram.gif", DEFAULT_MAX_BYTES)
        .expect("valid test attachment")
}

fn arb_event() -> impl Strategy<Value = SessionEvent> {
    prop_oneof![
        Just(SessionEvent::AttachmentSelected {
            attachment: attachment()
        }),
        "[ a-z]{0,8}".prop_map(|language| SessionEvent::LanguageChanged { language }),
        Just(SessionEvent::AnalyzeRequested),
        "[ a-z?]{0,12}".prop_map(|text| SessionEvent::ChatSubmitted { text }),
        Just(SessionEvent::QuizRequested),
        (0u32..8, 0usize..6)
            .prop_map(|(question_id, option)| SessionEvent::AnswerSelected { question_id, option }),
        Just(SessionEvent::NextQuestion),
        Just(SessionEvent::PreviousQuestion),
        Just(SessionEvent::BackToSummary),
        Just(SessionEvent::SummaryFinished),
        (0u64..4).prop_map(|request_id| SessionEvent::QuizReady {
            request_id,
            outcome: QuizOutcome {
                quiz: Quiz::fallback(),
                warning: None,
            },
        }),
    ]
}

/// Phases reachable from `from` in one accepted transition
fn legal_successors(from: SessionPhase) -> &'static [SessionPhase] {
    use SessionPhase::*;
    match from {
        Idle => &[AwaitingAttachment, Analyzing],
        AwaitingAttachment => &[AwaitingAttachment, Analyzing],
        Analyzing => &[ResultsReady],
        ResultsReady => &[ResultsReady, QuizActive],
        QuizActive => &[QuizActive, QuizReview],
        QuizReview => &[QuizReview, QuizActive, ResultsReady],
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_only_documented_transitions(
        phase in arb_phase(),
        context in arb_context(),
        event in arb_event(),
    ) {
        if let Ok(result) = transition(phase, &context, event) {
            prop_assert!(
                legal_successors(phase).contains(&result.new_phase),
                "{phase} -> {}", result.new_phase
            );
        }
    }

    #[test]
    fn prop_transition_is_deterministic(
        phase in arb_phase(),
        context in arb_context(),
        event in arb_event(),
    ) {
        let first = transition(phase, &context, event.clone());
        let second = transition(phase, &context, event);
        match (first, second) {
            (Ok(a), Ok(b)) => {
                prop_assert_eq!(a.new_phase, b.new_phase);
                prop_assert_eq!(a.effects.len(), b.effects.len());
            }
            (Err(a), Err(b)) => prop_assert_eq!(a, b),
            _ => prop_assert!(false, "outcome differed between calls"),
        }
    }

    #[test]
    fn prop_no_second_reply_while_streaming(
        mut context in arb_context(),
        text in "[a-z]{1,10}",
    ) {
        context.reply_in_flight = true;
        let result = transition(SessionPhase::ResultsReady, &context, SessionEvent::ChatSubmitted { text });
        prop_assert_eq!(result.unwrap_err(), TransitionError::ReplyInFlight);
    }

    #[test]
    fn prop_no_second_quiz_request_while_pending(
        phase in prop_oneof![Just(SessionPhase::ResultsReady), Just(SessionPhase::QuizReview)],
        mut context in arb_context(),
        pending in 0u64..4,
    ) {
        context.quiz_pending = Some(pending);
        let result = transition(phase, &context, SessionEvent::QuizRequested);
        prop_assert_eq!(result.unwrap_err(), TransitionError::QuizPending);
    }

    #[test]
    fn prop_quiz_result_must_match_pending_request(
        phase in arb_phase(),
        context in arb_context(),
        request_id in 0u64..4,
    ) {
        let event = SessionEvent::QuizReady {
            request_id,
            outcome: QuizOutcome { quiz: Quiz::fallback(), warning: None },
        };
        if transition(phase, &context, event).is_ok() {
            prop_assert_eq!(context.quiz_pending, Some(request_id));
        }
    }

    #[test]
    fn prop_analyze_requires_attachment_and_language(context in arb_context()) {
        match transition(SessionPhase::AwaitingAttachment, &context, SessionEvent::AnalyzeRequested) {
            Ok(result) => {
                prop_assert!(context.has_attachment);
                prop_assert!(!context.language.trim().is_empty());
                prop_assert_eq!(result.new_phase, SessionPhase::Analyzing);
            }
            Err(TransitionError::Validation(
                ValidationError::MissingAttachment | ValidationError::EmptyLanguage,
            )) => {}
            Err(other) => prop_assert!(false, "unexpected rejection {other:?}"),
        }
    }

    #[test]
    fn prop_actions_agree_with_transition(phase in arb_phase(), context in arb_context()) {
        let actions = Actions::available(phase, &context);
        prop_assert_eq!(
            actions.generate_quiz,
            transition(phase, &context, SessionEvent::QuizRequested).is_ok()
        );
        prop_assert_eq!(
            actions.next_question,
            transition(phase, &context, SessionEvent::NextQuestion).is_ok()
        );
    }
}
