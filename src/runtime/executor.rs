//! Session actor: applies transitions and executes their effects

use super::{DispatchOutcome, SessionSnapshot, SessionUpdate};
use crate::attachment::Attachment;
use crate::conversation::{Conversation, ConversationChange, ConversationObserver};
use crate::gateway::{self, GenerateRequest, ModelGateway, StreamEvent};
use crate::prompts;
use crate::quiz::{self, QuizOutcome, QuizSession, QuizStep};
use crate::reducer::{ReducerStep, ReplyKind, ReplyReducer};
use crate::session::{
    transition, Actions, Effect, QuizPosition, SessionContext, SessionEvent, SessionPhase,
    TransitionError,
};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Requests from handlers
pub(super) enum Command {
    Dispatch {
        event: SessionEvent,
        reply: oneshot::Sender<DispatchOutcome>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Subscribe {
        reply: oneshot::Sender<(SessionSnapshot, broadcast::Receiver<SessionUpdate>)>,
    },
}

/// Results from background gateway work
enum Completion {
    Reply { stream_id: u64, event: StreamEvent },
    Quiz { request_id: u64, outcome: QuizOutcome },
}

/// Forwards conversation mutations to subscribers as they happen
struct BroadcastObserver {
    tx: broadcast::Sender<SessionUpdate>,
}

impl ConversationObserver for BroadcastObserver {
    fn on_change(&self, change: &ConversationChange) {
        // No subscribers is fine
        let _ = self.tx.send(SessionUpdate::Conversation {
            change: change.clone(),
        });
    }
}

pub(super) struct SessionRuntime {
    id: String,
    gateway: Arc<dyn ModelGateway>,
    phase: SessionPhase,
    attachment: Option<Attachment>,
    language: String,
    conversation: Conversation,
    reducer: Option<ReplyReducer>,
    quiz: Option<QuizSession>,
    quiz_pending: Option<u64>,
    next_quiz_request: u64,
    next_stream_id: u64,
    warning: Option<String>,
    commands: mpsc::Receiver<Command>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    broadcast_tx: broadcast::Sender<SessionUpdate>,
    last_status: Option<(SessionPhase, Actions)>,
}

impl SessionRuntime {
    pub(super) fn new(
        id: String,
        gateway: Arc<dyn ModelGateway>,
        commands: mpsc::Receiver<Command>,
        broadcast_tx: broadcast::Sender<SessionUpdate>,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let mut conversation = Conversation::new();
        conversation.subscribe(Arc::new(BroadcastObserver {
            tx: broadcast_tx.clone(),
        }));

        Self {
            id,
            gateway,
            phase: SessionPhase::Idle,
            attachment: None,
            language: String::new(),
            conversation,
            reducer: None,
            quiz: None,
            quiz_pending: None,
            next_quiz_request: 1,
            next_stream_id: 1,
            warning: None,
            commands,
            completion_tx,
            completion_rx,
            broadcast_tx,
            last_status: None,
        }
    }

    pub(super) async fn run(mut self) {
        tracing::debug!(session_id = %self.id, "Session runtime started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    // Every handle dropped: the session was discarded
                    None => break,
                },
                Some(completion) = self.completion_rx.recv() => {
                    self.handle_completion(completion);
                }
            }
        }

        tracing::debug!(session_id = %self.id, "Session runtime stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Dispatch { event, reply } => {
                let result = self.process(event);
                let outcome = DispatchOutcome {
                    applied: result.is_ok(),
                    reason: result.err().map(|e| e.to_string()),
                    session: self.snapshot(),
                };
                let _ = reply.send(outcome);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Subscribe { reply } => {
                let rx = self.broadcast_tx.subscribe();
                let _ = reply.send((self.snapshot(), rx));
            }
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Reply { stream_id, event } => self.fold_reply(stream_id, event),
            Completion::Quiz {
                request_id,
                outcome,
            } => {
                if let Err(e) = self.process(SessionEvent::QuizReady {
                    request_id,
                    outcome,
                }) {
                    tracing::debug!(session_id = %self.id, request_id, error = %e, "Discarding quiz result");
                }
            }
        }
    }

    /// Run one event through the state machine, including any follow-up
    /// events its effects produce
    fn process(&mut self, event: SessionEvent) -> Result<(), TransitionError> {
        let mut pending = vec![event];
        let mut first = true;

        while let Some(event) = pending.pop() {
            let event_name = event.name();
            let result = match transition(self.phase, &self.context(), event) {
                Ok(result) => result,
                Err(e) if first => {
                    tracing::debug!(
                        session_id = %self.id,
                        phase = %self.phase,
                        event = event_name,
                        reason = %e,
                        "Transition rejected"
                    );
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        session_id = %self.id,
                        phase = %self.phase,
                        event = event_name,
                        reason = %e,
                        "Follow-up transition rejected"
                    );
                    continue;
                }
            };
            first = false;

            let old_phase = std::mem::replace(&mut self.phase, result.new_phase);
            if old_phase != self.phase {
                tracing::info!(
                    session_id = %self.id,
                    from = %old_phase,
                    to = %self.phase,
                    event = event_name,
                    "Phase changed"
                );
            }

            for effect in result.effects {
                if let Some(follow_up) = self.execute_effect(effect) {
                    pending.push(follow_up);
                }
            }
        }

        self.publish_status();
        Ok(())
    }

    fn execute_effect(&mut self, effect: Effect) -> Option<SessionEvent> {
        match effect {
            Effect::StoreAttachment { attachment } => {
                tracing::info!(
                    session_id = %self.id,
                    document = %attachment.display_name(),
                    mime_type = %attachment.mime_type(),
                    size = attachment.size(),
                    "Attachment stored"
                );
                self.attachment = Some(attachment);
                None
            }

            Effect::StoreLanguage { language } => {
                self.language = language;
                None
            }

            Effect::StartSummary => self.start_summary(),

            Effect::StartChatReply { text } => {
                self.start_chat_reply(text);
                None
            }

            Effect::RequestQuiz { request_id } => {
                self.request_quiz(request_id);
                None
            }

            Effect::InstallQuiz { outcome } => {
                self.quiz_pending = None;
                self.quiz = Some(QuizSession::new(outcome.quiz));
                self.warning = outcome.warning;
                self.publish_quiz();
                if let Some(message) = &self.warning {
                    let _ = self.broadcast_tx.send(SessionUpdate::Warning {
                        message: message.clone(),
                    });
                }
                None
            }

            Effect::RecordAnswer {
                question_id,
                option,
            } => {
                if let Some(quiz) = self.quiz.as_mut() {
                    if let Err(e) = quiz.select_answer(question_id, option) {
                        tracing::warn!(session_id = %self.id, error = %e, "Answer not recorded");
                    }
                }
                self.publish_quiz();
                None
            }

            Effect::AdvanceQuiz => {
                if let Some(quiz) = self.quiz.as_mut() {
                    match quiz.next() {
                        Ok(QuizStep::Finished { score }) => tracing::info!(
                            session_id = %self.id,
                            score,
                            total = quiz.questions().len(),
                            "Quiz completed"
                        ),
                        Ok(QuizStep::Moved { .. }) => {}
                        Err(e) => tracing::warn!(session_id = %self.id, error = %e, "Quiz did not advance"),
                    }
                }
                self.publish_quiz();
                None
            }

            Effect::RetreatQuiz => {
                if let Some(quiz) = self.quiz.as_mut() {
                    quiz.previous();
                }
                self.publish_quiz();
                None
            }
        }
    }

    /// Push the initial exchange and stream the summary into its
    /// placeholder. Returns a failed completion if the exchange cannot be
    /// opened, so the session never stays in `Analyzing`.
    fn start_summary(&mut self) -> Option<SessionEvent> {
        let Some(attachment) = self.attachment.clone() else {
            tracing::error!(session_id = %self.id, "Summary requested without an attachment");
            return Some(SessionEvent::SummaryFinished);
        };

        let user_text = prompts::initial_user_message(attachment.display_name(), &self.language);
        let message_id = match self.conversation.begin_exchange(user_text) {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(session_id = %self.id, error = %e, "Could not open summary exchange");
                return Some(SessionEvent::SummaryFinished);
            }
        };

        let request = GenerateRequest::new(prompts::summary_prompt(&self.language))
            .with_attachment(attachment.inline_data());
        self.start_stream(message_id, ReplyKind::Summary, request);
        None
    }

    fn start_chat_reply(&mut self, text: String) {
        // Context is taken before the new turn; the new text is the prompt
        let history = self.conversation.to_context_history();
        let message_id = match self.conversation.begin_exchange(text.clone()) {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(session_id = %self.id, error = %e, "Could not open chat exchange");
                return;
            }
        };

        let mut request = GenerateRequest::new(text).with_history(history);
        if let Some(attachment) = &self.attachment {
            request = request.with_attachment(attachment.inline_data());
        }
        self.start_stream(message_id, ReplyKind::Chat, request);
    }

    fn start_stream(&mut self, message_id: u64, kind: ReplyKind, request: GenerateRequest) {
        let stream_id = self.next_stream_id;
        self.next_stream_id += 1;
        self.reducer = Some(ReplyReducer::new(stream_id, message_id, kind));

        let model = self.gateway.clone();
        let completion_tx = self.completion_tx.clone();
        let session_id = self.id.clone();

        tracing::info!(session_id = %session_id, stream_id, message_id, kind = ?kind, "Starting reply stream");

        tokio::spawn(async move {
            let mut events = gateway::open_events(model.as_ref(), &request).await;
            while let Some(event) = events.next().await {
                if completion_tx
                    .send(Completion::Reply { stream_id, event })
                    .is_err()
                {
                    // Session discarded; let the upstream call finish unobserved
                    tracing::debug!(session_id = %session_id, stream_id, "Dropping stream for discarded session");
                    return;
                }
            }
        });
    }

    fn fold_reply(&mut self, stream_id: u64, event: StreamEvent) {
        let Some(reducer) = self.reducer.as_mut() else {
            tracing::debug!(session_id = %self.id, stream_id, "No reply in flight, ignoring fragment");
            return;
        };

        let step = reducer.apply(&mut self.conversation, stream_id, event);
        let kind = reducer.kind();
        let message_id = reducer.message_id();

        if step == ReducerStep::Ignored {
            tracing::debug!(session_id = %self.id, stream_id, "Ignored event from foreign stream");
        }
        if !step.is_terminal() {
            return;
        }

        self.reducer = None;
        if let ReducerStep::Failed { reason } = &step {
            tracing::warn!(session_id = %self.id, stream_id, message_id, kind = ?kind, reason = %reason, "Reply stream failed");
        } else {
            tracing::info!(session_id = %self.id, stream_id, message_id, kind = ?kind, "Reply stream completed");
        }

        if kind == ReplyKind::Summary {
            if let Err(e) = self.process(SessionEvent::SummaryFinished) {
                tracing::warn!(session_id = %self.id, error = %e, "Summary completion rejected");
            }
        } else {
            self.publish_status();
        }
    }

    fn request_quiz(&mut self, request_id: u64) {
        let Some(attachment) = self.attachment.clone() else {
            return;
        };
        self.quiz_pending = Some(request_id);
        self.next_quiz_request = request_id + 1;

        let model = self.gateway.clone();
        let completion_tx = self.completion_tx.clone();
        tracing::info!(session_id = %self.id, request_id, "Requesting quiz");

        tokio::spawn(async move {
            let outcome = quiz::generate_quiz_or_fallback(model.as_ref(), &attachment).await;
            let _ = completion_tx.send(Completion::Quiz {
                request_id,
                outcome,
            });
        });
    }

    fn context(&self) -> SessionContext {
        SessionContext {
            has_attachment: self.attachment.is_some(),
            language: self.language.clone(),
            reply_in_flight: self.reducer.is_some() || self.conversation.in_flight_id().is_some(),
            quiz_pending: self.quiz_pending,
            next_quiz_request: self.next_quiz_request,
            quiz: self.quiz.as_ref().map(|q| QuizPosition {
                index: q.current_index(),
                len: q.questions().len(),
                completed: q.is_completed(),
            }),
        }
    }

    /// Broadcast phase and actions if either changed since the last update
    fn publish_status(&mut self) {
        let status = (self.phase, Actions::available(self.phase, &self.context()));
        if self.last_status != Some(status) {
            self.last_status = Some(status);
            let _ = self.broadcast_tx.send(SessionUpdate::Phase {
                phase: status.0,
                actions: status.1,
            });
        }
    }

    fn publish_quiz(&self) {
        if let Some(quiz) = &self.quiz {
            let _ = self.broadcast_tx.send(SessionUpdate::Quiz {
                quiz: quiz.snapshot(),
            });
        }
    }

    pub(super) fn snapshot(&self) -> SessionSnapshot {
        let context = self.context();
        SessionSnapshot {
            id: self.id.clone(),
            phase: self.phase,
            language: self.language.clone(),
            attachment: self.attachment.as_ref().map(Attachment::info),
            messages: self.conversation.messages().to_vec(),
            quiz: self.quiz.as_ref().map(QuizSession::snapshot),
            quiz_pending: self.quiz_pending.is_some(),
            warning: self.warning.clone(),
            actions: Actions::available(self.phase, &context),
            model: self.gateway.model_id().to_string(),
        }
    }
}
