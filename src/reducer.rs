//! Streaming response reducer
//!
//! Folds one gateway stream into exactly one in-flight message. A reducer is
//! bound to a stream id and the id of the message it fills; anything else is
//! ignored, so a late event from an abandoned stream can never touch another
//! stream's message.

use crate::conversation::Conversation;
use crate::gateway::StreamEvent;
use crate::prompts;
use serde::Serialize;

/// Which call mode produced the stream. Picks the error text on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    Summary,
    Chat,
}

impl ReplyKind {
    pub fn error_text(self, reason: &str) -> String {
        match self {
            ReplyKind::Summary => prompts::summary_error_text(reason),
            ReplyKind::Chat => prompts::chat_error_text(reason),
        }
    }
}

/// Outcome of folding one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReducerStep {
    /// Fragment appended, stream still open
    Continue,
    /// End marker received, message closed
    Completed,
    /// Error marker received, partial text replaced by the error turn
    Failed { reason: String },
    /// Event did not belong to this reducer or arrived after termination
    Ignored,
}

impl ReducerStep {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReducerStep::Completed | ReducerStep::Failed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ReplyReducer {
    stream_id: u64,
    message_id: u64,
    kind: ReplyKind,
    finished: bool,
}

impl ReplyReducer {
    pub fn new(stream_id: u64, message_id: u64, kind: ReplyKind) -> Self {
        Self {
            stream_id,
            message_id,
            kind,
            finished: false,
        }
    }

    pub fn message_id(&self) -> u64 {
        self.message_id
    }

    pub fn kind(&self) -> ReplyKind {
        self.kind
    }

    /// Fold one event from stream `stream_id` into `conversation`
    pub fn apply(
        &mut self,
        conversation: &mut Conversation,
        stream_id: u64,
        event: StreamEvent,
    ) -> ReducerStep {
        if self.finished
            || stream_id != self.stream_id
            || conversation.in_flight_id() != Some(self.message_id)
        {
            return ReducerStep::Ignored;
        }

        match event {
            StreamEvent::Content { text } => match conversation.update_in_flight(&text) {
                Ok(()) => ReducerStep::Continue,
                Err(_) => ReducerStep::Ignored,
            },
            StreamEvent::Done => {
                self.finished = true;
                conversation.close_in_flight();
                ReducerStep::Completed
            }
            StreamEvent::Error { message } => {
                self.finished = true;
                match conversation.fail_in_flight(self.kind.error_text(&message)) {
                    Ok(_) => ReducerStep::Failed { reason: message },
                    Err(_) => ReducerStep::Ignored,
                }
            }
        }
    }
}
