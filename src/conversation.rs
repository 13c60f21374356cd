//! Conversation store
//!
//! An ordered log of user and model turns. At most one message is in flight
//! (still receiving fragments) and it is always the tail of the log. Every
//! mutation notifies observers synchronously, one notification per call.

use crate::gateway::{ContextTurn, Role};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// One turn of the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    id: u64,
    role: Role,
    text: String,
    created_at: DateTime<Utc>,
    streaming: bool,
}

impl Message {
    fn new(id: u64, role: Role, text: String, streaming: bool) -> Self {
        Self {
            id,
            role,
            text,
            created_at: Utc::now(),
            streaming,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// True while this message is still receiving fragments
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }
}

/// A single store mutation, as seen by observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversationChange {
    /// Messages pushed onto the tail, in order
    Appended { messages: Vec<Message> },
    /// Text appended to the in-flight message
    Delta { id: u64, text: String },
    /// The in-flight message became immutable
    Closed { id: u64 },
    /// The in-flight message was overwritten and closed
    Replaced { message: Message },
}

/// Display observer notified on every mutation
pub trait ConversationObserver: Send + Sync {
    fn on_change(&self, change: &ConversationChange);
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversationError {
    #[error("message {id} is still in flight")]
    InFlight { id: u64 },
    #[error("no message is in flight")]
    NoInFlight,
    #[error("a conversation must start with a user message")]
    ModelFirst,
    #[error("the opening user message must be answered by the model first")]
    OpeningUnanswered,
}

pub struct Conversation {
    messages: Vec<Message>,
    next_id: u64,
    observers: Vec<Arc<dyn ConversationObserver>>,
}

impl fmt::Debug for Conversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversation")
            .field("messages", &self.messages)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            next_id: 1,
            observers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, observer: Arc<dyn ConversationObserver>) {
        self.observers.push(observer);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Id of the in-flight message, if any
    pub fn in_flight_id(&self) -> Option<u64> {
        self.messages
            .last()
            .filter(|m| m.streaming)
            .map(|m| m.id)
    }

    /// Append a complete (immutable) turn at the tail
    pub fn append_turn(
        &mut self,
        role: Role,
        text: impl Into<String>,
    ) -> Result<u64, ConversationError> {
        self.check_appendable(role)?;
        let message = self.allocate(role, text.into(), false);
        let id = message.id;
        self.messages.push(message.clone());
        self.notify(&ConversationChange::Appended {
            messages: vec![message],
        });
        Ok(id)
    }

    /// Push a user turn and an empty in-flight model placeholder in one
    /// update. Returns the placeholder id.
    pub fn begin_exchange(&mut self, user_text: impl Into<String>) -> Result<u64, ConversationError> {
        self.check_appendable(Role::User)?;
        let user = self.allocate(Role::User, user_text.into(), false);
        let placeholder = self.allocate(Role::Model, String::new(), true);
        let id = placeholder.id;
        self.messages.push(user.clone());
        self.messages.push(placeholder.clone());
        self.notify(&ConversationChange::Appended {
            messages: vec![user, placeholder],
        });
        Ok(id)
    }

    /// Append `delta` to the in-flight message
    pub fn update_in_flight(&mut self, delta: &str) -> Result<(), ConversationError> {
        let tail = self.in_flight_mut()?;
        tail.text.push_str(delta);
        let change = ConversationChange::Delta {
            id: tail.id,
            text: delta.to_string(),
        };
        self.notify(&change);
        Ok(())
    }

    /// Make the in-flight message immutable. A second call is a no-op and
    /// returns `None`.
    pub fn close_in_flight(&mut self) -> Option<u64> {
        let tail = self.in_flight_mut().ok()?;
        tail.streaming = false;
        let id = tail.id;
        self.notify(&ConversationChange::Closed { id });
        Some(id)
    }

    /// Overwrite whatever the in-flight message accumulated with `text`
    /// and close it
    pub fn fail_in_flight(&mut self, text: impl Into<String>) -> Result<u64, ConversationError> {
        let tail = self.in_flight_mut()?;
        tail.text = text.into();
        tail.streaming = false;
        let message = tail.clone();
        let id = message.id;
        self.notify(&ConversationChange::Replaced { message });
        Ok(id)
    }

    /// `{role, text}` projection of the full log, in order
    pub fn to_context_history(&self) -> Vec<ContextTurn> {
        self.messages
            .iter()
            .map(|m| ContextTurn {
                role: m.role,
                text: m.text.clone(),
            })
            .collect()
    }

    fn check_appendable(&self, role: Role) -> Result<(), ConversationError> {
        if let Some(id) = self.in_flight_id() {
            return Err(ConversationError::InFlight { id });
        }
        match (self.messages.len(), role) {
            (0, Role::Model) => return Err(ConversationError::ModelFirst),
            (1, Role::User) => return Err(ConversationError::OpeningUnanswered),
            _ => {}
        }
        Ok(())
    }

    fn allocate(&mut self, role: Role, text: String, streaming: bool) -> Message {
        let id = self.next_id;
        self.next_id = id + 1;
        Message::new(id, role, text, streaming)
    }

    fn in_flight_mut(&mut self) -> Result<&mut Message, ConversationError> {
        self.messages
            .last_mut()
            .filter(|m| m.streaming)
            .ok_or(ConversationError::NoInFlight)
    }

    fn notify(&self, change: &ConversationChange) {
        for observer in &self.observers {
            observer.on_change(change);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ConversationChange>>);

    impl ConversationObserver for Recorder {
        fn on_change(&self, change: &ConversationChange) {
            self.0.lock().unwrap().push(change.clone());
        }
    }

    impl Recorder {
        fn changes(&self) -> Vec<ConversationChange> {
            self.0.lock().unwrap().clone()
        }
    }

    #[test]
    fn test_begin_exchange_is_one_notification() {
        let recorder = Arc::new(Recorder::default());
        let mut conversation = Conversation::new();
        conversation.subscribe(recorder.clone());

        let placeholder = conversation.begin_exchange("What is photosynthesis?").unwrap();

        assert_eq!(conversation.messages().len(), 2);
        assert_eq!(conversation.in_flight_id(), Some(placeholder));
        let changes = recorder.changes();
        assert_eq!(changes.len(), 1);
        match &changes[0] {
            ConversationChange::Appended { messages } => {
                assert_eq!(messages.len(), 2);
                assert_eq!(messages[0].role(), Role::User);
                assert_eq!(messages[1].role(), Role::Model);
                assert_eq!(messages[1].text(), "");
                assert!(messages[1].is_streaming());
            }
            other => panic!("unexpected change {other:?}"),
        }
    }

    #[test]
    fn test_update_and_close() {
        let recorder = Arc::new(Recorder::default());
        let mut conversation = Conversation::new();
        conversation.subscribe(recorder.clone());
        let id = conversation.begin_exchange("hi").unwrap();

        conversation.update_in_flight("Hel").unwrap();
        conversation.update_in_flight("lo").unwrap();
        assert_eq!(conversation.close_in_flight(), Some(id));
        assert_eq!(conversation.close_in_flight(), None);

        assert_eq!(conversation.messages()[1].text(), "Hello");
        assert!(!conversation.messages()[1].is_streaming());
        assert_eq!(recorder.changes().len(), 4);
        assert_eq!(
            conversation.update_in_flight("late"),
            Err(ConversationError::NoInFlight)
        );
    }

    #[test]
    fn test_single_in_flight_message() {
        let mut conversation = Conversation::new();
        let id = conversation.begin_exchange("one").unwrap();
        assert_eq!(
            conversation.begin_exchange("two"),
            Err(ConversationError::InFlight { id })
        );
        assert_eq!(
            conversation.append_turn(Role::User, "three"),
            Err(ConversationError::InFlight { id })
        );
    }

    #[test]
    fn test_model_cannot_open_conversation() {
        let mut conversation = Conversation::new();
        assert_eq!(
            conversation.append_turn(Role::Model, "hello"),
            Err(ConversationError::ModelFirst)
        );
        assert!(conversation.messages().is_empty());
    }

    #[test]
    fn test_opening_turns_alternate() {
        let mut conversation = Conversation::new();
        conversation.append_turn(Role::User, "one").unwrap();
        assert_eq!(
            conversation.append_turn(Role::User, "two"),
            Err(ConversationError::OpeningUnanswered)
        );
        assert_eq!(
            conversation.begin_exchange("two"),
            Err(ConversationError::OpeningUnanswered)
        );
        conversation.append_turn(Role::Model, "answer").unwrap();
        conversation.append_turn(Role::User, "follow-up").unwrap();

        let roles: Vec<_> = conversation.messages().iter().map(Message::role).collect();
        assert_eq!(roles, vec![Role::User, Role::Model, Role::User]);
    }

    #[test]
    fn test_fail_replaces_partial_text() {
        let mut conversation = Conversation::new();
        conversation.begin_exchange("q").unwrap();
        conversation.update_in_flight("partial ans").unwrap();
        conversation.fail_in_flight("Sorry").unwrap();

        assert_eq!(conversation.messages()[1].text(), "Sorry");
        assert_eq!(conversation.in_flight_id(), None);
    }

    #[test]
    fn test_context_history_preserves_order() {
        let mut conversation = Conversation::new();
        conversation.begin_exchange("q1").unwrap();
        conversation.update_in_flight("a1").unwrap();
        conversation.close_in_flight();
        conversation.begin_exchange("q2").unwrap();
        conversation.update_in_flight("a2").unwrap();
        conversation.close_in_flight();

        assert_eq!(
            conversation.to_context_history(),
            vec![
                ContextTurn::user("q1"),
                ContextTurn::model("a1"),
                ContextTurn::user("q2"),
                ContextTurn::model("a2"),
            ]
        );
    }

    #[derive(Debug, Clone)]
    enum Op {
        Append(bool),
        Exchange,
        Delta(String),
        Close,
        Fail,
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            any::<bool>().prop_map(Op::Append),
            Just(Op::Exchange),
            "[a-z ]{0,8}".prop_map(Op::Delta),
            Just(Op::Close),
            Just(Op::Fail),
        ]
    }

    proptest! {
        #[test]
        fn prop_ids_increase_and_opening_alternates(ops in proptest::collection::vec(arb_op(), 0..40)) {
            let mut conversation = Conversation::new();
            for op in ops {
                let _ = match op {
                    Op::Append(user) => {
                        let role = if user { Role::User } else { Role::Model };
                        conversation.append_turn(role, "t").map(|_| ())
                    }
                    Op::Exchange => conversation.begin_exchange("q").map(|_| ()),
                    Op::Delta(d) => conversation.update_in_flight(&d),
                    Op::Close => {
                        conversation.close_in_flight();
                        Ok(())
                    }
                    Op::Fail => conversation.fail_in_flight("err").map(|_| ()),
                };
            }

            let messages = conversation.messages();
            for pair in messages.windows(2) {
                prop_assert!(pair[0].id() < pair[1].id());
            }
            if let Some(first) = messages.first() {
                prop_assert_eq!(first.role(), Role::User);
            }
            if let Some(second) = messages.get(1) {
                prop_assert_eq!(second.role(), Role::Model);
            }
            let streaming = messages.iter().filter(|m| m.is_streaming()).count();
            prop_assert!(streaming <= 1);
            if streaming == 1 {
                prop_assert!(messages.last().is_some_and(Message::is_streaming));
            }
        }
    }
}
