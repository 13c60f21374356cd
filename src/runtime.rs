//! Session runtime
//!
//! Each session runs as an actor task owning its phase, attachment,
//! conversation and quiz. Handlers talk to it over a command channel;
//! observers receive [`SessionUpdate`]s over a broadcast channel.

mod executor;

use crate::attachment::AttachmentInfo;
use crate::conversation::{ConversationChange, Message};
use crate::gateway::ModelGateway;
use crate::quiz::QuizSnapshot;
use crate::session::{Actions, SessionEvent, SessionPhase};
use executor::{Command, SessionRuntime};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};

/// Pushed to subscribers as the session changes
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionUpdate {
    /// Phase or available actions changed
    Phase { phase: SessionPhase, actions: Actions },
    /// One conversation store mutation
    Conversation { change: ConversationChange },
    Quiz { quiz: QuizSnapshot },
    /// Non-blocking notice, e.g. a fallback quiz was served
    Warning { message: String },
}

impl SessionUpdate {
    pub fn event_name(&self) -> &'static str {
        match self {
            SessionUpdate::Phase { .. } => "phase",
            SessionUpdate::Conversation { .. } => "conversation",
            SessionUpdate::Quiz { .. } => "quiz",
            SessionUpdate::Warning { .. } => "warning",
        }
    }
}

/// Full view of a session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: String,
    pub phase: SessionPhase,
    pub language: String,
    pub attachment: Option<AttachmentInfo>,
    pub messages: Vec<Message>,
    pub quiz: Option<QuizSnapshot>,
    pub quiz_pending: bool,
    pub warning: Option<String>,
    pub actions: Actions,
    pub model: String,
}

/// Result of dispatching a user action
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub session: SessionSnapshot,
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Session {0} has stopped")]
    Stopped(String),
}

/// Handle to a running session
#[derive(Clone)]
struct SessionHandle {
    command_tx: mpsc::Sender<Command>,
    updates: broadcast::Sender<SessionUpdate>,
    /// Milliseconds since the manager's epoch at the last request
    last_active: Arc<AtomicU64>,
}

impl SessionHandle {
    fn touch(&self, now_ms: u64) {
        self.last_active.store(now_ms, Ordering::Relaxed);
    }

    /// Held open by a stream subscriber, or used within `ttl_ms`
    fn is_live(&self, now_ms: u64, ttl_ms: u64) -> bool {
        self.updates.receiver_count() > 0
            || now_ms.saturating_sub(self.last_active.load(Ordering::Relaxed)) < ttl_ms
    }
}

/// Owns every live session
pub struct SessionManager {
    gateway: Arc<dyn ModelGateway>,
    sessions: RwLock<HashMap<String, SessionHandle>>,
    epoch: Instant,
}

impl SessionManager {
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self {
            gateway,
            sessions: RwLock::new(HashMap::new()),
            epoch: Instant::now(),
        }
    }

    /// Periodically discard sessions idle for longer than `ttl`. The task
    /// ends once the manager is dropped.
    pub fn spawn_reaper(manager: &Arc<Self>, ttl: Duration) {
        let weak = Arc::downgrade(manager);
        let period = (ttl / 2).max(Duration::from_millis(10));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Some(manager) = weak.upgrade() else {
                    break;
                };
                manager.reap_idle(ttl).await;
            }
        });
    }

    /// Discard every session with no stream subscriber and no request
    /// within `ttl`. Returns how many were discarded.
    pub async fn reap_idle(&self, ttl: Duration) -> usize {
        let now = self.now_ms();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, handle| {
            let live = handle.is_live(now, ttl_ms);
            if !live {
                tracing::info!(session_id = %id, "Idle session reaped");
            }
            live
        });
        let reaped = before - sessions.len();
        if reaped > 0 {
            tracing::debug!(reaped, remaining = sessions.len(), "Reaped idle sessions");
        }
        reaped
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Start a new session in `Idle`
    pub async fn create(&self) -> SessionSnapshot {
        let id = uuid::Uuid::new_v4().to_string();
        let (command_tx, command_rx) = mpsc::channel(32);
        let (broadcast_tx, _) = broadcast::channel(256);

        let handle = SessionHandle {
            command_tx,
            updates: broadcast_tx.clone(),
            last_active: Arc::new(AtomicU64::new(self.now_ms())),
        };
        let runtime = SessionRuntime::new(id.clone(), self.gateway.clone(), command_rx, broadcast_tx);
        let snapshot = runtime.snapshot();
        tokio::spawn(runtime.run());

        self.sessions.write().await.insert(id.clone(), handle);
        tracing::info!(session_id = %id, "Session created");
        snapshot
    }

    /// Discard a session. In-flight gateway calls run to completion but
    /// their output is dropped.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            tracing::info!(session_id = %id, "Session discarded");
        }
        removed
    }

    pub async fn dispatch(
        &self,
        id: &str,
        event: SessionEvent,
    ) -> Result<DispatchOutcome, RuntimeError> {
        self.request(id, |reply| Command::Dispatch { event, reply }).await
    }

    pub async fn snapshot(&self, id: &str) -> Result<SessionSnapshot, RuntimeError> {
        self.request(id, |reply| Command::Snapshot { reply }).await
    }

    /// Snapshot plus a receiver for every update after it
    pub async fn subscribe(
        &self,
        id: &str,
    ) -> Result<(SessionSnapshot, broadcast::Receiver<SessionUpdate>), RuntimeError> {
        self.request(id, |reply| Command::Subscribe { reply }).await
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn request<T>(
        &self,
        id: &str,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, RuntimeError> {
        let handle = self
            .sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))?;
        handle.touch(self.now_ms());

        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .command_tx
            .send(command(reply_tx))
            .await
            .map_err(|_| RuntimeError::Stopped(id.to_string()))?;
        reply_rx
            .await
            .map_err(|_| RuntimeError::Stopped(id.to_string()))
    }
}
