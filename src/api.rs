//! HTTP API
//!
//! Two families of routes: stateless gateway surfaces (`/api/analyze`,
//! `/api/quiz`) and session surfaces that host the study journey
//! server-side (`/api/sessions/...`).

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::gateway::ModelGateway;
use crate::runtime::SessionManager;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub gateway: Arc<dyn ModelGateway>,
    /// Largest decoded attachment accepted
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(gateway: Arc<dyn ModelGateway>, max_upload_bytes: usize) -> Self {
        Self {
            sessions: Arc::new(SessionManager::new(gateway.clone())),
            gateway,
            max_upload_bytes,
        }
    }

    /// Request body limit: base64 inflates by 4/3, plus room for the JSON
    /// envelope and chat history
    pub fn body_limit(&self) -> usize {
        self.max_upload_bytes
            .div_ceil(3)
            .saturating_mul(4)
            .saturating_add(1024 * 1024)
    }
}

#[cfg(test)]
mod tests;
