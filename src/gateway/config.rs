//! Gateway configuration

use super::{GeminiGateway, LoggingGateway, ModelGateway, UnconfiguredGateway};
use std::sync::Arc;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Configuration for the model gateway
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub api_key: Option<String>,
    /// Proxy base URL; when set the proxy handles authentication
    pub gateway: Option<String>,
    pub model: Option<String>,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("GEMINI_API_KEY").ok(),
            gateway: std::env::var("LLM_GATEWAY").ok(),
            model: std::env::var("GEMINI_MODEL").ok(),
        }
    }

    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(DEFAULT_MODEL)
    }

    /// Credential to present, if any. Gateway mode uses an implicit key.
    fn credential(&self) -> Option<String> {
        if self.gateway.is_some() {
            return Some("implicit".to_string());
        }
        self.api_key.clone().filter(|k| !k.trim().is_empty())
    }
}

/// Build the gateway described by `config`, wrapped with logging.
///
/// Without credentials the result is a gateway that fails every call, so
/// summaries surface an error turn and quizzes fall back.
pub fn build_gateway(config: &GatewayConfig) -> Arc<dyn ModelGateway> {
    let Some(api_key) = config.credential() else {
        tracing::warn!("No model credentials configured. Set GEMINI_API_KEY or LLM_GATEWAY.");
        return Arc::new(UnconfiguredGateway);
    };

    match GeminiGateway::new(api_key, config.model(), config.gateway.as_deref()) {
        Ok(gemini) => Arc::new(LoggingGateway::new(Arc::new(gemini))),
        Err(e) => {
            tracing::error!(error = %e, "Failed to create Gemini gateway");
            Arc::new(UnconfiguredGateway)
        }
    }
}
