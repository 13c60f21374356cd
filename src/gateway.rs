//! Model gateway abstraction
//!
//! The generative model is an external collaborator. It either streams text
//! fragments or returns one final text blob.

mod config;
mod error;
mod gemini;
#[cfg(test)]
pub mod testing;
mod types;

pub use config::{build_gateway, GatewayConfig};
pub use error::GatewayError;
pub use gemini::GeminiGateway;
pub use types::*;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;

/// Ordered text fragments. The stream ending means the model finished;
/// an `Err` item is terminal.
pub type FragmentStream = BoxStream<'static, Result<String, GatewayError>>;

/// Common interface for model providers
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Start a streamed generation. Fragments come back in submission order.
    async fn stream_generate(&self, request: &GenerateRequest)
        -> Result<FragmentStream, GatewayError>;

    /// Make a single non-streamed generation and return the raw text
    async fn generate_once(&self, request: &GenerateRequest) -> Result<String, GatewayError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

#[async_trait]
impl<T: ModelGateway + ?Sized> ModelGateway for Arc<T> {
    async fn stream_generate(
        &self,
        request: &GenerateRequest,
    ) -> Result<FragmentStream, GatewayError> {
        (**self).stream_generate(request).await
    }

    async fn generate_once(&self, request: &GenerateRequest) -> Result<String, GatewayError> {
        (**self).generate_once(request).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

/// Turn a fragment stream into content events closed by exactly one
/// `Done` or `Error` marker.
pub fn into_events(fragments: FragmentStream) -> BoxStream<'static, StreamEvent> {
    stream::unfold(Some(fragments), |state| async move {
        let mut fragments = state?;
        match fragments.next().await {
            Some(Ok(text)) => Some((StreamEvent::content(text), Some(fragments))),
            Some(Err(e)) => Some((StreamEvent::error(e.message), None)),
            None => Some((StreamEvent::Done, None)),
        }
    })
    .boxed()
}

/// Start a streamed generation and expose it as marker-terminated events.
/// A failure to start becomes a single `Error` event.
pub async fn open_events(
    gateway: &dyn ModelGateway,
    request: &GenerateRequest,
) -> BoxStream<'static, StreamEvent> {
    match gateway.stream_generate(request).await {
        Ok(fragments) => into_events(fragments),
        Err(e) => stream::once(async move { StreamEvent::error(e.message) }).boxed(),
    }
}

/// Logging wrapper for gateways
pub struct LoggingGateway {
    inner: Arc<dyn ModelGateway>,
    model_id: String,
}

impl LoggingGateway {
    pub fn new(inner: Arc<dyn ModelGateway>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl ModelGateway for LoggingGateway {
    async fn stream_generate(
        &self,
        request: &GenerateRequest,
    ) -> Result<FragmentStream, GatewayError> {
        let start = std::time::Instant::now();
        let result = self.inner.stream_generate(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(_) => tracing::info!(
                model = %self.model_id,
                duration_ms = %duration.as_millis(),
                history_turns = request.history.len(),
                has_attachment = request.attachment.is_some(),
                "Gateway stream opened"
            ),
            Err(e) => tracing::error!(
                model = %self.model_id,
                duration_ms = %duration.as_millis(),
                error = %e.message,
                transient = e.kind.is_transient(),
                "Gateway stream failed to open"
            ),
        }

        result
    }

    async fn generate_once(&self, request: &GenerateRequest) -> Result<String, GatewayError> {
        let start = std::time::Instant::now();
        let result = self.inner.generate_once(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(text) => tracing::info!(
                model = %self.model_id,
                duration_ms = %duration.as_millis(),
                response_len = text.len(),
                "Gateway request completed"
            ),
            Err(e) => tracing::error!(
                model = %self.model_id,
                duration_ms = %duration.as_millis(),
                error = %e.message,
                transient = e.kind.is_transient(),
                "Gateway request failed"
            ),
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Stand-in used when no credentials are configured; every call fails
pub struct UnconfiguredGateway;

#[async_trait]
impl ModelGateway for UnconfiguredGateway {
    async fn stream_generate(
        &self,
        _request: &GenerateRequest,
    ) -> Result<FragmentStream, GatewayError> {
        Err(GatewayError::auth("No model credentials configured (set GEMINI_API_KEY)"))
    }

    async fn generate_once(&self, _request: &GenerateRequest) -> Result<String, GatewayError> {
        Err(GatewayError::auth("No model credentials configured (set GEMINI_API_KEY)"))
    }

    fn model_id(&self) -> &str {
        "unconfigured"
    }
}
