//! Scripted gateway for tests

use super::{FragmentStream, GatewayError, GenerateRequest, ModelGateway};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

enum ScriptedStream {
    Fixed(Vec<Result<String, GatewayError>>),
    Live(mpsc::UnboundedReceiver<Result<String, GatewayError>>),
    OpenError(GatewayError),
}

/// Mock gateway that replays queued responses
#[derive(Default)]
pub struct MockGateway {
    streams: Mutex<VecDeque<ScriptedStream>>,
    once: Mutex<VecDeque<Result<String, GatewayError>>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<GenerateRequest>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a stream that yields `items` then ends
    pub fn queue_stream(&self, items: Vec<Result<String, GatewayError>>) {
        self.streams
            .lock()
            .unwrap()
            .push_back(ScriptedStream::Fixed(items));
    }

    /// Queue a stream driven by the test. Dropping the sender ends it cleanly.
    pub fn queue_live_stream(&self) -> mpsc::UnboundedSender<Result<String, GatewayError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.streams
            .lock()
            .unwrap()
            .push_back(ScriptedStream::Live(rx));
        tx
    }

    /// Queue a stream that fails before producing anything
    pub fn queue_open_error(&self, error: GatewayError) {
        self.streams
            .lock()
            .unwrap()
            .push_back(ScriptedStream::OpenError(error));
    }

    /// Queue a one-shot response
    pub fn queue_once(&self, response: Result<String, GatewayError>) {
        self.once.lock().unwrap().push_back(response);
    }

    pub fn recorded_requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelGateway for MockGateway {
    async fn stream_generate(
        &self,
        request: &GenerateRequest,
    ) -> Result<FragmentStream, GatewayError> {
        self.requests.lock().unwrap().push(request.clone());
        let scripted = self.streams.lock().unwrap().pop_front();
        match scripted {
            Some(ScriptedStream::Fixed(items)) => Ok(stream::iter(items).boxed()),
            Some(ScriptedStream::Live(rx)) => Ok(UnboundedReceiverStream::new(rx).boxed()),
            Some(ScriptedStream::OpenError(e)) => Err(e),
            None => Err(GatewayError::network("No mock stream queued")),
        }
    }

    async fn generate_once(&self, request: &GenerateRequest) -> Result<String, GatewayError> {
        self.requests.lock().unwrap().push(request.clone());
        self.once
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::network("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}
