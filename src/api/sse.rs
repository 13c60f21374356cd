//! Server-Sent Events support

use crate::gateway::StreamEvent;
use crate::runtime::{SessionSnapshot, SessionUpdate};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{BoxStream, Stream};
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

fn keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(Duration::from_secs(15))
        .text("ping")
}

/// Session stream: an `init` snapshot, then every update as it happens.
///
/// A subscriber that falls behind gets a `lagged` event and should re-fetch
/// the snapshot.
pub fn session_stream(
    snapshot: SessionSnapshot,
    updates: broadcast::Receiver<SessionUpdate>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let init = futures::stream::once(async move {
        Ok::<_, Infallible>(named_event(
            "init",
            &json!({ "type": "init", "session": snapshot }),
        ))
    });

    let updates = BroadcastStream::new(updates).map(|result| match result {
        Ok(update) => Ok::<_, Infallible>(named_event(update.event_name(), &update)),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => Ok(named_event(
            "lagged",
            &json!({ "type": "lagged", "skipped": skipped }),
        )),
    });

    Sse::new(init.chain(updates)).keep_alive(keep_alive())
}

/// Stateless reply stream: unnamed `data:` events carrying
/// `{"type":"content","content":...}` then one terminal `done` or `error`
pub fn reply_stream(
    events: BoxStream<'static, StreamEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = events.map(|event| {
        let data = match event {
            StreamEvent::Content { text } => json!({ "type": "content", "content": text }),
            StreamEvent::Done => json!({ "type": "done" }),
            StreamEvent::Error { message } => json!({ "type": "error", "message": message }),
        };
        Ok::<_, Infallible>(Event::default().data(data.to_string()))
    });

    Sse::new(stream).keep_alive(keep_alive())
}

fn named_event<T: serde::Serialize>(name: &str, data: &T) -> Event {
    match serde_json::to_string(data) {
        Ok(json) => Event::default().event(name).data(json),
        Err(e) => {
            tracing::error!(event = name, error = %e, "Failed to serialize SSE payload");
            Event::default()
                .event("error")
                .data(json!({ "type": "error", "message": e.to_string() }).to_string())
        }
    }
}
