// ABOUTME: Progress stream consumption for build and pull output.
// ABOUTME: Renders event dicts to a text sink and surfaces in-stream errors.

use std::io;

use futures::StreamExt;
use serde_json::Value;
use thiserror::Error;

use crate::runtime::{ApiError, EventStream};

/// A failure reported while draining a progress stream.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The daemon put an error frame on the stream.
    #[error("{0}")]
    Event(String),

    /// The stream itself broke.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Receives human-readable progress frames.
pub trait ProgressSink: Send {
    fn frame(&mut self, text: &str);
}

impl<W: io::Write + Send> ProgressSink for W {
    fn frame(&mut self, text: &str) {
        let _ = self.write_all(text.as_bytes());
    }
}

/// Drain a build/pull event stream, forwarding frames to the sink, and return
/// every event seen. Stops at the first error frame or transport failure.
pub async fn stream_output(
    mut events: EventStream,
    sink: &mut dyn ProgressSink,
) -> Result<Vec<Value>, StreamError> {
    let mut seen = Vec::new();

    while let Some(item) = events.next().await {
        let event = item?;

        if let Some(error) = event_error(&event) {
            return Err(StreamError::Event(error));
        }

        if let Some(frame) = render(&event) {
            sink.frame(&frame);
        }

        seen.push(event);
    }

    Ok(seen)
}

fn event_error(event: &Value) -> Option<String> {
    let error = event.get("error")?;
    Some(
        error
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
    )
}

fn render(event: &Value) -> Option<String> {
    if let Some(stream) = event.get("stream").and_then(Value::as_str) {
        return Some(stream.to_string());
    }

    let status = event.get("status").and_then(Value::as_str)?;
    match event.get("id").and_then(Value::as_str) {
        Some(id) => Some(format!("{id}: {status}\n")),
        None => Some(format!("{status}\n")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use serde_json::json;

    fn stream_of(events: Vec<Value>) -> EventStream {
        Box::pin(stream::iter(events.into_iter().map(Ok)))
    }

    #[tokio::test]
    async fn collects_events_and_renders_frames() {
        let mut sink: Vec<u8> = Vec::new();
        let events = stream_of(vec![
            json!({"stream": "Step 1/2 : FROM debian\n"}),
            json!({"status": "Downloading", "id": "abc123"}),
            json!({"status": "Pull complete"}),
        ]);

        let seen = stream_output(events, &mut sink).await.expect("stream ok");
        assert_eq!(seen.len(), 3);

        let text = String::from_utf8(sink).expect("utf8");
        assert!(text.contains("Step 1/2 : FROM debian"));
        assert!(text.contains("abc123: Downloading"));
        assert!(text.contains("Pull complete"));
    }

    #[tokio::test]
    async fn error_frames_stop_the_stream() {
        let mut sink: Vec<u8> = Vec::new();
        let events = stream_of(vec![
            json!({"stream": "Step 1/2 : FROM debian\n"}),
            json!({"error": "Something went wrong"}),
            json!({"stream": "never reached"}),
        ]);

        let err = stream_output(events, &mut sink)
            .await
            .expect_err("error frame should fail the stream");
        assert!(matches!(err, StreamError::Event(msg) if msg == "Something went wrong"));
    }

    #[tokio::test]
    async fn transport_errors_propagate() {
        let mut sink: Vec<u8> = Vec::new();
        let events: EventStream = Box::pin(stream::iter(vec![
            Ok(json!({"status": "ok"})),
            Err(ApiError::Transport("connection reset".to_string())),
        ]));

        let err = stream_output(events, &mut sink)
            .await
            .expect_err("transport failure should fail the stream");
        assert!(matches!(err, StreamError::Api(_)));
    }
}
