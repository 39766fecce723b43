//! Server-Sent-Events framing and the transformer-driven chunk pipeline.
//!
//! [`SseParser`] is an incremental push parser: feed it body bytes as they
//! arrive and collect complete events. [`chunk_pipeline`] wraps a streaming
//! HTTP response with an adapter-supplied transformer that maps each event's
//! `data` payload to zero or one canonical [`Chunk`]s, delivering them over
//! a bounded channel.

use tokio::sync::mpsc;

use wh_domain::error::Result;
use wh_domain::response::Chunk;
use wh_domain::stream::ChunkStream;

use crate::util::from_reqwest;

/// Benign terminator payload used by OpenAI-style streams.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Output channel capacity: backpressure bound for slow consumers.
const PIPELINE_CAPACITY: usize = 100;

/// One parsed SSE event.
///
/// Only `event`, `data` and `id` are recognized; unknown fields (including
/// `retry`) are dropped during parsing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
    pub id: String,
}

impl SseEvent {
    /// An event is emitted only if it has non-empty `data` or `event`;
    /// id-only events are discarded.
    fn is_emittable(&self) -> bool {
        !self.data.is_empty() || !self.event.is_empty()
    }
}

#[derive(Default)]
struct PendingEvent {
    event: String,
    data_lines: Vec<String>,
    id: String,
}

impl PendingEvent {
    fn is_empty(&self) -> bool {
        self.event.is_empty() && self.data_lines.is_empty() && self.id.is_empty()
    }

    fn take(&mut self) -> SseEvent {
        let pending = std::mem::take(self);
        SseEvent {
            event: pending.event,
            // Multiple data fields in one event concatenate with newline.
            data: pending.data_lines.join("\n"),
            id: pending.id,
        }
    }
}

/// Incremental SSE parser.
#[derive(Default)]
pub struct SseParser {
    line_buf: Vec<u8>,
    pending: PendingEvent,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw body bytes; returns every event completed by this chunk.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        let mut out = Vec::new();
        for &b in bytes {
            if b == b'\n' {
                let line = std::mem::take(&mut self.line_buf);
                let line = String::from_utf8_lossy(&line);
                self.process_line(line.trim_end(), &mut out);
            } else {
                self.line_buf.push(b);
            }
        }
        out
    }

    /// End of stream: a pending event (including an unterminated trailing
    /// line) is flushed if emittable.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.line_buf.is_empty() {
            let line = std::mem::take(&mut self.line_buf);
            let line = String::from_utf8_lossy(&line).to_string();
            let mut out = Vec::new();
            self.process_line(line.trim_end(), &mut out);
            if let Some(event) = out.into_iter().next() {
                return Some(event);
            }
        }
        if self.pending.is_empty() {
            return None;
        }
        let event = self.pending.take();
        event.is_emittable().then_some(event)
    }

    fn process_line(&mut self, line: &str, out: &mut Vec<SseEvent>) {
        // Empty line terminates the current event.
        if line.is_empty() {
            if !self.pending.is_empty() {
                let event = self.pending.take();
                if event.is_emittable() {
                    out.push(event);
                }
            }
            return;
        }
        // A leading ':' marks a comment.
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.pending.event = value.to_string(),
            "data" => self.pending.data_lines.push(value.to_string()),
            "id" => self.pending.id = value.to_string(),
            // Unknown fields (including `retry`) are dropped.
            _ => {}
        }
    }
}

/// Serialize events back to the wire form (used by round-trip tests and
/// local fixtures).
pub fn serialize_events(events: &[SseEvent]) -> String {
    let mut out = String::new();
    for event in events {
        if !event.event.is_empty() {
            out.push_str("event: ");
            out.push_str(&event.event);
            out.push('\n');
        }
        if !event.id.is_empty() {
            out.push_str("id: ");
            out.push_str(&event.id);
            out.push('\n');
        }
        for line in event.data.split('\n') {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chunk pipeline
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Wrap a streaming response with a provider transformer.
///
/// The transformer maps each event's `data` payload to `Ok(Some(chunk))`,
/// `Ok(None)` for a benign skip (keep-alives, redundant terminal events),
/// or `Err` — delivered once, closing the output. The literal `[DONE]`
/// payload stops the pipeline. It is `FnMut` because some providers need
/// mutable state across events (tool-call assembly).
///
/// Dropping the returned stream cancels the producer task after the event
/// in flight: the bounded channel send fails and the task exits, closing
/// the response body.
pub fn chunk_pipeline<F>(response: reqwest::Response, provider: &str, mut transform: F) -> ChunkStream
where
    F: FnMut(&str) -> Result<Option<Chunk>> + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Result<Chunk>>(PIPELINE_CAPACITY);
    let provider = provider.to_string();

    tokio::spawn(async move {
        let mut parser = SseParser::new();
        let mut response = response;

        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    for event in parser.feed(&bytes) {
                        if !deliver(&tx, &mut transform, &event).await {
                            return;
                        }
                    }
                }
                Ok(None) => {
                    if let Some(event) = parser.finish() {
                        let _ = deliver(&tx, &mut transform, &event).await;
                    }
                    return;
                }
                Err(e) => {
                    let _ = tx.send(Err(from_reqwest(e).with_provider(&provider))).await;
                    return;
                }
            }
        }
    });

    Box::pin(async_stream::stream! {
        while let Some(item) = rx.recv().await {
            yield item;
        }
    })
}

/// Returns `false` when the pipeline should stop (terminator, transformer
/// error, or a dropped consumer).
async fn deliver<F>(
    tx: &mpsc::Sender<Result<Chunk>>,
    transform: &mut F,
    event: &SseEvent,
) -> bool
where
    F: FnMut(&str) -> Result<Option<Chunk>> + Send,
{
    if event.data == DONE_SENTINEL {
        return false;
    }
    match transform(&event.data) {
        Ok(Some(chunk)) => tx.send(Ok(chunk)).await.is_ok(),
        Ok(None) => true,
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}
