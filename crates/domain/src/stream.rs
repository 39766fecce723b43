use std::collections::HashMap;
use std::pin::Pin;

use crate::error::Result;
use crate::response::{Chunk, TextResponse};
use crate::tool::ToolCall;

/// A boxed async stream, used for streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// The item stream every streaming call returns.
pub type ChunkStream = BoxStream<'static, Result<Chunk>>;

/// Compose a final [`TextResponse`] from an ordered chunk sequence.
///
/// The first non-empty id/model wins (providers write them once in the
/// opening event), text deltas are concatenated in order, tool-call
/// fragments are assembled by invocation id, and the latest non-empty usage
/// and finish reason are kept. Chunks whose `error` field is set are
/// non-fatal here: the merged response simply omits the failed segments.
/// Merging is idempotent under appending an empty final chunk.
pub fn merge_chunks(chunks: &[Chunk]) -> TextResponse {
    let mut resp = TextResponse::empty("");

    // Assembled by id; insertion order preserved for the final list.
    let mut call_order: Vec<String> = Vec::new();
    let mut calls: HashMap<String, (String, String)> = HashMap::new();

    for chunk in chunks {
        if chunk.error.is_some() {
            continue;
        }
        if resp.id.is_empty() {
            if let Some(id) = chunk.id.as_deref() {
                if !id.is_empty() {
                    resp.id = id.to_string();
                }
            }
        }
        if resp.model.is_empty() {
            if let Some(model) = chunk.model.as_deref() {
                if !model.is_empty() {
                    resp.model = model.to_string();
                }
            }
        }
        if let Some(delta) = chunk.delta.as_deref() {
            resp.text.push_str(delta);
        }
        if let Some(tc) = &chunk.tool_call {
            let entry = calls.entry(tc.id.clone()).or_insert_with(|| {
                call_order.push(tc.id.clone());
                (String::new(), String::new())
            });
            if entry.0.is_empty() && !tc.name.is_empty() {
                entry.0 = tc.name.clone();
            }
            entry.1.push_str(&tc.arguments);
        }
        if let Some(usage) = chunk.usage {
            resp.usage = Some(usage);
        }
        if let Some(reason) = chunk.finish_reason {
            resp.finish_reason = reason;
        }
    }

    for id in call_order {
        let (name, args) = calls.remove(&id).unwrap_or_default();
        let arguments = serde_json::from_str(&args)
            .unwrap_or(serde_json::Value::Object(Default::default()));
        resp.tool_calls.push(ToolCall { id, name, arguments });
    }

    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{FinishReason, ToolCallDelta, Usage};

    fn opening(id: &str, model: &str) -> Chunk {
        Chunk {
            id: Some(id.into()),
            model: Some(model.into()),
            ..Default::default()
        }
    }

    #[test]
    fn text_deltas_concatenate_in_order() {
        let chunks = vec![
            opening("resp_1", "gpt-4o"),
            Chunk::text("Hello"),
            Chunk::text(" World"),
            Chunk::finish(FinishReason::Stop),
        ];
        let merged = merge_chunks(&chunks);
        assert_eq!(merged.text, "Hello World");
        assert_eq!(merged.id, "resp_1");
        assert_eq!(merged.model, "gpt-4o");
        assert_eq!(merged.finish_reason, FinishReason::Stop);
    }

    #[test]
    fn first_nonempty_id_wins() {
        let chunks = vec![
            opening("first", "m1"),
            opening("second", "m2"),
        ];
        let merged = merge_chunks(&chunks);
        assert_eq!(merged.id, "first");
        assert_eq!(merged.model, "m1");
    }

    #[test]
    fn merge_is_idempotent_under_empty_final_chunk() {
        let chunks = vec![opening("r", "m"), Chunk::text("hi")];
        let mut with_empty = chunks.clone();
        with_empty.push(Chunk::default());

        let a = merge_chunks(&chunks);
        let b = merge_chunks(&with_empty);
        assert_eq!(a.text, b.text);
        assert_eq!(a.id, b.id);
        assert_eq!(a.finish_reason, b.finish_reason);
    }

    #[test]
    fn tool_call_fragments_assemble_by_id() {
        let chunks = vec![
            Chunk {
                tool_call: Some(ToolCallDelta {
                    id: "call_1".into(),
                    name: "extract".into(),
                    arguments: "{\"name\":".into(),
                }),
                ..Default::default()
            },
            Chunk {
                tool_call: Some(ToolCallDelta {
                    id: "call_1".into(),
                    name: String::new(),
                    arguments: "\"John\"}".into(),
                }),
                ..Default::default()
            },
            Chunk::finish(FinishReason::ToolCalls),
        ];
        let merged = merge_chunks(&chunks);
        assert_eq!(merged.tool_calls.len(), 1);
        assert_eq!(merged.tool_calls[0].name, "extract");
        assert_eq!(merged.tool_calls[0].arguments["name"], "John");
    }

    #[test]
    fn latest_usage_wins() {
        let chunks = vec![
            Chunk {
                usage: Some(Usage::new(5, 0)),
                ..Default::default()
            },
            Chunk {
                usage: Some(Usage::new(5, 9)),
                ..Default::default()
            },
        ];
        let merged = merge_chunks(&chunks);
        assert_eq!(merged.usage.unwrap().total_tokens, 14);
    }

    #[test]
    fn error_chunks_are_skipped() {
        let chunks = vec![
            Chunk::text("keep"),
            Chunk {
                delta: Some("dropped".into()),
                error: Some("mid-stream failure".into()),
                ..Default::default()
            },
        ];
        let merged = merge_chunks(&chunks);
        assert_eq!(merged.text, "keep");
    }
}
