use serde::{Deserialize, Serialize};

use crate::tool::ToolCall;

/// A message in the conversation (provider-agnostic).
///
/// Assistant messages may carry tool invocations; tool messages carry the id
/// of the invocation they answer. Adapters remap roles per provider (tool
/// results become `user` messages on some backends, `function` on others).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    /// Tool invocations requested by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For `Role::Tool` messages: the invocation this message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image {
        /// Base64 payload or remote URL, depending on the adapter.
        data: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
    },
    #[serde(rename = "audio")]
    Audio {
        data: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
    },
    #[serde(rename = "document")]
    Document {
        data: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
    },
}

// ── Convenience constructors ───────────────────────────────────────

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self::plain(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::plain(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, text)
    }

    /// An assistant message that requests tool invocations.
    pub fn assistant_tool_calls(text: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
            tool_calls: calls,
            tool_call_id: None,
        }
    }

    /// A tool message answering the invocation `tool_call_id`.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::Text(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn plain(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

impl MessageContent {
    /// Extract the first text segment, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(t) => Some(t.as_str()),
            MessageContent::Parts(parts) => parts.iter().find_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            }),
        }
    }

    /// Extract and join all text content, returning an owned String.
    ///
    /// For `Text`, returns the string directly. For `Parts`, joins all text
    /// parts with `"\n"`; non-text parts are skipped.
    pub fn extract_all_text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Validate a message sequence: every tool message must answer an invocation
/// that appears in a *preceding* assistant message.
pub fn validate_messages(messages: &[Message]) -> crate::error::Result<()> {
    let mut seen_call_ids: Vec<&str> = Vec::new();
    for (idx, msg) in messages.iter().enumerate() {
        match msg.role {
            Role::Assistant => {
                seen_call_ids.extend(msg.tool_calls.iter().map(|c| c.id.as_str()));
            }
            Role::Tool => {
                let id = msg.tool_call_id.as_deref().ok_or_else(|| {
                    crate::error::Error::validation(format!(
                        "tool message at index {idx} is missing tool_call_id"
                    ))
                })?;
                if !seen_call_ids.contains(&id) {
                    return Err(crate::error::Error::validation(format!(
                        "tool message at index {idx} references unknown invocation '{id}'"
                    )));
                }
            }
            _ => {}
        }
    }
    Ok(())
}
