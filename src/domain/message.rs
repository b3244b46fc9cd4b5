//! Message entity: an insert-only, sequence-ordered row within a thread.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The role a message's author played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed content block for multimodal message payloads.
///
/// Messages are normalized to text on the way in (see
/// [`crate::domain::message::normalize_content`]) and stored as a JSON
/// array of these blocks when the content is not plain text; adapters
/// that want structured blocks (MCP multimodal tool results) re-parse
/// `content` into a `Vec<ContentBlock>`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { data: String, mime_type: String },
}

/// An image attachment reference, as returned by `/api/upload/image` and
/// carried in a message's `metadata.images` list.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImageAttachment {
    pub url: String,
    pub name: String,
}

/// An insert-only, sequence-ordered chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    pub seq: i64,
    pub author_id: Option<String>,
    pub author_name: String,
    pub role: Role,
    pub content: String,
    pub mentions: HashSet<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Normalize `content` to its stored text form.
///
/// A plain string is stored as-is. A JSON array of [`ContentBlock`]s is
/// re-serialized to a canonical JSON string so `message.list` always
/// returns a stable representation; adapters that need structured blocks
/// parse it back out with [`parse_content_blocks`].
pub fn normalize_content(raw: &serde_json::Value) -> Result<String, String> {
    match raw {
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Array(_) => {
            let blocks: Vec<ContentBlock> = serde_json::from_value(raw.clone())
                .map_err(|e| format!("invalid content blocks: {e}"))?;
            serde_json::to_string(&blocks).map_err(|e| format!("failed to encode content: {e}"))
        }
        other => Err(format!("unsupported content shape: {other}")),
    }
}

/// Parse a stored `content` string back into typed blocks. Falls back to
/// a single [`ContentBlock::Text`] when the content is not a block array
/// (the common case for plain chat messages).
pub fn parse_content_blocks(content: &str) -> Vec<ContentBlock> {
    serde_json::from_str::<Vec<ContentBlock>>(content).unwrap_or_else(|_| {
        vec![ContentBlock::Text {
            text: content.to_string(),
        }]
    })
}
