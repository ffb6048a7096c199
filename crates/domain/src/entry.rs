use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a [`StreamEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryRole {
    User,
    Assistant,
    Tool,
    System,
    CompactionSummary,
}

impl EntryRole {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryRole::User => "user",
            EntryRole::Assistant => "assistant",
            EntryRole::Tool => "tool",
            EntryRole::System => "system",
            EntryRole::CompactionSummary => "compaction_summary",
        }
    }
}

/// The shape of an entry's `content` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    ToolCall,
    ToolResult,
}

/// `content` payload for a `tool_call` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallContent {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// `content` payload for a `tool_result` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultContent {
    pub tool_call_id: String,
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
}

/// A single immutable entry in an operative's append-only stream.
///
/// Entries are never modified or deleted once appended. `seq` is strictly
/// increasing per operative with no gaps (see the stream store contract).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEntry {
    pub id: String,
    pub operative_id: String,
    pub seq: u64,
    pub role: EntryRole,
    pub content_type: ContentType,
    /// Text for `Text` entries; JSON-encoded `ToolCallContent`/`ToolResultContent`
    /// for the other two content types.
    pub content: serde_json::Value,
    /// Model that produced this entry, for assistant turns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl StreamEntry {
    pub fn text(operative_id: impl Into<String>, seq: u64, role: EntryRole, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operative_id: operative_id.into(),
            seq,
            role,
            content_type: ContentType::Text,
            content: serde_json::Value::String(text.into()),
            model: None,
            timestamp: Utc::now(),
        }
    }

    pub fn tool_call(operative_id: impl Into<String>, seq: u64, call: ToolCallContent, model: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operative_id: operative_id.into(),
            seq,
            role: EntryRole::Assistant,
            content_type: ContentType::ToolCall,
            content: serde_json::to_value(call).expect("ToolCallContent serializes"),
            model,
            timestamp: Utc::now(),
        }
    }

    pub fn tool_result(operative_id: impl Into<String>, seq: u64, result: ToolResultContent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operative_id: operative_id.into(),
            seq,
            role: EntryRole::Tool,
            content_type: ContentType::ToolResult,
            content: serde_json::to_value(result).expect("ToolResultContent serializes"),
            model: None,
            timestamp: Utc::now(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        self.content.as_str()
    }

    pub fn as_tool_call(&self) -> Option<ToolCallContent> {
        serde_json::from_value(self.content.clone()).ok()
    }

    pub fn as_tool_result(&self) -> Option<ToolResultContent> {
        serde_json::from_value(self.content.clone()).ok()
    }

    pub fn is_compaction_summary(&self) -> bool {
        matches!(self.role, EntryRole::CompactionSummary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_entry_roundtrips_through_json() {
        let e = StreamEntry::text("op1", 1, EntryRole::User, "hello");
        let raw = serde_json::to_string(&e).unwrap();
        let back: StreamEntry = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.as_text(), Some("hello"));
        assert_eq!(back.seq, 1);
    }

    #[test]
    fn tool_call_content_roundtrips() {
        let call = ToolCallContent {
            id: "c1".into(),
            name: "run_ipython_cell".into(),
            input: serde_json::json!({"code": "1+1"}),
        };
        let e = StreamEntry::tool_call("op1", 2, call, Some("gpt-4o".into()));
        let back = e.as_tool_call().unwrap();
        assert_eq!(back.name, "run_ipython_cell");
    }

    #[test]
    fn tool_result_defaults_is_error_false() {
        let json = serde_json::json!({"tool_call_id": "c1", "content": "81"});
        let result: ToolResultContent = serde_json::from_value(json).unwrap();
        assert!(!result.is_error);
    }
}
