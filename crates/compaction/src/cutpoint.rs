//! Cut-point validation: a compaction may only start the kept view at a
//! boundary that never splits a `tool_call` entry from its matching
//! `tool_result`.

use op_domain::entry::{ContentType, EntryRole, StreamEntry};
use op_domain::error::{Error, Result};

/// Confirms `first_kept_entry_id` names a valid cut point within `view`:
/// the boundary immediately before a user entry, an assistant entry with no
/// tool calls, or a non-message entry (system / compaction summary).
pub fn validate_cut_point(view: &[StreamEntry], first_kept_entry_id: &str) -> Result<usize> {
    let idx = view
        .iter()
        .position(|e| e.id == first_kept_entry_id)
        .ok_or_else(|| {
            Error::InvalidArgument(format!(
                "first_kept_entry_id '{first_kept_entry_id}' is not in the compacted view"
            ))
        })?;

    let entry = &view[idx];
    let valid = match (entry.role, entry.content_type) {
        (EntryRole::User, _) => true,
        (EntryRole::Assistant, ContentType::ToolCall) => false,
        (EntryRole::Assistant, _) => true,
        (EntryRole::Tool, _) => false,
        (EntryRole::System, _) | (EntryRole::CompactionSummary, _) => true,
    };

    if !valid {
        return Err(Error::Conflict(format!(
            "cut point at entry '{first_kept_entry_id}' would split a tool_call/tool_result pair"
        )));
    }

    Ok(idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use op_domain::entry::ToolCallContent;
    use op_domain::entry::ToolResultContent;

    fn sample_view() -> Vec<StreamEntry> {
        let call = StreamEntry::tool_call(
            "op1",
            1,
            ToolCallContent {
                id: "c1".into(),
                name: "run_ipython_cell".into(),
                input: serde_json::json!({"code": "1+1"}),
            },
            Some("gpt-4o".into()),
        );
        let result = StreamEntry::tool_result(
            "op1",
            2,
            ToolResultContent {
                tool_call_id: "c1".into(),
                content: "2".into(),
                is_error: false,
            },
        );
        vec![
            StreamEntry::text("op1", 0, EntryRole::User, "run this"),
            call,
            result,
            StreamEntry::text("op1", 3, EntryRole::Assistant, "done"),
        ]
    }

    #[test]
    fn cut_before_user_entry_is_valid() {
        let view = sample_view();
        let idx = validate_cut_point(&view, &view[0].id).unwrap();
        assert_eq!(idx, 0);
    }

    #[test]
    fn cut_before_tool_result_is_rejected() {
        let view = sample_view();
        let err = validate_cut_point(&view, &view[2].id).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn cut_before_tool_call_entry_is_rejected() {
        let view = sample_view();
        let err = validate_cut_point(&view, &view[1].id).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn cut_before_trailing_assistant_text_is_valid() {
        let view = sample_view();
        let idx = validate_cut_point(&view, &view[3].id).unwrap();
        assert_eq!(idx, 3);
    }

    #[test]
    fn unknown_id_is_invalid_argument() {
        let view = sample_view();
        let err = validate_cut_point(&view, "nonexistent").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
