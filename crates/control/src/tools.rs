//! The seven tools exposed to an operative's model. Names are part of the
//! wire contract: a model's tool_call always names one of these.

use op_domain::tool::ToolDefinition;

pub const RUN_IPYTHON_CELL: &str = "run_ipython_cell";
pub const UPDATE_INSTRUCTIONS: &str = "update_instructions";
pub const STORE_NOTE: &str = "store_note";
pub const KEYWORD_SEARCH_NOTES: &str = "keyword_search_notes";
pub const VECTOR_SEARCH_NOTES: &str = "vector_search_notes";
pub const GET_NOTE: &str = "get_note";
pub const DELETE_NOTE: &str = "delete_note";

pub fn catalog() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: RUN_IPYTHON_CELL.into(),
            description: "Run a cell of Python code in this operative's persistent sandbox \
                          interpreter. State (variables, imports) persists across calls until \
                          the sandbox restarts."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "code": { "type": "string" } },
                "required": ["code"],
            }),
        },
        ToolDefinition {
            name: UPDATE_INSTRUCTIONS.into(),
            description: "Rewrite this operative's own self-editable instructions. Cannot \
                          touch the admin-set instructions."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "instructions": { "type": "string" } },
                "required": ["instructions"],
            }),
        },
        ToolDefinition {
            name: STORE_NOTE.into(),
            description: "Save a titled note for later recall.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string" },
                    "content": { "type": "string" },
                },
                "required": ["title", "content"],
            }),
        },
        ToolDefinition {
            name: KEYWORD_SEARCH_NOTES.into(),
            description: "Search notes by case-insensitive substring match against title and \
                          content. Returns a list of {id, title} pairs."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"],
            }),
        },
        ToolDefinition {
            name: VECTOR_SEARCH_NOTES.into(),
            description: "Semantic search over notes. Returns a list of {id, title} pairs. \
                          May be unavailable depending on deployment."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"],
            }),
        },
        ToolDefinition {
            name: GET_NOTE.into(),
            description: "Fetch a note's full content by id.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "id": { "type": "string" } },
                "required": ["id"],
            }),
        },
        ToolDefinition {
            name: DELETE_NOTE.into(),
            description: "Delete a note by id.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "id": { "type": "string" } },
                "required": ["id"],
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_seven_uniquely_named_tools() {
        let tools = catalog();
        assert_eq!(tools.len(), 7);
        let names: std::collections::HashSet<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names.len(), 7);
    }
}
