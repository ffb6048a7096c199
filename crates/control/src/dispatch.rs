//! Tool dispatch: executes one `tool_call` entry and produces its
//! `tool_result` content. Failures are converted to `is_error=true` results
//! here rather than propagated, per the failure policy in §4.G/§7.

use std::sync::Arc;

use op_domain::entry::ToolCallContent;
use op_domain::note::Note;
use op_domain::operative::Operative;
use op_providers::ProviderRegistry;
use op_sandbox::SandboxManager;
use op_stream::StreamStore;

use crate::delegate::ControlDelegate;
use crate::tools;

pub struct Dispatcher {
    pub operatives: Arc<op_operatives::OperativeStore>,
    pub notes: Arc<op_notes::NoteStore>,
    pub sandbox: Arc<SandboxManager>,
    pub providers: Arc<ProviderRegistry>,
    pub stream: Arc<StreamStore>,
}

pub struct ToolOutcome {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutcome {
    fn ok(value: serde_json::Value) -> Self {
        Self {
            content: value.to_string(),
            is_error: false,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            is_error: true,
        }
    }
}

/// Split a `"provider/model"` reference into its parts.
pub fn split_model_ref(model: &str) -> (&str, &str) {
    model.split_once('/').unwrap_or((model, model))
}

impl Dispatcher {
    pub async fn run(&self, operative: &Operative, call: &ToolCallContent) -> ToolOutcome {
        let result = match call.name.as_str() {
            tools::RUN_IPYTHON_CELL => self.run_ipython_cell(operative, call).await,
            tools::UPDATE_INSTRUCTIONS => self.update_instructions(operative, call),
            tools::STORE_NOTE => self.store_note(operative, call),
            tools::KEYWORD_SEARCH_NOTES => self.keyword_search_notes(operative, call),
            tools::VECTOR_SEARCH_NOTES => self.vector_search_notes(operative, call),
            tools::GET_NOTE => self.get_note(operative, call),
            tools::DELETE_NOTE => self.delete_note(operative, call),
            other => Err(format!("unknown tool '{other}'")),
        };

        match result {
            Ok(value) => ToolOutcome::ok(value),
            Err(message) => ToolOutcome::err(message),
        }
    }

    async fn run_ipython_cell(
        &self,
        operative: &Operative,
        call: &ToolCallContent,
    ) -> Result<serde_json::Value, String> {
        let code = call
            .input
            .get("code")
            .and_then(|v| v.as_str())
            .ok_or("missing 'code' argument")?;

        let (provider_id, model_name) = split_model_ref(&operative.model);
        let provider = self
            .providers
            .get(provider_id)
            .ok_or_else(|| format!("unknown provider '{provider_id}'"))?;

        let delegate = ControlDelegate {
            operative_id: operative.id.clone(),
            provider,
            model: Some(model_name.to_string()),
            stream: self.stream.clone(),
        };

        let outcome = self
            .sandbox
            .run_cell(&operative.id, code, &delegate)
            .await
            .map_err(|e| e.to_string())?;

        Ok(serde_json::json!({
            "output": outcome.output,
            "stdout": outcome.stdout,
            "stderr": outcome.stderr,
        }))
    }

    fn update_instructions(
        &self,
        operative: &Operative,
        call: &ToolCallContent,
    ) -> Result<serde_json::Value, String> {
        let instructions = call
            .input
            .get("instructions")
            .and_then(|v| v.as_str())
            .ok_or("missing 'instructions' argument")?;
        self.operatives
            .update_instructions(&operative.id, None, Some(instructions.to_string()))
            .map_err(|e| e.to_string())?;
        Ok(serde_json::json!({ "updated": true }))
    }

    fn store_note(&self, operative: &Operative, call: &ToolCallContent) -> Result<serde_json::Value, String> {
        let title = call.input.get("title").and_then(|v| v.as_str()).ok_or("missing 'title'")?;
        let content = call
            .input
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or("missing 'content'")?;
        let note = self
            .notes
            .create(Note::new(operative.id.clone(), title, content))
            .map_err(|e| e.to_string())?;
        Ok(serde_json::json!({ "id": note.id, "title": note.title }))
    }

    fn keyword_search_notes(
        &self,
        operative: &Operative,
        call: &ToolCallContent,
    ) -> Result<serde_json::Value, String> {
        let query = call.input.get("query").and_then(|v| v.as_str()).ok_or("missing 'query'")?;
        let hits = self.notes.keyword_search(&operative.id, query);
        Ok(serde_json::to_value(hits).expect("NoteSummary vec serializes"))
    }

    fn vector_search_notes(
        &self,
        operative: &Operative,
        call: &ToolCallContent,
    ) -> Result<serde_json::Value, String> {
        let query = call.input.get("query").and_then(|v| v.as_str()).ok_or("missing 'query'")?;
        let hits = self.notes.vector_search(&operative.id, query).map_err(|e| e.to_string())?;
        Ok(serde_json::to_value(hits).expect("NoteSummary vec serializes"))
    }

    fn get_note(&self, operative: &Operative, call: &ToolCallContent) -> Result<serde_json::Value, String> {
        let id = call.input.get("id").and_then(|v| v.as_str()).ok_or("missing 'id'")?;
        let note = self.notes.get(&operative.id, id).map_err(|e| e.to_string())?;
        Ok(serde_json::json!({ "id": note.id, "title": note.title, "content": note.content }))
    }

    fn delete_note(&self, operative: &Operative, call: &ToolCallContent) -> Result<serde_json::Value, String> {
        let id = call.input.get("id").and_then(|v| v.as_str()).ok_or("missing 'id'")?;
        self.notes.delete(&operative.id, id).map_err(|e| e.to_string())?;
        Ok(serde_json::json!({ "deleted": true }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_model_ref_splits_on_first_slash() {
        assert_eq!(split_model_ref("openai/gpt-4o"), ("openai", "gpt-4o"));
        assert_eq!(split_model_ref("google/models/gemini-1.5"), ("google", "models/gemini-1.5"));
    }

    #[test]
    fn split_model_ref_without_slash_repeats_whole_string() {
        assert_eq!(split_model_ref("standalone"), ("standalone", "standalone"));
    }
}
