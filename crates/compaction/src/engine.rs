//! Compaction engine: decides when to compact and drives the
//! propose-summary → validate-cut-point → persist flow.
//!
//! The raw per-entry log is never rewritten; compaction only ever appends a
//! `compaction_summary` entry that shifts where the store's view begins.

use std::sync::Arc;

use op_domain::entry::StreamEntry;
use op_domain::error::{Error, Result};
use op_domain::tool::{Message, ToolDefinition};
use op_providers::traits::{ChatRequest, LlmProvider};
use op_stream::StreamStore;

use crate::cutpoint::validate_cut_point;
use crate::estimate::should_compact;

const PROPOSAL_TOOL_NAME: &str = "propose_compaction";
const MAX_PROPOSAL_ATTEMPTS: usize = 2;

const SAFETY_RULES: &str = "You are compacting an operative's event log into a summary. \
Preserve the current goal, open threads, key decisions, and any state a future turn would \
need (running processes, pending tool results, facts learned). \
Choose first_kept_entry_id as the id of an entry that is a user message, an assistant \
message with no tool calls, or a system/summary entry — never a tool call or its result, \
and never an entry in the middle of a tool_call/tool_result pair.";

pub struct CompactionEngine {
    provider: Arc<dyn LlmProvider>,
    stream: Arc<StreamStore>,
}

impl CompactionEngine {
    pub fn new(provider: Arc<dyn LlmProvider>, stream: Arc<StreamStore>) -> Self {
        Self { provider, stream }
    }

    /// Compact `operative_id` if its current compacted view exceeds
    /// `threshold * max_tokens`. Returns the new `compaction_summary` entry
    /// if compaction ran, or `None` if it wasn't needed.
    pub async fn maybe_compact(
        &self,
        operative_id: &str,
        threshold: f32,
        max_tokens: u32,
    ) -> Result<Option<StreamEntry>> {
        let view = self.stream.get_entries(operative_id, 0)?;
        if !should_compact(&view, threshold, max_tokens) {
            return Ok(None);
        }
        self.run_compaction(operative_id, &view).await.map(Some)
    }

    /// Run the propose → validate → persist flow, retrying once with a
    /// stricter prompt if the model's proposed cut point is invalid.
    async fn run_compaction(&self, operative_id: &str, view: &[StreamEntry]) -> Result<StreamEntry> {
        let mut strict = false;
        let mut last_err = None;

        for _ in 0..MAX_PROPOSAL_ATTEMPTS {
            let proposal = self.propose(view, strict).await?;
            match validate_cut_point(view, &proposal.first_kept_entry_id) {
                Ok(_) => {
                    let payload = serde_json::json!({
                        "summary": proposal.summary,
                        "first_kept_entry_id": proposal.first_kept_entry_id,
                    });
                    return self.stream.compact(operative_id, payload);
                }
                Err(err) => {
                    tracing::warn!(operative_id, error = %err, "rejected compaction cut point, retrying");
                    last_err = Some(err);
                    strict = true;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Internal("compaction proposal loop produced no attempts".into())))
    }

    async fn propose(&self, view: &[StreamEntry], strict: bool) -> Result<Proposal> {
        let transcript = serde_json::to_string_pretty(view)?;
        let mut system_prompt = SAFETY_RULES.to_string();
        if strict {
            system_prompt.push_str(
                " Your previous proposal was rejected for an invalid cut point; \
                 choose a strictly earlier, unambiguous boundary this time.",
            );
        }

        let req = ChatRequest {
            messages: vec![
                Message::system(system_prompt),
                Message::user(format!("Event log (oldest first):\n{transcript}")),
            ],
            tools: vec![proposal_tool()],
            temperature: Some(0.0),
            max_tokens: Some(1024),
            json_mode: false,
            model: None,
        };

        let resp = self.provider.chat(&req).await?;
        let call = resp
            .tool_calls
            .iter()
            .find(|c| c.tool_name == PROPOSAL_TOOL_NAME)
            .ok_or_else(|| Error::Provider {
                provider: self.provider.provider_id().to_string(),
                message: "compaction model did not call propose_compaction".into(),
            })?;

        serde_json::from_value(call.arguments.clone()).map_err(|e| Error::Provider {
            provider: self.provider.provider_id().to_string(),
            message: format!("malformed propose_compaction arguments: {e}"),
        })
    }
}

#[derive(serde::Deserialize)]
struct Proposal {
    summary: String,
    first_kept_entry_id: String,
}

fn proposal_tool() -> ToolDefinition {
    ToolDefinition {
        name: PROPOSAL_TOOL_NAME.to_string(),
        description: "Propose a compaction summary and the id of the first entry to keep \
                      uncompacted."
            .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "summary": { "type": "string" },
                "first_kept_entry_id": { "type": "string" },
            },
            "required": ["summary", "first_kept_entry_id"],
        }),
    }
}
