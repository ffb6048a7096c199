//! The single-step algorithm (§4.G): one iteration of the control loop for
//! one operative.

use std::sync::Arc;

use op_compaction::CompactionEngine;
use op_domain::entry::{ContentType, EntryRole, StreamEntry, ToolCallContent, ToolResultContent};
use op_domain::error::Result;
use op_domain::operative::Operative;
use op_domain::tool::{ContentPart, Message, MessageContent, Role};
use op_operatives::OperativeStore;
use op_providers::traits::ChatRequest;
use op_providers::ProviderRegistry;
use op_stream::StreamStore;

use crate::dispatch::{split_model_ref, Dispatcher};
use crate::tools;

const SYSTEM_PREAMBLE: &str = "You are an operative: a long-running agent with a persistent \
Python sandbox and a note store. From inside run_ipython_cell you can call \
prompt_model(prompt), which re-enters your configured model with a fresh single-turn \
context and returns its text, and prompt_self(message), which queues a message to \
yourself that triggers your next turn. Use the other tools to manage your own \
instructions and notes.";

pub struct ControlContext {
    pub operatives: Arc<OperativeStore>,
    pub stream: Arc<StreamStore>,
    pub providers: Arc<ProviderRegistry>,
    pub dispatcher: Arc<Dispatcher>,
}

/// Run one step for `operative_id`: execute any pending tool calls, or
/// prompt the model, then check whether compaction should fire.
pub async fn run_step(ctx: &ControlContext, operative_id: &str) -> Result<()> {
    let operative = ctx.operatives.get(operative_id)?;
    let view = ctx.stream.get_entries(operative_id, 0)?;

    let pending = pending_tool_calls(&view);
    if !pending.is_empty() {
        execute_pending_tool_calls(ctx, &operative, &pending).await?;
    } else if should_prompt_model(&view) {
        prompt_model_turn(ctx, &operative, &view).await?;
    }

    maybe_compact(ctx, &operative).await;
    Ok(())
}

/// The maximal contiguous run of unresolved `tool_call` entries trailing
/// the view, in emission order. Tool execution appends a `tool_result`
/// immediately after each call, so a trailing run always means "not yet
/// executed" — including across a process restart mid-step.
fn pending_tool_calls(view: &[StreamEntry]) -> Vec<StreamEntry> {
    let mut out = Vec::new();
    for entry in view.iter().rev() {
        if entry.role == EntryRole::Assistant && entry.content_type == ContentType::ToolCall {
            out.push(entry.clone());
        } else {
            break;
        }
    }
    out.reverse();
    out
}

fn should_prompt_model(view: &[StreamEntry]) -> bool {
    match view.last() {
        None => false,
        Some(e) => {
            matches!(e.role, EntryRole::User)
                || (e.role == EntryRole::Tool && e.content_type == ContentType::ToolResult)
        }
    }
}

async fn execute_pending_tool_calls(
    ctx: &ControlContext,
    operative: &Operative,
    pending: &[StreamEntry],
) -> Result<()> {
    for entry in pending {
        let call: ToolCallContent = entry.as_tool_call().ok_or_else(|| {
            op_domain::error::Error::Internal("tool_call entry missing ToolCallContent".into())
        })?;
        let outcome = ctx.dispatcher.run(operative, &call).await;
        let result = ToolResultContent {
            tool_call_id: call.id,
            content: outcome.content,
            is_error: outcome.is_error,
        };
        ctx.stream
            .append(&operative.id, StreamEntry::tool_result(&operative.id, 0, result))?;
    }
    Ok(())
}

async fn prompt_model_turn(ctx: &ControlContext, operative: &Operative, view: &[StreamEntry]) -> Result<()> {
    let (provider_id, model_name) = split_model_ref(&operative.model);
    let Some(provider) = ctx.providers.get(provider_id) else {
        ctx.stream.append_text(
            &operative.id,
            EntryRole::Assistant,
            format!("**Error calling model:** unknown provider '{provider_id}'"),
            None,
        )?;
        return Ok(());
    };

    let mut messages = vec![Message::system(system_instructions(operative))];
    messages.extend(view.iter().filter_map(entry_to_message));

    let req = ChatRequest {
        messages,
        tools: tools::catalog(),
        temperature: None,
        max_tokens: None,
        json_mode: false,
        model: Some(model_name.to_string()),
    };

    match provider.chat(&req).await {
        Ok(resp) => {
            if !resp.content.is_empty() {
                ctx.stream.append_text(
                    &operative.id,
                    EntryRole::Assistant,
                    resp.content.clone(),
                    Some(resp.model.clone()),
                )?;
            }
            for call in &resp.tool_calls {
                let content = ToolCallContent {
                    id: call.call_id.clone(),
                    name: call.tool_name.clone(),
                    input: call.arguments.clone(),
                };
                ctx.stream.append(
                    &operative.id,
                    StreamEntry::tool_call(&operative.id, 0, content, Some(resp.model.clone())),
                )?;
            }
        }
        Err(err) => {
            ctx.stream.append_text(
                &operative.id,
                EntryRole::Assistant,
                format!("**Error calling model:** {err}"),
                None,
            )?;
        }
    }
    Ok(())
}

async fn maybe_compact(ctx: &ControlContext, operative: &Operative) {
    let (provider_id, model_name) = split_model_ref(operative.effective_compaction_model());
    let Some(provider) = ctx.providers.get(provider_id) else {
        return;
    };
    let max_tokens = provider
        .list_models()
        .into_iter()
        .find(|m| m.id == model_name)
        .map(|m| m.max_tokens)
        .or(provider.capabilities().max_output_tokens)
        .unwrap_or(8192);

    let engine = CompactionEngine::new(provider, ctx.stream.clone());
    match engine
        .maybe_compact(&operative.id, operative.compaction_threshold, max_tokens)
        .await
    {
        Ok(Some(_)) => tracing::info!(operative_id = %operative.id, "compacted operative stream"),
        Ok(None) => {}
        Err(err) => tracing::warn!(operative_id = %operative.id, error = %err, "compaction failed"),
    }
}

fn system_instructions(op: &Operative) -> String {
    let mut sections = vec![SYSTEM_PREAMBLE.to_string()];
    if !op.admin_instructions.trim().is_empty() {
        sections.push(op.admin_instructions.clone());
    }
    if !op.operative_instructions.trim().is_empty() {
        sections.push(op.operative_instructions.clone());
    }
    sections.join("\n\n")
}

fn entry_to_message(entry: &StreamEntry) -> Option<Message> {
    match (entry.role, entry.content_type) {
        (EntryRole::User, ContentType::Text) => entry.as_text().map(Message::user),
        (EntryRole::Assistant, ContentType::Text) => entry.as_text().map(Message::assistant),
        (EntryRole::System, ContentType::Text) => entry.as_text().map(Message::system),
        (EntryRole::Assistant, ContentType::ToolCall) => {
            let call = entry.as_tool_call()?;
            Some(Message {
                role: Role::Assistant,
                content: MessageContent::Parts(vec![ContentPart::ToolUse {
                    id: call.id,
                    name: call.name,
                    input: call.input,
                }]),
            })
        }
        (EntryRole::Tool, ContentType::ToolResult) => {
            let result = entry.as_tool_result()?;
            Some(Message {
                role: Role::Tool,
                content: MessageContent::Parts(vec![ContentPart::ToolResult {
                    tool_use_id: result.tool_call_id,
                    content: result.content,
                    is_error: result.is_error,
                }]),
            })
        }
        (EntryRole::CompactionSummary, _) => {
            let summary = entry.content.get("summary").and_then(|v| v.as_str())?;
            Some(Message::system(format!("Earlier conversation summary: {summary}")))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_tool_calls_returns_trailing_run_in_order() {
        let call1 = StreamEntry::tool_call(
            "op1",
            1,
            ToolCallContent { id: "c1".into(), name: "run_ipython_cell".into(), input: serde_json::json!({}) },
            None,
        );
        let call2 = StreamEntry::tool_call(
            "op1",
            2,
            ToolCallContent { id: "c2".into(), name: "store_note".into(), input: serde_json::json!({}) },
            None,
        );
        let view = vec![
            StreamEntry::text("op1", 0, EntryRole::User, "go"),
            call1,
            call2,
        ];
        let pending = pending_tool_calls(&view);
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].as_tool_call().unwrap().id, "c1");
        assert_eq!(pending[1].as_tool_call().unwrap().id, "c2");
    }

    #[test]
    fn should_prompt_model_after_user_or_tool_result() {
        let user_view = vec![StreamEntry::text("op1", 0, EntryRole::User, "hi")];
        assert!(should_prompt_model(&user_view));

        let result_view = vec![StreamEntry::tool_result(
            "op1",
            0,
            ToolResultContent { tool_call_id: "c1".into(), content: "ok".into(), is_error: false },
        )];
        assert!(should_prompt_model(&result_view));

        let assistant_text_view = vec![StreamEntry::text("op1", 0, EntryRole::Assistant, "done")];
        assert!(!should_prompt_model(&assistant_text_view));

        assert!(!should_prompt_model(&[]));
    }
}
