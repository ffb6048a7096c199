//! The host-side callback hooks passed into `SandboxManager::run_cell`.
//!
//! `prompt_model` re-enters the operative's configured model with a fresh,
//! single-turn context (no tool access, no history). `prompt_self` appends
//! a `user` entry to the operative's stream so it reads as something the
//! operative said to itself, and participates in the next wake-up like any
//! other user turn.

use std::sync::Arc;

use async_trait::async_trait;
use op_domain::entry::EntryRole;
use op_domain::error::Result;
use op_domain::tool::Message;
use op_providers::traits::{ChatRequest, LlmProvider};
use op_sandbox::RunCellDelegate;
use op_stream::StreamStore;

pub struct ControlDelegate {
    pub operative_id: String,
    pub provider: Arc<dyn LlmProvider>,
    pub model: Option<String>,
    pub stream: Arc<StreamStore>,
}

#[async_trait]
impl RunCellDelegate for ControlDelegate {
    async fn prompt_model(&self, prompt: &str) -> Result<String> {
        let req = ChatRequest {
            messages: vec![Message::user(prompt)],
            tools: vec![],
            temperature: None,
            max_tokens: None,
            json_mode: false,
            model: self.model.clone(),
        };
        let resp = self.provider.chat(&req).await?;
        Ok(resp.content)
    }

    async fn prompt_self(&self, message: &str) {
        if let Err(err) = self
            .stream
            .append_text(&self.operative_id, EntryRole::User, message, None)
        {
            tracing::warn!(
                operative_id = %self.operative_id,
                error = %err,
                "failed to append prompt_self message"
            );
        }
    }
}
