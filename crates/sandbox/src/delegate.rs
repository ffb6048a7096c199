//! Host-side callback hooks a sandbox can invoke mid-`RunCell`.

use async_trait::async_trait;
use op_domain::error::Result;

/// Invoked for `PromptModel`/`PromptSelf` messages the sandbox emits while a
/// cell is running. Implementations must never drop a `PromptModel` id
/// without a response, even on internal error.
#[async_trait]
pub trait RunCellDelegate: Send + Sync {
    async fn prompt_model(&self, prompt: &str) -> Result<String>;
    async fn prompt_self(&self, message: &str);
}
