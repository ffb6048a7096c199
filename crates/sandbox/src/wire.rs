//! Newline-delimited JSON messages exchanged with a sandbox container.
//!
//! One JSON object per line, tagged by `type`. Message bodies are otherwise
//! opaque to the host: the sandbox process's own implementation is out of
//! scope here.

use serde::{Deserialize, Serialize};

/// Messages sent from the host into the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HostMessage {
    RunCell { code: String },
    PromptModelResponse { id: String, response: String },
}

/// Messages received from the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SandboxMessage {
    Output {
        text: String,
        is_stderr: bool,
    },
    PromptModel {
        id: String,
        prompt: String,
    },
    PromptSelf {
        message: String,
    },
    RunCellResult {
        output: String,
        stdout: String,
        stderr: String,
    },
}

/// The terminal result of a `RunCell` invocation.
#[derive(Debug, Clone)]
pub struct CellOutcome {
    pub output: String,
    pub stdout: String,
    pub stderr: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_message_tags_roundtrip() {
        let msg = HostMessage::RunCell { code: "1+1".into() };
        let raw = serde_json::to_string(&msg).unwrap();
        assert!(raw.contains("\"type\":\"RunCell\""));
        let back: HostMessage = serde_json::from_str(&raw).unwrap();
        assert!(matches!(back, HostMessage::RunCell { code } if code == "1+1"));
    }

    #[test]
    fn sandbox_message_prompt_model_roundtrips() {
        let raw = r#"{"type":"PromptModel","id":"p1","prompt":"summarize"}"#;
        let msg: SandboxMessage = serde_json::from_str(raw).unwrap();
        assert!(matches!(msg, SandboxMessage::PromptModel { id, .. } if id == "p1"));
    }
}
