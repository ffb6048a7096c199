//! Token-threshold compaction: shrinks an operative's compacted view by
//! replacing old entries with a model-generated summary, without ever
//! rewriting the underlying append-only log.

pub mod cutpoint;
pub mod engine;
pub mod estimate;

pub use cutpoint::validate_cut_point;
pub use engine::CompactionEngine;
pub use estimate::{estimate_tokens, estimate_view_tokens, should_compact};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use op_domain::capability::LlmCapabilities;
    use op_domain::entry::EntryRole;
    use op_domain::error::Result;
    use op_domain::model::Model;
    use op_domain::stream::{BoxStream, StreamEvent};
    use op_domain::tool::ToolCall;
    use op_providers::traits::{ChatRequest, ChatResponse, EmbeddingsRequest, EmbeddingsResponse, LlmProvider};
    use std::sync::Arc;

    /// A fake provider that always proposes compacting everything before the
    /// last entry in the view it was handed.
    struct FakeSummarizer {
        capabilities: LlmCapabilities,
    }

    #[async_trait]
    impl LlmProvider for FakeSummarizer {
        async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
            let transcript = match &req.messages[1].content {
                op_domain::tool::MessageContent::Text(t) => t.clone(),
                _ => String::new(),
            };
            let view: Vec<op_domain::entry::StreamEntry> =
                serde_json::from_str(transcript.trim_start_matches("Event log (oldest first):\n")).unwrap();
            let last_user = view
                .iter()
                .rev()
                .find(|e| e.role == EntryRole::User)
                .expect("a user entry exists");

            Ok(ChatResponse {
                content: String::new(),
                tool_calls: vec![ToolCall {
                    call_id: "c1".into(),
                    tool_name: "propose_compaction".into(),
                    arguments: serde_json::json!({
                        "summary": "the user asked for help and it was provided",
                        "first_kept_entry_id": last_user.id,
                    }),
                }],
                usage: None,
                model: "fake".into(),
                finish_reason: Some("tool_calls".into()),
            })
        }

        async fn chat_stream(&self, _req: &ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
            unimplemented!("not exercised by compaction")
        }

        async fn embeddings(&self, _req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
            unimplemented!("not exercised by compaction")
        }

        fn capabilities(&self) -> &LlmCapabilities {
            &self.capabilities
        }

        fn provider_id(&self) -> &str {
            "fake"
        }

        fn list_models(&self) -> Vec<Model> {
            vec![]
        }
    }

    fn tmp_stream() -> (tempfile::TempDir, Arc<op_stream::StreamStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(op_stream::StreamStore::new(dir.path()));
        (dir, store)
    }

    #[tokio::test]
    async fn maybe_compact_is_noop_below_threshold() {
        let (_dir, stream) = tmp_stream();
        stream.append_text("op1", EntryRole::User, "hi", None).unwrap();
        let provider = Arc::new(FakeSummarizer {
            capabilities: LlmCapabilities::default(),
        });
        let engine = CompactionEngine::new(provider, stream);
        let result = engine.maybe_compact("op1", 0.99, 1_000_000).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn maybe_compact_appends_summary_when_over_threshold() {
        let (_dir, stream) = tmp_stream();
        for i in 0..20 {
            stream
                .append_text("op1", EntryRole::User, format!("message {i}").repeat(20), None)
                .unwrap();
            stream
                .append_text("op1", EntryRole::Assistant, format!("reply {i}").repeat(20), None)
                .unwrap();
        }
        let provider = Arc::new(FakeSummarizer {
            capabilities: LlmCapabilities::default(),
        });
        let engine = CompactionEngine::new(provider, stream.clone());
        let result = engine.maybe_compact("op1", 0.1, 100).await.unwrap();
        assert!(result.is_some());
        assert!(result.unwrap().is_compaction_summary());

        let view = stream.get_entries("op1", 0).unwrap();
        assert!(view[0].is_compaction_summary());
    }
}
