//! Aggregation wrapper around a raw provider event stream.
//!
//! [`LlmProvider::chat_stream`] hands back a raw `BoxStream` of
//! [`StreamEvent`]s. Callers that just want the final assembled message
//! (rather than token-by-token output) wrap it in a [`ModelStream`] and call
//! [`ModelStream::full_message`], which drains the stream and reconstructs a
//! single [`ChatResponse`] — text concatenated in order, tool calls
//! reassembled from their `started`/`delta`/`finished` event triples.

use crate::traits::ChatResponse;
use futures_util::StreamExt;
use op_domain::error::{Error, Result};
use op_domain::stream::{BoxStream, StreamEvent};
use op_domain::tool::ToolCall;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Accumulates a tool call's arguments across `ToolCallDelta` events until
/// either a `ToolCallFinished` event arrives or the stream ends.
struct ToolCallBuilder {
    call_id: String,
    tool_name: String,
    args_buf: String,
}

/// A lazily-consumed, cancellable handle to a single model inference.
///
/// Only one of [`ModelStream::full_message`] / direct iteration of the
/// underlying stream may run to completion — the stream is moved out on
/// first use.
pub struct ModelStream {
    inner: Mutex<Option<BoxStream<'static, Result<StreamEvent>>>>,
    cancelled: Arc<AtomicBool>,
}

impl ModelStream {
    pub fn new(stream: BoxStream<'static, Result<StreamEvent>>) -> Self {
        Self {
            inner: Mutex::new(Some(stream)),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel any in-flight inference. Safe to call more than once, and
    /// safe to call after the stream has already been fully drained.
    pub fn close(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.inner.lock().take();
    }

    /// Drain the stream and return the aggregated assistant message.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` if the stream was already consumed or
    /// closed, and propagates any `Error` yielded mid-stream or carried in
    /// a `StreamEvent::Error` event.
    pub async fn full_message(&self) -> Result<ChatResponse> {
        let mut stream = self
            .inner
            .lock()
            .take()
            .ok_or_else(|| Error::Internal("model stream already consumed or closed".into()))?;

        let mut text = String::new();
        let mut in_progress: HashMap<String, ToolCallBuilder> = HashMap::new();
        let mut finished: Vec<ToolCall> = Vec::new();
        let mut usage = None;
        let mut finish_reason = None;

        while let Some(event) = stream.next().await {
            if self.cancelled.load(Ordering::SeqCst) {
                break;
            }
            match event? {
                StreamEvent::Token { text: chunk } => text.push_str(&chunk),
                StreamEvent::Thinking { .. } => {
                    // Reasoning tokens are not part of the assembled message.
                }
                StreamEvent::ToolCallStarted { call_id, tool_name } => {
                    in_progress.insert(
                        call_id.clone(),
                        ToolCallBuilder {
                            call_id,
                            tool_name,
                            args_buf: String::new(),
                        },
                    );
                }
                StreamEvent::ToolCallDelta { call_id, delta } => {
                    in_progress
                        .entry(call_id.clone())
                        .or_insert_with(|| ToolCallBuilder {
                            call_id,
                            tool_name: String::new(),
                            args_buf: String::new(),
                        })
                        .args_buf
                        .push_str(&delta);
                }
                StreamEvent::ToolCallFinished {
                    call_id,
                    tool_name,
                    arguments,
                } => {
                    in_progress.remove(&call_id);
                    finished.push(ToolCall {
                        call_id,
                        tool_name,
                        arguments,
                    });
                }
                StreamEvent::Done {
                    usage: u,
                    finish_reason: fr,
                } => {
                    usage = u;
                    finish_reason = fr;
                }
                StreamEvent::Error { message } => {
                    return Err(Error::Provider {
                        provider: "model_stream".into(),
                        message,
                    });
                }
            }
        }

        for (_, builder) in in_progress {
            let arguments = serde_json::from_str(&builder.args_buf)
                .unwrap_or(serde_json::Value::Object(Default::default()));
            finished.push(ToolCall {
                call_id: builder.call_id,
                tool_name: builder.tool_name,
                arguments,
            });
        }

        Ok(ChatResponse {
            content: text,
            tool_calls: finished,
            usage,
            model: String::new(),
            finish_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use op_domain::stream::Usage;

    fn boxed(events: Vec<Result<StreamEvent>>) -> BoxStream<'static, Result<StreamEvent>> {
        Box::pin(stream::iter(events))
    }

    #[tokio::test]
    async fn aggregates_plain_text_tokens() {
        let ms = ModelStream::new(boxed(vec![
            Ok(StreamEvent::Token { text: "Hel".into() }),
            Ok(StreamEvent::Token { text: "lo".into() }),
            Ok(StreamEvent::Done {
                usage: None,
                finish_reason: Some("stop".into()),
            }),
        ]));
        let msg = ms.full_message().await.unwrap();
        assert_eq!(msg.content, "Hello");
        assert_eq!(msg.finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn reassembles_tool_call_from_started_and_delta_without_finished() {
        let ms = ModelStream::new(boxed(vec![
            Ok(StreamEvent::ToolCallStarted {
                call_id: "call_1".into(),
                tool_name: "run_ipython_cell".into(),
            }),
            Ok(StreamEvent::ToolCallDelta {
                call_id: "call_1".into(),
                delta: "{\"code\":".into(),
            }),
            Ok(StreamEvent::ToolCallDelta {
                call_id: "call_1".into(),
                delta: "\"1+1\"}".into(),
            }),
            Ok(StreamEvent::Done {
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                }),
                finish_reason: Some("tool_calls".into()),
            }),
        ]));
        let msg = ms.full_message().await.unwrap();
        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.tool_calls[0].call_id, "call_1");
        assert_eq!(msg.tool_calls[0].tool_name, "run_ipython_cell");
        assert_eq!(msg.tool_calls[0].arguments["code"], "1+1");
        assert_eq!(msg.usage.unwrap().total_tokens, 15);
    }

    #[tokio::test]
    async fn explicit_finished_event_takes_precedence() {
        let ms = ModelStream::new(boxed(vec![
            Ok(StreamEvent::ToolCallStarted {
                call_id: "call_2".into(),
                tool_name: "store_note".into(),
            }),
            Ok(StreamEvent::ToolCallFinished {
                call_id: "call_2".into(),
                tool_name: "store_note".into(),
                arguments: serde_json::json!({"title": "t"}),
            }),
        ]));
        let msg = ms.full_message().await.unwrap();
        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.tool_calls[0].arguments["title"], "t");
    }

    #[tokio::test]
    async fn stream_error_event_propagates() {
        let ms = ModelStream::new(boxed(vec![Ok(StreamEvent::Error {
            message: "upstream timeout".into(),
        })]));
        let err = ms.full_message().await.unwrap_err();
        assert!(err.to_string().contains("upstream timeout"));
    }

    #[tokio::test]
    async fn consuming_twice_returns_internal_error() {
        let ms = ModelStream::new(boxed(vec![Ok(StreamEvent::Done {
            usage: None,
            finish_reason: None,
        })]));
        ms.full_message().await.unwrap();
        let err = ms.full_message().await.unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[tokio::test]
    async fn close_before_consume_prevents_full_message() {
        let ms = ModelStream::new(boxed(vec![Ok(StreamEvent::Token {
            text: "x".into(),
        })]));
        ms.close();
        let err = ms.full_message().await.unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
