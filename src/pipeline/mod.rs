//! Request orchestration: resolves the target model, leases an
//! account, dispatches upstream, and reassembles the vendor event stream
//! into either a single completion or a forwarded stream of protocol
//! events.

pub mod anthropic;
pub mod openai;

use std::sync::Arc;

use futures_util::{Stream, StreamExt};

use crate::accounts::AccountPool;
use crate::cache::CacheService;
use crate::config::Config;
use crate::convert::vendor::{ToolCallRef, UpstreamEvent, VendorFinishReason};
use crate::error::AppError;
use crate::metrics::MetricsCore;
use crate::upstream::UpstreamClient;

/// Shared handles every handler needs to process a request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub cache: CacheService,
    pub accounts: Arc<AccountPool>,
    pub upstream: UpstreamClient,
    pub metrics: MetricsCore,
}

/// Resolves a client-facing model id into the vendor profile id (the
/// mapping loaded from `models.json`). Unknown model ids pass through
/// unchanged, on the assumption that the caller already knows the vendor's
/// own profile name.
pub fn resolve_profile(config: &Config, model: &str) -> String {
    config
        .models
        .get(model)
        .cloned()
        .unwrap_or_else(|| model.to_string())
}

#[derive(Default)]
struct ToolCallBuilder {
    id: String,
    name: String,
    arguments: String,
}

/// A reassembled tool-call event ready for a client-facing delta: either the
/// start of a new call (with its position among all calls in this stream) or
/// a continuation chunk appended to the currently-open call.
#[derive(Debug, Clone)]
pub enum ToolCallDelta {
    Started {
        index: usize,
        id: String,
        name: String,
        arguments: String,
    },
    Continued {
        index: usize,
        arguments: String,
    },
}

/// Reassembles raw upstream tool-call/function-call fragments into complete
/// [`ToolCallRef`]s, keyed on "a new call opens" rather than on which event
/// variant is in play — `ToolCall` and `FunctionCall` events interleave
/// safely either way. Also tracks a running per-call index (0, 1, 2, ...) so
/// streaming handlers can emit stable `index` fields across chunks without
/// re-deriving the same boundary logic themselves.
pub struct ToolCallTracker {
    current: Option<ToolCallBuilder>,
    next_index: usize,
    finished: Vec<ToolCallRef>,
}

impl ToolCallTracker {
    pub fn new() -> Self {
        Self {
            current: None,
            next_index: 0,
            finished: Vec::new(),
        }
    }

    fn flush_current(&mut self) {
        if let Some(builder) = self.current.take() {
            self.finished.push(ToolCallRef {
                id: if builder.id.is_empty() {
                    uuid::Uuid::new_v4().to_string()
                } else {
                    builder.id
                },
                name: builder.name,
                arguments: builder.arguments,
            });
        }
    }

    fn open(&mut self, id: String, name: String, content: String) -> ToolCallDelta {
        self.flush_current();
        let index = self.next_index;
        self.next_index += 1;
        self.current = Some(ToolCallBuilder {
            id: id.clone(),
            name: name.clone(),
            arguments: content.clone(),
        });
        ToolCallDelta::Started {
            index,
            id,
            name,
            arguments: content,
        }
    }

    /// A non-empty `id` different from the currently-open call starts a new
    /// one; an empty `id` (or the same `id`) continues the open call.
    pub fn ingest_tool_call(&mut self, id: String, name: String, content: String) -> ToolCallDelta {
        let is_new = !id.is_empty() && self.current.as_ref().map(|c| c.id != id).unwrap_or(true);
        if is_new {
            self.open(id, name, content)
        } else {
            if let Some(builder) = self.current.as_mut() {
                builder.arguments.push_str(&content);
            } else {
                return self.open(id, name, content);
            }
            ToolCallDelta::Continued {
                index: self.next_index.saturating_sub(1),
                arguments: content,
            }
        }
    }

    /// Legacy function-call events carry no id, so a name change is the only
    /// available call boundary.
    pub fn ingest_function_call(&mut self, name: String, content: String) -> ToolCallDelta {
        let is_new = self.current.as_ref().map(|c| c.name != name).unwrap_or(true);
        if is_new {
            self.open(String::new(), name, content)
        } else {
            if let Some(builder) = self.current.as_mut() {
                builder.arguments.push_str(&content);
            } else {
                return self.open(String::new(), name, content);
            }
            ToolCallDelta::Continued {
                index: self.next_index.saturating_sub(1),
                arguments: content,
            }
        }
    }

    /// Finalizes any open call and returns every completed one in order.
    pub fn finish(mut self) -> Vec<ToolCallRef> {
        self.flush_current();
        self.finished
    }
}

impl Default for ToolCallTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Drains an upstream event stream into a single completed response,
/// producing the same assistant content/tool-call/finish-reason triple the
/// non-streaming handlers render.
pub async fn accumulate(
    mut events: impl Stream<Item = Result<UpstreamEvent, AppError>> + Unpin,
) -> Result<(String, Vec<ToolCallRef>, VendorFinishReason), AppError> {
    let mut content = String::new();
    let mut tracker = ToolCallTracker::new();
    let mut finish_reason = VendorFinishReason::Unknown;

    while let Some(event) = events.next().await {
        match event? {
            UpstreamEvent::Content { content: chunk } => content.push_str(&chunk),
            UpstreamEvent::ToolCall { id, name, content: chunk } => {
                tracker.ingest_tool_call(id, name, chunk);
            }
            UpstreamEvent::FunctionCall { name, content: chunk } => {
                tracker.ingest_function_call(name, chunk);
            }
            UpstreamEvent::FinishMetadata { reason } => {
                finish_reason = VendorFinishReason::from_upstream(&reason);
            }
        }
    }

    Ok((content, tracker.finish(), finish_reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[tokio::test]
    async fn accumulates_plain_text() {
        let events = stream::iter(vec![
            Ok(UpstreamEvent::Content { content: "hel".to_string() }),
            Ok(UpstreamEvent::Content { content: "lo".to_string() }),
            Ok(UpstreamEvent::FinishMetadata { reason: "stop".to_string() }),
        ]);
        let (content, tool_calls, reason) = accumulate(events).await.unwrap();
        assert_eq!(content, "hello");
        assert!(tool_calls.is_empty());
        assert_eq!(reason, VendorFinishReason::Stop);
    }

    #[tokio::test]
    async fn reassembles_a_chunked_tool_call() {
        let events = stream::iter(vec![
            Ok(UpstreamEvent::ToolCall {
                id: "call_1".to_string(),
                name: "get_weather".to_string(),
                content: "{\"city\":".to_string(),
            }),
            Ok(UpstreamEvent::ToolCall {
                id: "call_1".to_string(),
                name: "get_weather".to_string(),
                content: "\"NYC\"}".to_string(),
            }),
            Ok(UpstreamEvent::FinishMetadata { reason: "tool_call".to_string() }),
        ]);
        let (_, tool_calls, reason) = accumulate(events).await.unwrap();
        assert_eq!(tool_calls.len(), 1);
        assert_eq!(tool_calls[0].arguments, "{\"city\":\"NYC\"}");
        assert_eq!(reason, VendorFinishReason::ToolCall);
    }

    #[tokio::test]
    async fn a_new_tool_call_id_flushes_the_previous_one() {
        let events = stream::iter(vec![
            Ok(UpstreamEvent::ToolCall { id: "a".to_string(), name: "f".to_string(), content: "{}".to_string() }),
            Ok(UpstreamEvent::ToolCall { id: "b".to_string(), name: "g".to_string(), content: "{}".to_string() }),
        ]);
        let (_, tool_calls, _) = accumulate(events).await.unwrap();
        assert_eq!(tool_calls.len(), 2);
    }

    #[tokio::test]
    async fn tracker_assigns_sequential_indices_across_distinct_calls() {
        let mut tracker = ToolCallTracker::new();
        let first = tracker.ingest_tool_call("a".to_string(), "f".to_string(), "{}".to_string());
        let second = tracker.ingest_tool_call("b".to_string(), "g".to_string(), "{}".to_string());
        assert!(matches!(first, ToolCallDelta::Started { index: 0, .. }));
        assert!(matches!(second, ToolCallDelta::Started { index: 1, .. }));
    }

    #[tokio::test]
    async fn tracker_continuation_keeps_the_same_index() {
        let mut tracker = ToolCallTracker::new();
        let first = tracker.ingest_tool_call("a".to_string(), "f".to_string(), "{\"x\":".to_string());
        let second = tracker.ingest_tool_call(String::new(), String::new(), "1}".to_string());
        assert!(matches!(first, ToolCallDelta::Started { index: 0, .. }));
        assert!(matches!(second, ToolCallDelta::Continued { index: 0, .. }));
    }
}
