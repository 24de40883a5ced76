//! Anthropic-facing orchestration: translate, dispatch, reassemble.

use std::time::Instant;

use axum::response::sse::Event;
use futures_util::{Stream, StreamExt};
use serde_json::Value;

use crate::cache::keys::{messages_cache_key, tools_cache_key, ToolKeySource};
use crate::convert::anthropic::{
    build_message_response, to_client_messages, to_vendor_messages, CompletionAccumulator,
    MessagesRequest,
};
use crate::convert::vendor::{UpstreamChat, UpstreamParameters};
use crate::error::AppError;
use crate::metrics::RequestRecord;

use super::{resolve_profile, AppState, ToolCallDelta, ToolCallTracker};

pub async fn handle(state: &AppState, request: MessagesRequest) -> Result<Value, AppError> {
    let started = Instant::now();
    let profile = resolve_profile(&state.config, &request.model);
    let client_messages = to_client_messages(&request);

    let vendor_messages = translated_messages(state, &client_messages).await?;
    let parameters = normalized_tools(state, &request.tools).await?;

    let lease = state
        .accounts
        .acquire(&state.upstream, &state.cache, None)
        .await?;
    let jwt = lease
        .account()
        .current_jwt()
        .await
        .ok_or(AppError::InvalidCredential)?;
    let payload = crate::convert::vendor::UpstreamChatPayload {
        prompt: crate::convert::vendor::UPSTREAM_PROMPT,
        profile,
        chat: UpstreamChat { messages: vendor_messages },
        parameters,
    };
    let events = match state.upstream.stream_chat(&jwt, &payload).await {
        Ok(events) => events,
        Err(AppError::QuotaExhausted) => {
            lease.account().mark_quota_exhausted().await;
            return Err(AppError::QuotaExhausted);
        }
        Err(e) => return Err(e),
    };
    let (content, tool_calls, finish_reason) = super::accumulate(Box::pin(events)).await?;

    if !tool_calls.is_empty() {
        state.metrics.record_tool_call();
    }
    state.metrics.record_request(200);
    state
        .metrics
        .push_record(RequestRecord {
            timestamp_nanos: now_nanos(),
            protocol: "anthropic",
            model: request.model.clone(),
            account_id: lease.account().id.clone(),
            status: 200,
            duration_ms: started.elapsed().as_millis() as u64,
            prompt_cache_hit: false,
        })
        .await;

    Ok(build_message_response(
        &request.model,
        &CompletionAccumulator {
            content,
            tool_calls,
            finish_reason,
        },
    ))
}

/// Runs a streaming `/v1/messages` request, forwarding vendor events as the
/// Anthropic `message_start`/`content_block_delta`/`message_stop` sequence.
pub async fn handle_stream(
    state: &AppState,
    request: MessagesRequest,
) -> Result<impl Stream<Item = Result<Event, AppError>>, AppError> {
    let profile = resolve_profile(&state.config, &request.model);
    let client_messages = to_client_messages(&request);
    let vendor_messages = translated_messages(state, &client_messages).await?;
    let parameters = normalized_tools(state, &request.tools).await?;

    let lease = state
        .accounts
        .acquire(&state.upstream, &state.cache, None)
        .await?;
    let jwt = lease
        .account()
        .current_jwt()
        .await
        .ok_or(AppError::InvalidCredential)?;
    let payload = crate::convert::vendor::UpstreamChatPayload {
        prompt: crate::convert::vendor::UPSTREAM_PROMPT,
        profile,
        chat: UpstreamChat { messages: vendor_messages },
        parameters,
    };
    let events = match state.upstream.stream_chat(&jwt, &payload).await {
        Ok(events) => events,
        Err(AppError::QuotaExhausted) => {
            lease.account().mark_quota_exhausted().await;
            return Err(AppError::QuotaExhausted);
        }
        Err(e) => return Err(e),
    };

    let id = format!("msg_{}", uuid::Uuid::new_v4());
    let model = request.model.clone();
    let metrics = state.metrics.clone();

    let stream = async_stream::stream! {
        let _lease = lease;
        let mut events = Box::pin(events);
        let mut saw_tool_call = false;
        let mut got_finish = false;
        let mut tracker = ToolCallTracker::new();
        // -1 means no content block has been opened yet; otherwise the
        // index of the block currently open for deltas.
        let mut block_index: i64 = -1;
        let mut text_block_open = false;

        yield Ok(Event::default().event("message_start").json_data(serde_json::json!({
            "type": "message_start",
            "message": {
                "id": id, "type": "message", "role": "assistant", "model": model,
                "content": [], "stop_reason": Value::Null, "usage": { "input_tokens": 0, "output_tokens": 0 },
            }
        })).unwrap());

        while let Some(event) = events.next().await {
            match event {
                Ok(crate::convert::vendor::UpstreamEvent::Content { content }) => {
                    if !text_block_open {
                        if block_index >= 0 {
                            yield Ok(Event::default().event("content_block_stop").json_data(serde_json::json!({
                                "type": "content_block_stop", "index": block_index,
                            })).unwrap());
                        }
                        block_index += 1;
                        text_block_open = true;
                        yield Ok(Event::default().event("content_block_start").json_data(serde_json::json!({
                            "type": "content_block_start", "index": block_index,
                            "content_block": { "type": "text", "text": "" },
                        })).unwrap());
                    }
                    yield Ok(Event::default().event("content_block_delta").json_data(serde_json::json!({
                        "type": "content_block_delta", "index": block_index,
                        "delta": { "type": "text_delta", "text": content },
                    })).unwrap());
                }
                Ok(crate::convert::vendor::UpstreamEvent::ToolCall { id: call_id, name, content }) => {
                    saw_tool_call = true;
                    let delta = tracker.ingest_tool_call(call_id, name, content);
                    for event in tool_call_block_events(&delta, &mut block_index, &mut text_block_open) {
                        yield Ok(event);
                    }
                }
                Ok(crate::convert::vendor::UpstreamEvent::FunctionCall { name, content }) => {
                    saw_tool_call = true;
                    let delta = tracker.ingest_function_call(name, content);
                    for event in tool_call_block_events(&delta, &mut block_index, &mut text_block_open) {
                        yield Ok(event);
                    }
                }
                Ok(crate::convert::vendor::UpstreamEvent::FinishMetadata { reason }) => {
                    got_finish = true;
                    let vendor_reason = crate::convert::vendor::VendorFinishReason::from_upstream(&reason);
                    let stop_reason = crate::convert::finish_reason::to_anthropic(vendor_reason, saw_tool_call);
                    if saw_tool_call {
                        metrics.record_tool_call();
                    }
                    yield Ok(Event::default().event("content_block_stop").json_data(serde_json::json!({
                        "type": "content_block_stop", "index": block_index.max(0),
                    })).unwrap());
                    yield Ok(Event::default().event("message_delta").json_data(serde_json::json!({
                        "type": "message_delta",
                        "delta": { "stop_reason": stop_reason, "stop_sequence": Value::Null },
                        "usage": { "output_tokens": 0 },
                    })).unwrap());
                    yield Ok(Event::default().event("message_stop").json_data(serde_json::json!({
                        "type": "message_stop",
                    })).unwrap());
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
        if !got_finish {
            let stop_reason = crate::convert::finish_reason::to_anthropic(
                crate::convert::vendor::VendorFinishReason::Unknown, saw_tool_call,
            );
            if saw_tool_call {
                metrics.record_tool_call();
            }
            yield Ok(Event::default().event("content_block_stop").json_data(serde_json::json!({
                "type": "content_block_stop", "index": block_index.max(0),
            })).unwrap());
            yield Ok(Event::default().event("message_delta").json_data(serde_json::json!({
                "type": "message_delta",
                "delta": { "stop_reason": stop_reason, "stop_sequence": Value::Null },
                "usage": { "output_tokens": 0 },
            })).unwrap());
            yield Ok(Event::default().event("message_stop").json_data(serde_json::json!({
                "type": "message_stop",
            })).unwrap());
        }
    };

    Ok(stream)
}

/// Translates a [`ToolCallDelta`] into the `content_block_start`/
/// `content_block_delta` events for a new call, or a lone delta for a
/// continuation, closing the previously-open block first when one exists.
fn tool_call_block_events(
    delta: &ToolCallDelta,
    block_index: &mut i64,
    text_block_open: &mut bool,
) -> Vec<Event> {
    match delta {
        ToolCallDelta::Started { id, name, arguments, .. } => {
            let mut events = Vec::new();
            if *block_index >= 0 {
                events.push(
                    Event::default().event("content_block_stop").json_data(serde_json::json!({
                        "type": "content_block_stop", "index": *block_index,
                    })).unwrap(),
                );
            }
            *block_index += 1;
            *text_block_open = false;
            events.push(
                Event::default().event("content_block_start").json_data(serde_json::json!({
                    "type": "content_block_start", "index": *block_index,
                    "content_block": { "type": "tool_use", "id": id, "name": name, "input": {} },
                })).unwrap(),
            );
            events.push(
                Event::default().event("content_block_delta").json_data(serde_json::json!({
                    "type": "content_block_delta", "index": *block_index,
                    "delta": { "type": "input_json_delta", "partial_json": arguments },
                })).unwrap(),
            );
            events
        }
        ToolCallDelta::Continued { arguments, .. } => {
            vec![Event::default().event("content_block_delta").json_data(serde_json::json!({
                "type": "content_block_delta", "index": *block_index,
                "delta": { "type": "input_json_delta", "partial_json": arguments },
            })).unwrap()]
        }
    }
}

async fn translated_messages(
    state: &AppState,
    client_messages: &[crate::convert::vendor::ClientMessage],
) -> Result<Vec<crate::convert::vendor::VendorMessage>, AppError> {
    let key = messages_cache_key(client_messages);
    if let Some(cached) = state.cache.get_translated_messages(&key).await {
        state.metrics.record_cache_hit();
        return serde_json::from_str(&cached)
            .map_err(|e| AppError::Internal(format!("corrupt cached vendor messages: {e}")));
    }
    state.metrics.record_cache_miss();
    let vendor_messages = to_vendor_messages(client_messages);
    if let Ok(serialized) = serde_json::to_string(&vendor_messages) {
        state.cache.set_translated_messages(key, serialized).await;
    }
    Ok(vendor_messages)
}

async fn normalized_tools(
    state: &AppState,
    tools: &[crate::convert::anthropic::AnthropicTool],
) -> Result<Option<UpstreamParameters>, AppError> {
    if tools.is_empty() {
        return Ok(None);
    }
    let sources: Vec<ToolKeySource> = tools
        .iter()
        .map(|t| ToolKeySource {
            kind: "custom",
            function_name: t.name.as_str(),
        })
        .collect();
    let key = tools_cache_key(&sources);
    if let Some(cached) = state.cache.get_normalized_tools(&key).await {
        state.metrics.record_cache_hit();
        let data: Vec<crate::convert::vendor::ParametersDataEntry> =
            serde_json::from_value(cached.clone())
                .map_err(|e| AppError::Internal(format!("corrupt cached tool schema: {e}")))?;
        return Ok(Some(UpstreamParameters { data }));
    }
    state.metrics.record_cache_miss();
    let parameters = crate::convert::anthropic::build_upstream_parameters(tools)?;
    if let Some(parameters) = &parameters {
        if let Ok(value) = serde_json::to_value(&parameters.data) {
            state.cache.set_normalized_tools(key, value).await;
        }
    }
    Ok(parameters)
}

fn now_nanos() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}
