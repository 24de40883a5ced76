//! OpenAI-facing orchestration: translate, dispatch, reassemble.

use std::time::Instant;

use axum::response::sse::Event;
use futures_util::{Stream, StreamExt};
use serde_json::Value;

use crate::cache::keys::{messages_cache_key, tools_cache_key, ToolKeySource};
use crate::convert::openai::{
    build_completion_chunk, build_completion_response, to_client_messages, to_vendor_messages,
    ChatCompletionRequest, CompletionAccumulator,
};
use crate::convert::vendor::{UpstreamChat, UpstreamParameters};
use crate::error::AppError;
use crate::metrics::RequestRecord;

use super::{resolve_profile, AppState, ToolCallDelta, ToolCallTracker};

/// Runs a non-streaming `/v1/chat/completions` request to completion.
pub async fn handle(state: &AppState, request: ChatCompletionRequest) -> Result<Value, AppError> {
    let started = Instant::now();
    let profile = resolve_profile(&state.config, &request.model);
    let client_messages = to_client_messages(&request.messages);

    let vendor_messages = translated_messages(state, &client_messages).await?;
    let parameters = normalized_tools(state, &request.tools).await?;

    let lease = state
        .accounts
        .acquire(&state.upstream, &state.cache, None)
        .await?;
    let payload = crate::convert::vendor::UpstreamChatPayload {
        prompt: crate::convert::vendor::UPSTREAM_PROMPT,
        profile,
        chat: UpstreamChat { messages: vendor_messages },
        parameters,
    };

    let jwt = lease
        .account()
        .current_jwt()
        .await
        .ok_or(AppError::InvalidCredential)?;
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
            protocol: "openai",
            model: request.model.clone(),
            account_id: lease.account().id.clone(),
            status: 200,
            duration_ms: started.elapsed().as_millis() as u64,
            prompt_cache_hit: false,
        })
        .await;

    Ok(build_completion_response(
        &request.model,
        &CompletionAccumulator {
            content,
            tool_calls,
            finish_reason,
        },
    ))
}

/// Runs a streaming `/v1/chat/completions` request, forwarding vendor
/// events as `chat.completion.chunk` SSE events.
pub async fn handle_stream(
    state: &AppState,
    request: ChatCompletionRequest,
) -> Result<impl Stream<Item = Result<Event, AppError>>, AppError> {
    let profile = resolve_profile(&state.config, &request.model);
    let client_messages = to_client_messages(&request.messages);
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

    let id = format!("chatcmpl-{}", uuid::Uuid::new_v4());
    let model = request.model.clone();
    let metrics = state.metrics.clone();

    let stream = async_stream::stream! {
        // keep the lease alive for the duration of the stream
        let _lease = lease;
        let mut events = Box::pin(events);
        let mut saw_tool_call = false;
        let mut got_finish = false;
        let mut tracker = ToolCallTracker::new();
        yield Ok(Event::default().json_data(build_completion_chunk(
            &id, &model, serde_json::json!({ "role": "assistant" }), None,
        )).unwrap());

        while let Some(event) = events.next().await {
            match event {
                Ok(crate::convert::vendor::UpstreamEvent::Content { content }) => {
                    yield Ok(Event::default().json_data(build_completion_chunk(
                        &id, &model, serde_json::json!({ "content": content }), None,
                    )).unwrap());
                }
                Ok(crate::convert::vendor::UpstreamEvent::ToolCall { id: call_id, name, content }) => {
                    saw_tool_call = true;
                    let delta = tracker.ingest_tool_call(call_id, name, content);
                    yield Ok(Event::default().json_data(build_completion_chunk(
                        &id, &model, tool_call_delta_json(&delta), None,
                    )).unwrap());
                }
                Ok(crate::convert::vendor::UpstreamEvent::FunctionCall { name, content }) => {
                    saw_tool_call = true;
                    let delta = tracker.ingest_function_call(name, content);
                    yield Ok(Event::default().json_data(build_completion_chunk(
                        &id, &model, tool_call_delta_json(&delta), None,
                    )).unwrap());
                }
                Ok(crate::convert::vendor::UpstreamEvent::FinishMetadata { reason }) => {
                    got_finish = true;
                    let vendor_reason = crate::convert::vendor::VendorFinishReason::from_upstream(&reason);
                    let finish_reason = crate::convert::finish_reason::to_openai(vendor_reason, saw_tool_call);
                    if saw_tool_call {
                        metrics.record_tool_call();
                    }
                    yield Ok(Event::default().json_data(build_completion_chunk(
                        &id, &model, serde_json::json!({}), Some(finish_reason),
                    )).unwrap());
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
        if !got_finish {
            let finish_reason = crate::convert::finish_reason::to_openai(
                crate::convert::vendor::VendorFinishReason::Unknown, saw_tool_call,
            );
            if saw_tool_call {
                metrics.record_tool_call();
            }
            yield Ok(Event::default().json_data(build_completion_chunk(
                &id, &model, serde_json::json!({}), Some(finish_reason),
            )).unwrap());
        }
        yield Ok(Event::default().data("[DONE]"));
    };

    Ok(stream)
}

fn tool_call_delta_json(delta: &ToolCallDelta) -> Value {
    match delta {
        ToolCallDelta::Started { index, id, name, arguments } => serde_json::json!({
            "tool_calls": [{
                "index": index, "id": id, "type": "function",
                "function": { "name": name, "arguments": arguments },
            }]
        }),
        ToolCallDelta::Continued { index, arguments } => serde_json::json!({
            "tool_calls": [{ "index": index, "function": { "arguments": arguments } }]
        }),
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
    tools: &[crate::convert::openai::OpenAiTool],
) -> Result<Option<UpstreamParameters>, AppError> {
    if tools.is_empty() {
        return Ok(None);
    }
    let sources: Vec<ToolKeySource> = tools
        .iter()
        .map(|t| ToolKeySource {
            kind: t.kind.as_str(),
            function_name: t.function.name.as_str(),
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
    let parameters = crate::convert::openai::build_upstream_parameters(tools)?;
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
