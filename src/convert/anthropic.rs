//! Anthropic-compatible request/response translation.

use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::AppError;
use crate::toolschema;

use super::vendor::{
    MediaRef, ParametersDataEntry, ToolCallRef, ToolResultRef, UpstreamChat, UpstreamChatPayload,
    UpstreamParameters, VendorFinishReason, VendorMessage, UPSTREAM_PROMPT, UPSTREAM_TOOLS_FQDN,
};
use super::{finish_reason, vendor::ClientMessage};

#[derive(Debug, Deserialize)]
pub struct MessagesRequest {
    pub model: String,
    pub messages: Vec<AnthropicMessage>,
    #[serde(default)]
    pub system: Option<Value>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub tools: Vec<AnthropicTool>,
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: Value,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub input_schema: Value,
}

fn system_text(system: &Option<Value>) -> Option<String> {
    match system {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Array(parts)) => {
            let joined: String = parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n");
            if joined.is_empty() {
                None
            } else {
                Some(joined)
            }
        }
        _ => None,
    }
}

/// Splits one Anthropic message's content blocks into the neutral fields:
/// plain text, tool_use blocks (assistant turns), tool_result blocks (user
/// turns), and inline images.
fn split_content_blocks(
    content: &Value,
) -> (Option<String>, Vec<ToolCallRef>, Vec<ToolResultRef>, Vec<MediaRef>) {
    match content {
        Value::String(s) => (Some(s.clone()), Vec::new(), Vec::new(), Vec::new()),
        Value::Array(blocks) => {
            let mut text = String::new();
            let mut tool_calls = Vec::new();
            let mut tool_results = Vec::new();
            let mut media = Vec::new();
            for block in blocks {
                match block.get("type").and_then(Value::as_str) {
                    Some("text") => {
                        if let Some(t) = block.get("text").and_then(Value::as_str) {
                            text.push_str(t);
                        }
                    }
                    Some("tool_use") => {
                        let id = block.get("id").and_then(Value::as_str).unwrap_or_default();
                        let name = block.get("name").and_then(Value::as_str).unwrap_or_default();
                        let arguments = block
                            .get("input")
                            .map(|v| v.to_string())
                            .unwrap_or_else(|| "{}".to_string());
                        tool_calls.push(ToolCallRef {
                            id: id.to_string(),
                            name: name.to_string(),
                            arguments,
                        });
                    }
                    Some("tool_result") => {
                        let tool_use_id = block
                            .get("tool_use_id")
                            .and_then(Value::as_str)
                            .unwrap_or_default();
                        let result = match block.get("content") {
                            Some(Value::String(s)) => s.clone(),
                            Some(other) => other.to_string(),
                            None => String::new(),
                        };
                        tool_results.push(ToolResultRef {
                            tool_use_id: tool_use_id.to_string(),
                            tool_name: String::new(),
                            result,
                        });
                    }
                    Some("image") => {
                        if let Some(data) = block
                            .get("source")
                            .and_then(|s| s.get("data"))
                            .and_then(Value::as_str)
                        {
                            media.push(MediaRef {
                                media_type: "image".to_string(),
                                data: data.to_string(),
                            });
                        }
                    }
                    _ => {}
                }
            }
            (
                if text.is_empty() { None } else { Some(text) },
                tool_calls,
                tool_results,
                media,
            )
        }
        _ => (None, Vec::new(), Vec::new(), Vec::new()),
    }
}

/// Converts the request's `system` + `messages` into the neutral
/// [`ClientMessage`] form. The system prompt, if present, becomes the first
/// entry so cache-key derivation sees it like any other message.
pub fn to_client_messages(request: &MessagesRequest) -> Vec<ClientMessage> {
    let mut out = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = system_text(&request.system) {
        out.push(ClientMessage {
            role: "system".to_string(),
            text: Some(system),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            media: Vec::new(),
        });
    }
    for message in &request.messages {
        let (text, tool_calls, tool_results, media) = split_content_blocks(&message.content);
        out.push(ClientMessage {
            role: message.role.clone(),
            text,
            tool_calls,
            tool_results,
            media,
        });
    }
    out
}

/// Translates the neutral message list into vendor wire messages.
/// Shares the OpenAI adapter's mapping — the neutral representation already
/// carries everything role-specific.
pub fn to_vendor_messages(messages: &[ClientMessage]) -> Vec<VendorMessage> {
    let mut out = Vec::new();
    for message in messages {
        match message.role.as_str() {
            "system" => out.push(VendorMessage::System {
                content: message.text.clone().unwrap_or_default(),
            }),
            "user" => {
                if let Some(text) = &message.text {
                    out.push(VendorMessage::User {
                        content: text.clone(),
                    });
                }
                for result in &message.tool_results {
                    out.push(VendorMessage::Tool {
                        id: result.tool_use_id.clone(),
                        tool_name: result.tool_name.clone(),
                        content: result.result.clone(),
                    });
                }
                for media in &message.media {
                    out.push(VendorMessage::Media {
                        media_type: media.media_type.clone(),
                        data: media.data.clone(),
                    });
                }
            }
            "assistant" => {
                if let Some(text) = &message.text {
                    if !text.is_empty() {
                        out.push(VendorMessage::Assistant {
                            content: text.clone(),
                        });
                    }
                }
                for call in &message.tool_calls {
                    out.push(VendorMessage::AssistantTool {
                        id: call.id.clone(),
                        tool_name: call.name.clone(),
                    });
                }
            }
            _ => {}
        }
    }
    out
}

pub fn build_upstream_parameters(
    tools: &[AnthropicTool],
) -> Result<Option<UpstreamParameters>, AppError> {
    if tools.is_empty() {
        return Ok(None);
    }
    let mut data = Vec::with_capacity(tools.len());
    for tool in tools {
        if !toolschema::validate_function_name(&tool.name) {
            log::warn!("dropping tool '{}': invalid function name", tool.name);
            continue;
        }
        let schema = toolschema::normalize_schema(&tool.input_schema)
            .map_err(|e| AppError::ToolValidation(e.to_string()))?;
        data.push(ParametersDataEntry {
            fqdn: UPSTREAM_TOOLS_FQDN.to_string(),
            value: serde_json::json!({
                "name": tool.name,
                "description": tool.description,
                "parameters": schema,
            }),
        });
    }
    Ok(Some(UpstreamParameters { data }))
}

pub fn build_upstream_payload(
    profile: String,
    client_messages: &[ClientMessage],
    tools: &[AnthropicTool],
) -> Result<UpstreamChatPayload, AppError> {
    Ok(UpstreamChatPayload {
        prompt: UPSTREAM_PROMPT,
        profile,
        chat: UpstreamChat {
            messages: to_vendor_messages(client_messages),
        },
        parameters: build_upstream_parameters(tools)?,
    })
}

#[derive(Debug, Default)]
pub struct CompletionAccumulator {
    pub content: String,
    pub tool_calls: Vec<ToolCallRef>,
    pub finish_reason: VendorFinishReason,
}

/// Builds the non-streaming Anthropic `message` response body.
pub fn build_message_response(model: &str, acc: &CompletionAccumulator) -> Value {
    let saw_tool_call = !acc.tool_calls.is_empty();
    let stop_reason = finish_reason::to_anthropic(acc.finish_reason, saw_tool_call);

    let mut content = Vec::new();
    if !acc.content.is_empty() {
        content.push(serde_json::json!({ "type": "text", "text": acc.content }));
    }
    for call in &acc.tool_calls {
        let input: Value = serde_json::from_str(&call.arguments).unwrap_or(Value::Null);
        content.push(serde_json::json!({
            "type": "tool_use",
            "id": call.id,
            "name": call.name,
            "input": input,
        }));
    }

    serde_json::json!({
        "id": format!("msg_{}", Uuid::new_v4()),
        "type": "message",
        "role": "assistant",
        "model": model,
        "content": content,
        "stop_reason": stop_reason,
        "stop_sequence": Value::Null,
        "usage": { "input_tokens": 0, "output_tokens": 0 },
    })
}

/// Builds one Anthropic streaming event body — `event:` line plus `data:`
/// payload are assembled by the handler; this returns just the payload.
pub fn build_stream_event(event_type: &str, payload: Value) -> (String, Value) {
    (event_type.to_string(), payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_string_becomes_leading_system_message() {
        let request = MessagesRequest {
            model: "claude-3".to_string(),
            messages: vec![],
            system: Some(Value::String("be terse".to_string())),
            stream: false,
            tools: vec![],
            max_tokens: 100,
        };
        let messages = to_client_messages(&request);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].text, Some("be terse".to_string()));
    }

    #[test]
    fn tool_use_block_becomes_a_tool_call() {
        let content = serde_json::json!([
            { "type": "tool_use", "id": "toolu_1", "name": "search", "input": { "q": "rust" } }
        ]);
        let (_, tool_calls, _, _) = split_content_blocks(&content);
        assert_eq!(tool_calls.len(), 1);
        assert_eq!(tool_calls[0].name, "search");
    }

    #[test]
    fn tool_result_block_becomes_a_tool_result() {
        let content = serde_json::json!([
            { "type": "tool_result", "tool_use_id": "toolu_1", "content": "42" }
        ]);
        let (_, _, tool_results, _) = split_content_blocks(&content);
        assert_eq!(tool_results[0].tool_use_id, "toolu_1");
        assert_eq!(tool_results[0].result, "42");
    }

    #[test]
    fn message_response_with_tool_use_sets_tool_use_stop_reason() {
        let acc = CompletionAccumulator {
            content: String::new(),
            tool_calls: vec![ToolCallRef {
                id: "toolu_1".to_string(),
                name: "f".to_string(),
                arguments: "{}".to_string(),
            }],
            finish_reason: VendorFinishReason::Stop,
        };
        let resp = build_message_response("claude-3", &acc);
        assert_eq!(resp["stop_reason"], "tool_use");
    }
}
