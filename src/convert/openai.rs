//! OpenAI-compatible request/response translation.

use serde::{Deserialize, Serialize};
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
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub tools: Vec<OpenAiTool>,
    #[serde(default)]
    pub tool_choice: Option<Value>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default)]
    pub tool_calls: Vec<OpenAiToolCall>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiToolCall {
    pub id: String,
    pub function: OpenAiFunctionCall,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiFunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: OpenAiFunctionDef,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiFunctionDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Value,
}

/// Flattens OpenAI content (a plain string or a content-part array with text
/// and `image_url` entries) into the neutral text + media representation.
fn flatten_content(content: &Value) -> (Option<String>, Vec<MediaRef>) {
    match content {
        Value::String(s) => (Some(s.clone()), Vec::new()),
        Value::Array(parts) => {
            let mut text = String::new();
            let mut media = Vec::new();
            for part in parts {
                match part.get("type").and_then(Value::as_str) {
                    Some("text") => {
                        if let Some(t) = part.get("text").and_then(Value::as_str) {
                            text.push_str(t);
                        }
                    }
                    Some("image_url") => {
                        if let Some(url) = part
                            .get("image_url")
                            .and_then(|v| v.get("url"))
                            .and_then(Value::as_str)
                        {
                            media.push(MediaRef {
                                media_type: "image".to_string(),
                                data: url.to_string(),
                            });
                        }
                    }
                    _ => {}
                }
            }
            (if text.is_empty() { None } else { Some(text) }, media)
        }
        Value::Null => (None, Vec::new()),
        other => (Some(other.to_string()), Vec::new()),
    }
}

/// Converts the request body's messages into the neutral [`ClientMessage`]
/// form used for cache-key derivation and vendor translation.
pub fn to_client_messages(messages: &[OpenAiMessage]) -> Vec<ClientMessage> {
    messages
        .iter()
        .map(|m| {
            let (text, media) = m
                .content
                .as_ref()
                .map(flatten_content)
                .unwrap_or((None, Vec::new()));
            let tool_calls = m
                .tool_calls
                .iter()
                .map(|tc| ToolCallRef {
                    id: tc.id.clone(),
                    name: tc.function.name.clone(),
                    arguments: tc.function.arguments.clone(),
                })
                .collect();
            let tool_results = if m.role == "tool" {
                vec![ToolResultRef {
                    tool_use_id: m.tool_call_id.clone().unwrap_or_default(),
                    tool_name: m.name.clone().unwrap_or_default(),
                    result: text.clone().unwrap_or_default(),
                }]
            } else {
                Vec::new()
            };
            ClientMessage {
                role: m.role.clone(),
                text,
                tool_calls,
                tool_results,
                media,
            }
        })
        .collect()
}

/// Translates the neutral message list into vendor wire messages.
pub fn to_vendor_messages(messages: &[ClientMessage]) -> Vec<VendorMessage> {
    let mut out = Vec::new();
    for message in messages {
        match message.role.as_str() {
            "system" => out.push(VendorMessage::System {
                content: message.text.clone().unwrap_or_default(),
            }),
            "user" => {
                out.push(VendorMessage::User {
                    content: message.text.clone().unwrap_or_default(),
                });
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
            "tool" => {
                for result in &message.tool_results {
                    out.push(VendorMessage::Tool {
                        id: result.tool_use_id.clone(),
                        tool_name: result.tool_name.clone(),
                        content: result.result.clone(),
                    });
                }
            }
            _ => {}
        }
    }
    out
}

/// Normalizes the request's tool definitions and wraps them into the
/// upstream `parameters.data` array.
pub fn build_upstream_parameters(
    tools: &[OpenAiTool],
) -> Result<Option<UpstreamParameters>, AppError> {
    if tools.is_empty() {
        return Ok(None);
    }
    let mut data = Vec::with_capacity(tools.len());
    for tool in tools {
        if !toolschema::validate_function_name(&tool.function.name) {
            log::warn!("dropping tool '{}': invalid function name", tool.function.name);
            continue;
        }
        let schema = toolschema::normalize_schema(&tool.function.parameters)
            .map_err(|e| AppError::ToolValidation(e.to_string()))?;
        data.push(ParametersDataEntry {
            fqdn: UPSTREAM_TOOLS_FQDN.to_string(),
            value: serde_json::json!({
                "name": tool.function.name,
                "description": tool.function.description,
                "parameters": schema,
            }),
        });
    }
    Ok(Some(UpstreamParameters { data }))
}

/// Builds the full upstream request payload for one chat completion.
pub fn build_upstream_payload(
    profile: String,
    client_messages: &[ClientMessage],
    tools: &[OpenAiTool],
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

/// Accumulated assistant output used to build the final non-streaming
/// response and the trailing streaming chunk.
#[derive(Debug, Default)]
pub struct CompletionAccumulator {
    pub content: String,
    pub tool_calls: Vec<ToolCallRef>,
    pub finish_reason: VendorFinishReason,
}

/// Builds a non-streaming `chat.completion` response body.
pub fn build_completion_response(model: &str, acc: &CompletionAccumulator) -> Value {
    let saw_tool_call = !acc.tool_calls.is_empty();
    let finish_reason = finish_reason::to_openai(acc.finish_reason, saw_tool_call);
    let message = if saw_tool_call {
        serde_json::json!({
            "role": "assistant",
            "content": Value::Null,
            "tool_calls": acc.tool_calls.iter().map(|c| serde_json::json!({
                "id": c.id,
                "type": "function",
                "function": { "name": c.name, "arguments": c.arguments },
            })).collect::<Vec<_>>(),
        })
    } else {
        serde_json::json!({ "role": "assistant", "content": acc.content })
    };

    serde_json::json!({
        "id": format!("chatcmpl-{}", Uuid::new_v4()),
        "object": "chat.completion",
        "created": chrono::Utc::now().timestamp(),
        "model": model,
        "choices": [{
            "index": 0,
            "message": message,
            "finish_reason": finish_reason,
        }],
        "usage": { "prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0 },
    })
}

/// Builds one `chat.completion.chunk` streaming event body.
pub fn build_completion_chunk(
    id: &str,
    model: &str,
    delta: Value,
    finish_reason: Option<&str>,
) -> Value {
    serde_json::json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": chrono::Utc::now().timestamp(),
        "model": model,
        "choices": [{
            "index": 0,
            "delta": delta,
            "finish_reason": finish_reason,
        }],
    })
}

#[derive(Debug, Serialize)]
pub struct ModelListEntry {
    pub id: String,
    pub object: &'static str,
    pub owned_by: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_string_content_flattens_to_text() {
        let (text, media) = flatten_content(&Value::String("hello".to_string()));
        assert_eq!(text, Some("hello".to_string()));
        assert!(media.is_empty());
    }

    #[test]
    fn content_parts_collect_text_and_media() {
        let content = serde_json::json!([
            { "type": "text", "text": "describe this" },
            { "type": "image_url", "image_url": { "url": "data:image/png;base64,AAA" } }
        ]);
        let (text, media) = flatten_content(&content);
        assert_eq!(text, Some("describe this".to_string()));
        assert_eq!(media.len(), 1);
    }

    #[test]
    fn assistant_tool_call_produces_assistant_tool_message() {
        let messages = vec![ClientMessage {
            role: "assistant".to_string(),
            text: None,
            tool_calls: vec![ToolCallRef {
                id: "call_1".to_string(),
                name: "get_weather".to_string(),
                arguments: "{}".to_string(),
            }],
            tool_results: Vec::new(),
            media: Vec::new(),
        }];
        let vendor = to_vendor_messages(&messages);
        assert!(matches!(vendor[0], VendorMessage::AssistantTool { .. }));
    }

    #[test]
    fn completion_response_with_tool_calls_omits_content() {
        let acc = CompletionAccumulator {
            content: String::new(),
            tool_calls: vec![ToolCallRef {
                id: "call_1".to_string(),
                name: "f".to_string(),
                arguments: "{}".to_string(),
            }],
            finish_reason: VendorFinishReason::ToolCall,
        };
        let resp = build_completion_response("gpt-4", &acc);
        assert_eq!(resp["choices"][0]["finish_reason"], "tool_calls");
        assert_eq!(resp["choices"][0]["message"]["content"], Value::Null);
    }
}
