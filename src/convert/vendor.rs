//! Vendor wire shapes: the upstream payload, the SSE event kinds, and
//! the protocol-neutral `ClientMessage`/`VendorMessage` representations both
//! translators produce on the way to the wire.

use serde::{Deserialize, Serialize};

/// A single tool call resolved from a prior assistant turn, kept in the form
/// needed both for the vendor `assistant_tool_message`/`tool_message` pair
/// and for cache-key derivation.
#[derive(Debug, Clone)]
pub struct ToolCallRef {
    pub id: String,
    pub name: String,
    /// The literal JSON-encoded arguments string (not re-parsed) — the
    /// message cache key hashes this exact string.
    pub arguments: String,
}

/// Protocol-neutral view of one input chat message, produced by both the
/// OpenAI and Anthropic request translators before cache-key derivation and
/// vendor-message construction.
#[derive(Debug, Clone)]
pub struct ClientMessage {
    /// `"system" | "user" | "assistant" | "tool"`.
    pub role: String,
    pub text: Option<String>,
    /// Non-empty only for assistant messages carrying tool calls.
    pub tool_calls: Vec<ToolCallRef>,
    /// Tool-result blocks resolved from a user turn (Anthropic shape);
    /// OpenAI tool messages arrive as one message per result already.
    pub tool_results: Vec<ToolResultRef>,
    /// Inline media (images) attached to this turn.
    pub media: Vec<MediaRef>,
}

#[derive(Debug, Clone)]
pub struct ToolResultRef {
    pub tool_use_id: String,
    pub tool_name: String,
    pub result: String,
}

#[derive(Debug, Clone)]
pub struct MediaRef {
    pub media_type: String,
    pub data: String,
}

/// One vendor message in the translated conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VendorMessage {
    #[serde(rename = "system_message")]
    System { content: String },
    #[serde(rename = "user_message")]
    User { content: String },
    #[serde(rename = "assistant_message")]
    Assistant { content: String },
    #[serde(rename = "assistant_tool_message")]
    AssistantTool { id: String, #[serde(rename = "toolName")] tool_name: String },
    #[serde(rename = "tool_message")]
    Tool {
        id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        content: String,
    },
    #[serde(rename = "media_message")]
    Media {
        #[serde(rename = "mediaType")]
        media_type: String,
        data: String,
    },
}

/// A vendor tool definition attached under `parameters.data`.
#[derive(Debug, Clone, Serialize)]
pub struct VendorToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: VendorToolParameters,
}

#[derive(Debug, Clone, Serialize)]
pub struct VendorToolParameters {
    pub schema: serde_json::Value,
}

/// One entry of the upstream `parameters.data` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParametersDataEntry {
    pub fqdn: String,
    pub value: serde_json::Value,
}

/// The full upstream chat payload: `{prompt, profile, chat: {messages},
/// parameters?}`.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamChatPayload {
    pub prompt: &'static str,
    pub profile: String,
    pub chat: UpstreamChat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<UpstreamParameters>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpstreamChat {
    pub messages: Vec<VendorMessage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpstreamParameters {
    pub data: Vec<ParametersDataEntry>,
}

/// Fixed constant for the upstream `prompt` field.
pub const UPSTREAM_PROMPT: &str = "ij-chat-stream-proxy";
pub const UPSTREAM_TOOLS_FQDN: &str = "llm.parameters.tools";

/// One parsed upstream SSE event.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum UpstreamEvent {
    Content { content: String },
    ToolCall {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        content: String,
    },
    FunctionCall {
        #[serde(default)]
        name: String,
        #[serde(default)]
        content: String,
    },
    FinishMetadata {
        #[serde(default)]
        reason: String,
    },
}

/// Finish reason as reported by the vendor, before protocol-specific mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VendorFinishReason {
    ToolCall,
    Length,
    Stop,
    #[default]
    Unknown,
}

impl VendorFinishReason {
    pub fn from_upstream(reason: &str) -> Self {
        match reason {
            "tool_call" => VendorFinishReason::ToolCall,
            "length" => VendorFinishReason::Length,
            "stop" => VendorFinishReason::Stop,
            "" => VendorFinishReason::Unknown,
            _ => VendorFinishReason::Unknown,
        }
    }
}
