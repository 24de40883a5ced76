//! Vendor → protocol finish-reason mapping.

use super::vendor::VendorFinishReason;

/// OpenAI `finish_reason` values: `"stop" | "length" | "tool_calls"`.
pub fn to_openai(reason: VendorFinishReason, saw_tool_call: bool) -> &'static str {
    if saw_tool_call {
        return "tool_calls";
    }
    match reason {
        VendorFinishReason::ToolCall => "tool_calls",
        VendorFinishReason::Length => "length",
        VendorFinishReason::Stop | VendorFinishReason::Unknown => "stop",
    }
}

/// Anthropic `stop_reason` values: `"end_turn" | "max_tokens" | "tool_use"`.
pub fn to_anthropic(reason: VendorFinishReason, saw_tool_call: bool) -> &'static str {
    if saw_tool_call {
        return "tool_use";
    }
    match reason {
        VendorFinishReason::ToolCall => "tool_use",
        VendorFinishReason::Length => "max_tokens",
        VendorFinishReason::Stop | VendorFinishReason::Unknown => "end_turn",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_wins_over_reported_reason() {
        assert_eq!(to_openai(VendorFinishReason::Stop, true), "tool_calls");
        assert_eq!(to_anthropic(VendorFinishReason::Stop, true), "tool_use");
    }

    #[test]
    fn length_maps_to_max_tokens() {
        assert_eq!(to_openai(VendorFinishReason::Length, false), "length");
        assert_eq!(to_anthropic(VendorFinishReason::Length, false), "max_tokens");
    }

    #[test]
    fn unknown_defaults_to_a_normal_stop() {
        assert_eq!(to_openai(VendorFinishReason::Unknown, false), "stop");
        assert_eq!(to_anthropic(VendorFinishReason::Unknown, false), "end_turn");
    }
}
