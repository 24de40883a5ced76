//! SSE line framing for the upstream streaming endpoint.
//!
//! The vendor stream is plain `data: <json>\n` lines; there is no `event:`
//! field, no multi-line data, and blank lines between events are ignored.

use crate::convert::vendor::UpstreamEvent;

/// Parses one raw line of the upstream byte stream. Returns `None` for blank
/// lines and anything that isn't a `data:` line; returns `Some(Err(_))` when
/// the JSON payload fails to parse, so callers can surface a clear error
/// instead of silently dropping a malformed event.
pub fn parse_sse_line(line: &str) -> Option<Result<UpstreamEvent, serde_json::Error>> {
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(serde_json::from_str(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_non_data_lines() {
        assert!(parse_sse_line("").is_none());
        assert!(parse_sse_line(": comment").is_none());
    }

    #[test]
    fn parses_content_event() {
        let line = r#"data: {"type":"Content","content":"hi"}"#;
        let parsed = parse_sse_line(line).unwrap().unwrap();
        match parsed {
            UpstreamEvent::Content { content } => assert_eq!(content, "hi"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn done_sentinel_is_ignored() {
        assert!(parse_sse_line("data: [DONE]").is_none());
    }
}
