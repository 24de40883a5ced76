//! Cache key derivation.
//!
//! Every key carries a format version tag so a redeploy can invalidate all
//! entries of a kind by bumping the constant.

use sha1::{Digest, Sha1};

use crate::convert::vendor::ClientMessage;

const MESSAGES_KEY_VERSION: &str = "v1";
const TOOLS_KEY_VERSION: &str = "v1";
const QUOTA_KEY_VERSION: &str = "v1";
const PARAMS_KEY_VERSION: &str = "v1";

fn hex_sha1(parts: &[&str]) -> String {
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]); // separator so adjacent fields can't collide
    }
    hex::encode(hasher.finalize())
}

/// SHA-1 over the version tag plus each message's role, text content, and —
/// for assistant tool-call messages — each tool call's id, function name,
/// and literal arguments string.
pub fn messages_cache_key(messages: &[ClientMessage]) -> String {
    let mut parts: Vec<String> = vec![MESSAGES_KEY_VERSION.to_string()];
    for message in messages {
        parts.push(message.role.clone());
        parts.push(message.text.clone().unwrap_or_default());
        for call in &message.tool_calls {
            parts.push(call.id.clone());
            parts.push(call.name.clone());
            parts.push(call.arguments.clone());
        }
    }
    let refs: Vec<&str> = parts.iter().map(|s| s.as_str()).collect();
    hex_sha1(&refs)
}

/// Describes one client tool for the purpose of key derivation — parameter
/// schemas are deliberately excluded (the validated form is deterministic
/// from the name within a client session).
pub struct ToolKeySource<'a> {
    pub kind: &'a str,
    pub function_name: &'a str,
}

/// SHA-1 over the version tag plus each tool's type and function name.
pub fn tools_cache_key(tools: &[ToolKeySource<'_>]) -> String {
    let mut parts: Vec<&str> = vec![TOOLS_KEY_VERSION];
    for tool in tools {
        parts.push(tool.kind);
        parts.push(tool.function_name);
    }
    hex_sha1(&parts)
}

/// Quota cache key: version + license id, or, if absent, version + the
/// first 8 chars of the JWT. Never the full JWT.
pub fn quota_cache_key(license_id: Option<&str>, jwt: &str) -> String {
    match license_id {
        Some(license_id) => format!("{}:{}", QUOTA_KEY_VERSION, license_id),
        None => {
            let prefix: String = jwt.chars().take(8).collect();
            format!("{}:{}", QUOTA_KEY_VERSION, prefix)
        }
    }
}

/// SHA-1 over the serialized tool parameter schema.
pub fn parameter_transform_key(schema: &serde_json::Value) -> String {
    let serialized = serde_json::to_string(schema).unwrap_or_default();
    hex_sha1(&[PARAMS_KEY_VERSION, serialized.as_str()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_derivation_is_deterministic() {
        let schema = serde_json::json!({"type": "object"});
        let k1 = parameter_transform_key(&schema);
        let k2 = parameter_transform_key(&schema);
        assert_eq!(k1, k2);
    }

    #[test]
    fn quota_key_never_carries_full_jwt() {
        let jwt = "header.payload_with_lots_of_content.signature";
        let key = quota_cache_key(None, jwt);
        assert!(!key.contains("signature"));
        assert!(!key.contains(jwt));
    }

    #[test]
    fn quota_key_prefers_license_id() {
        let key = quota_cache_key(Some("lic-1"), "whatever-jwt-value");
        assert_eq!(key, "v1:lic-1");
    }
}
