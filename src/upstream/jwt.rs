//! Unverified decode of a JWT's `exp` claim.
//!
//! The proxy never validates the vendor's signature — it only needs to know
//! when to proactively refresh, so it reads the payload segment and trusts
//! it the way it trusts any other vendor response body.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("token does not have 3 dot-separated segments")]
    MalformedSegments,
    #[error("payload segment is not valid base64url: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("payload segment is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload is missing an exp claim")]
    MissingExp,
}

#[derive(Debug, Deserialize)]
struct Claims {
    exp: Option<i64>,
}

/// Extracts the `exp` claim (Unix seconds) from a JWT without verifying its
/// signature.
pub fn parse_expiry(token: &str) -> Result<i64, JwtError> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_sig)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(JwtError::MalformedSegments);
    };
    if parts.next().is_some() {
        return Err(JwtError::MalformedSegments);
    }
    let bytes = URL_SAFE_NO_PAD.decode(payload)?;
    let claims: Claims = serde_json::from_slice(&bytes)?;
    claims.exp.ok_or(JwtError::MissingExp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_payload(json: &str) -> String {
        URL_SAFE_NO_PAD.encode(json.as_bytes())
    }

    #[test]
    fn extracts_exp_from_a_well_formed_token() {
        let payload = encode_payload(r#"{"exp":1999999999,"sub":"acct"}"#);
        let token = format!("header.{payload}.sig");
        assert_eq!(parse_expiry(&token).unwrap(), 1999999999);
    }

    #[test]
    fn rejects_a_token_without_three_segments() {
        assert!(matches!(
            parse_expiry("onlyonesegment"),
            Err(JwtError::MalformedSegments)
        ));
        assert!(matches!(
            parse_expiry("a.b.c.d"),
            Err(JwtError::MalformedSegments)
        ));
    }

    #[test]
    fn rejects_a_payload_missing_exp() {
        let payload = encode_payload(r#"{"sub":"acct"}"#);
        let token = format!("header.{payload}.sig");
        assert!(matches!(parse_expiry(&token), Err(JwtError::MissingExp)));
    }
}
