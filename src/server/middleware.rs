//! Client-key auth middleware.
//!
//! Every request must carry either an `x-api-key` header or
//! `Authorization: Bearer <key>` matching one of `CLIENT_API_KEYS`, checked
//! in that order. If no client keys are configured at all, the server
//! refuses every request rather than silently running open.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::AppError;
use crate::pipeline::AppState;

fn bearer_token(req: &Request<Body>) -> Option<&str> {
    req.headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn api_key_header(req: &Request<Body>) -> Option<&str> {
    req.headers().get("x-api-key").and_then(|v| v.to_str().ok())
}

fn extract_client_key(req: &Request<Body>) -> Option<&str> {
    api_key_header(req).or_else(|| bearer_token(req))
}

pub async fn require_client_key(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    if state.config.client_api_keys.is_empty() {
        return Err(AppError::NoKeysConfigured);
    }
    match extract_client_key(&req) {
        Some(token) if state.config.client_api_keys.iter().any(|k| k == token) => {
            Ok(next.run(req).await)
        }
        Some(_) => Err(AppError::InvalidCredential),
        None => Err(AppError::MissingCredential),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bearer_token() {
        let req = Request::builder()
            .header("authorization", "Bearer sk-test-123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&req), Some("sk-test-123"));
    }

    #[test]
    fn missing_header_yields_none() {
        let req = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(bearer_token(&req), None);
    }

    #[test]
    fn x_api_key_is_checked_before_bearer_token() {
        let req = Request::builder()
            .header("x-api-key", "sk-key-1")
            .header("authorization", "Bearer sk-other")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_client_key(&req), Some("sk-key-1"));
    }

    #[test]
    fn falls_back_to_bearer_token_when_no_api_key_header() {
        let req = Request::builder()
            .header("authorization", "Bearer sk-test-123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_client_key(&req), Some("sk-test-123"));
    }
}
