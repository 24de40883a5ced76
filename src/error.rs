//! Error taxonomy for the proxy.
//!
//! Every variant falls into one of five categories: client-bad-request,
//! auth-failed, no-account-available, upstream-transient (including quota
//! exhaustion), and internal. [`AppError::into_response`] renders the
//! variant into the *calling protocol's* native error envelope, so handlers
//! convert a single error type into either an OpenAI or an Anthropic shaped
//! body depending on which endpoint is in flight.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Which client-facing wire protocol is handling the current request.
///
/// Error bodies differ between the two: OpenAI wraps in `{"error": "..."}`,
/// Anthropic wraps in `{"type": "error", "error": {"type", "message"}}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    OpenAi,
    Anthropic,
}

/// Top-level error type threaded through the request pipeline.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("model {0} not found")]
    ModelNotFound(String),

    #[error("malformed request: {0}")]
    BadRequest(String),

    #[error("missing client credential")]
    MissingCredential,

    #[error("invalid client key")]
    InvalidCredential,

    #[error("no client keys configured")]
    NoKeysConfigured,

    #[error("no usable account available")]
    NoAccountAvailable,

    #[error("account acquisition cancelled")]
    AcquireCancelled,

    #[error("account acquisition timed out")]
    AcquireTimeout,

    #[error("upstream quota exhausted")]
    QuotaExhausted,

    #[error("upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("upstream transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("tool schema validation failed: {0}")]
    ToolValidation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status code per's taxonomy.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ModelNotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::ToolValidation(_) => StatusCode::BAD_REQUEST,
            AppError::MissingCredential => StatusCode::UNAUTHORIZED,
            AppError::InvalidCredential => StatusCode::FORBIDDEN,
            AppError::NoKeysConfigured => StatusCode::SERVICE_UNAVAILABLE,
            AppError::NoAccountAvailable
            | AppError::AcquireCancelled
            | AppError::AcquireTimeout
            | AppError::QuotaExhausted => StatusCode::TOO_MANY_REQUESTS,
            AppError::Upstream { .. } | AppError::Transport(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render this error in the shape the given client protocol expects.
    pub fn into_protocol_response(self, protocol: Protocol) -> Response {
        let status = self.status();
        let message = self.to_string();
        let body = match protocol {
            Protocol::OpenAi => {
                if let AppError::ModelNotFound(model) = &self {
                    json!({ "error": format!("Model {} not found", model) })
                } else {
                    json!({ "error": message })
                }
            }
            Protocol::Anthropic => {
                let error_type = match &self {
                    AppError::ModelNotFound(_) => "model_not_found_error",
                    AppError::BadRequest(_) | AppError::ToolValidation(_) => "invalid_request_error",
                    AppError::MissingCredential | AppError::InvalidCredential => {
                        "authentication_error"
                    }
                    AppError::NoAccountAvailable
                    | AppError::AcquireCancelled
                    | AppError::AcquireTimeout
                    | AppError::QuotaExhausted => "rate_limit_error",
                    AppError::Upstream { .. } | AppError::Transport(_) => "api_error",
                    AppError::NoKeysConfigured => "api_error",
                    AppError::Internal(_) => "api_error",
                };
                json!({
                    "type": "error",
                    "error": { "type": error_type, "message": message }
                })
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Default axum rendering (used when no protocol context is available, e.g.
/// `/v1/models` or `/api/stats`); falls back to the OpenAI envelope shape.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.into_protocol_response(Protocol::OpenAi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_not_found_openai_shape() {
        let resp = AppError::ModelNotFound("not-exist".into())
            .into_protocol_response(Protocol::OpenAi);
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn model_not_found_anthropic_shape() {
        let err = AppError::ModelNotFound("not-exist".into());
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        let resp = err.into_protocol_response(Protocol::Anthropic);
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn no_account_available_is_429() {
        assert_eq!(AppError::NoAccountAvailable.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(AppError::QuotaExhausted.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
