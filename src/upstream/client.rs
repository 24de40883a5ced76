//! Vendor HTTP client: JWT refresh, quota lookup, and streaming chat
//! dispatch.

use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::accounts::quota::Quota;
use crate::error::AppError;

use super::jwt::parse_expiry;
use super::pool::get_or_create_client;
use super::sse::parse_sse_line;
use crate::convert::vendor::{UpstreamChatPayload, UpstreamEvent};

const DEFAULT_BASE_URL: &str = "https://api.jetbrains.ai";

/// The vendor's quota-exhausted signal on a chat dispatch, distinct from a
/// generic non-2xx upstream error.
const QUOTA_EXHAUSTED_STATUS: u16 = 477;

/// Fixed identifier the vendor expects on every chat dispatch.
const GRAZIE_AGENT: &str = "jetgate-proxy/1.0";

/// Result of a successful JWT refresh: the raw token plus the decoded
/// expiry (Unix seconds, from the token's own `exp` claim).
#[derive(Debug, Clone)]
pub struct RefreshedJwt {
    pub token: String,
    pub state: String,
    pub expiry_time: i64,
}

/// Error specific to the refresh call, distinguished from transport/HTTP
/// failures so the pool can decide whether to retry or drop the account.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("upstream refresh error ({status}): {body}")]
    Upstream { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("account state {0} is not usable")]
    UnexpectedState(String),
    #[error("malformed refresh token: {0}")]
    MalformedToken(String),
}

#[derive(Debug, Serialize)]
struct RefreshRequestBody<'a> {
    #[serde(rename = "licenseId")]
    license_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponseBody {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuotaAmount {
    amount: String,
}

#[derive(Debug, Deserialize)]
struct QuotaPair {
    current: QuotaAmount,
    maximum: QuotaAmount,
}

#[derive(Debug, Deserialize)]
struct QuotaResponseBody {
    current: QuotaPair,
}

/// Thin wrapper around a pooled [`reqwest::Client`] pointed at the vendor's
/// base URL.
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
}

impl UpstreamClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        Self {
            http: get_or_create_client(&base_url),
            base_url,
        }
    }

    /// Exchanges a license id + authorization header for a fresh JWT.
    pub async fn refresh_jwt(
        &self,
        license_id: &str,
        authorization: &str,
    ) -> Result<RefreshedJwt, RefreshError> {
        let resp = self
            .http
            .post(format!(
                "{}/auth/jetbrains-jwt/provide-access/license/v2",
                self.base_url
            ))
            .header("authorization", authorization)
            .json(&RefreshRequestBody { license_id })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RefreshError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        let body: RefreshResponseBody = resp.json().await?;
        let state = body.state.unwrap_or_else(|| "UNKNOWN".to_string());
        match (&body.token, state.as_str()) {
            (Some(token), "PAID") => {
                let expiry_time = parse_expiry(token)
                    .map_err(|e| RefreshError::MalformedToken(e.to_string()))?;
                Ok(RefreshedJwt {
                    token: token.clone(),
                    state,
                    expiry_time,
                })
            }
            _ => Err(RefreshError::UnexpectedState(state)),
        }
    }

    /// Fetches the current quota snapshot for an already-refreshed JWT.
    pub async fn fetch_quota(&self, jwt: &str) -> Result<Quota, AppError> {
        let resp = self
            .http
            .post(format!("{}/user/v5/quota/get", self.base_url))
            .header("grazie-authenticate-jwt", jwt)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        let body: QuotaResponseBody = resp.json().await.map_err(AppError::Transport)?;
        let current: f64 = body.current.current.amount.parse().unwrap_or(0.0);
        let maximum: f64 = body.current.maximum.amount.parse().unwrap_or(0.0);
        let maximum = if maximum == 0.0 { 1.0 } else { maximum };
        Ok(Quota { current, maximum })
    }

    /// Dispatches a chat completion request and returns the upstream SSE
    /// stream translated into [`UpstreamEvent`]s as they arrive. A 477
    /// response is the vendor's quota-exhausted signal and surfaces as
    /// [`AppError::QuotaExhausted`] rather than a generic upstream error.
    pub async fn stream_chat(
        &self,
        jwt: &str,
        payload: &UpstreamChatPayload,
    ) -> Result<impl Stream<Item = Result<UpstreamEvent, AppError>>, AppError> {
        let resp = self
            .http
            .post(format!("{}/user/v5/llm/chat/stream/v8", self.base_url))
            .header("Accept", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .header("grazie-authenticate-jwt", jwt)
            .header("grazie-agent", GRAZIE_AGENT)
            .json(payload)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == QUOTA_EXHAUSTED_STATUS {
            return Err(AppError::QuotaExhausted);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let mut byte_stream = resp.bytes_stream();
        let stream = async_stream::stream! {
            let mut buf = String::new();
            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(AppError::Transport(e));
                        return;
                    }
                };
                buf.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(pos) = buf.find('\n') {
                    let line = buf[..pos].trim_end_matches('\r').to_string();
                    buf.drain(..=pos);
                    if let Some(event) = parse_sse_line(&line) {
                        yield event.map_err(|e| AppError::Internal(e.to_string()));
                    }
                }
            }
        };
        Ok(stream)
    }
}

impl Default for UpstreamClient {
    fn default() -> Self {
        Self::new()
    }
}
