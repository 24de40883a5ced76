//! Request-level records and the aggregate snapshot shape served by
//! `/api/stats`.

use serde::Serialize;

/// One completed request, pushed into the bounded history ring.
#[derive(Debug, Clone, Serialize)]
pub struct RequestRecord {
    pub timestamp_nanos: i64,
    pub protocol: &'static str,
    pub model: String,
    pub account_id: String,
    pub status: u16,
    pub duration_ms: u64,
    pub prompt_cache_hit: bool,
}

/// Request volume and latency over one fixed-size trailing window.
#[derive(Debug, Clone, Serialize)]
pub struct PeriodStats {
    pub requests: u64,
    #[serde(rename = "successRate")]
    pub success_rate: f64,
    #[serde(rename = "avgResponseTime")]
    pub avg_response_time: f64,
    pub qps: f64,
}

/// One account's quota standing, as surfaced to operators.
#[derive(Debug, Clone, Serialize)]
pub struct TokenInfo {
    pub name: String,
    pub license: String,
    pub used: f64,
    pub total: f64,
    #[serde(rename = "usageRate")]
    pub usage_rate: f64,
    #[serde(rename = "expiryDate")]
    pub expiry_date: Option<String>,
    pub status: String,
}

/// One account's JWT expiry standing.
#[derive(Debug, Clone, Serialize)]
pub struct ExpiryInfo {
    pub name: String,
    #[serde(rename = "expiryDate")]
    pub expiry_date: Option<String>,
    pub status: String,
}

/// Aggregate snapshot served by `/api/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    #[serde(rename = "currentTime")]
    pub current_time: String,
    #[serde(rename = "currentQPS")]
    pub current_qps: f64,
    #[serde(rename = "totalRecords")]
    pub total_records: u64,
    pub stats24h: PeriodStats,
    pub stats7d: PeriodStats,
    pub stats30d: PeriodStats,
    #[serde(rename = "tokensInfo")]
    pub tokens_info: Vec<TokenInfo>,
    #[serde(rename = "expiryInfo")]
    pub expiry_info: Vec<ExpiryInfo>,
}
