//! `GET /api/stats` — aggregate operational stats over fixed 24h/7d/30d
//! windows, plus per-account quota and JWT-expiry standing.

use axum::extract::State;
use axum::Json;
use chrono::{TimeZone, Utc};

use crate::metrics::{ExpiryInfo, StatsSnapshot, TokenInfo};
use crate::pipeline::AppState;

fn format_unix_seconds(secs: i64) -> Option<String> {
    match Utc.timestamp_opt(secs, 0) {
        chrono::LocalResult::Single(dt) => Some(dt.to_rfc3339()),
        _ => None,
    }
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    let stats24h = state.metrics.period_stats(24).await;
    let stats7d = state.metrics.period_stats(24 * 7).await;
    let stats30d = state.metrics.period_stats(24 * 30).await;
    let total_records = state.metrics.total_records().await;

    let mut tokens_info = Vec::with_capacity(state.accounts.len());
    let mut expiry_info = Vec::with_capacity(state.accounts.len());
    for account in state.accounts.all_accounts() {
        let quota = account.current_quota().await;
        let has_quota = account.has_quota().await;
        let expiry_date = account.expiry_time().await.and_then(format_unix_seconds);
        let license = account
            .license_id()
            .map(|l| l.to_string())
            .unwrap_or_else(|| "static".to_string());

        tokens_info.push(TokenInfo {
            name: account.id.clone(),
            license,
            used: quota.as_ref().map(|q| q.current).unwrap_or(0.0),
            total: quota.as_ref().map(|q| q.maximum).unwrap_or(0.0),
            usage_rate: quota.as_ref().map(|q| q.used_fraction() * 100.0).unwrap_or(0.0),
            expiry_date: expiry_date.clone(),
            status: if has_quota { "active".to_string() } else { "exhausted".to_string() },
        });

        expiry_info.push(ExpiryInfo {
            name: account.id.clone(),
            expiry_date,
            status: if account.is_static() {
                "static".to_string()
            } else if account.expiry_time().await.is_some() {
                "valid".to_string()
            } else {
                "unknown".to_string()
            },
        });
    }

    Json(StatsSnapshot {
        current_time: Utc::now().to_rfc3339(),
        current_qps: state.metrics.qps(),
        total_records,
        stats24h,
        stats7d,
        stats30d,
        tokens_info,
        expiry_info,
    })
}
