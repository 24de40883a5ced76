//! A single vendor credential and its refreshable state.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;

use crate::config::AccountConfig;
use crate::upstream::{RefreshError, UpstreamClient};

use super::quota::Quota;

/// How long before a JWT's own expiry we proactively refresh it. The vendor
/// doesn't document an exact lead time, so 5 minutes is an assumption
/// generous enough to survive a slow request in flight.
const JWT_REFRESH_LEAD_SECONDS: i64 = 5 * 60;

/// How long a quota check stays usable before we require a fresh one.
const QUOTA_FRESHNESS_SECONDS: i64 = 60 * 60;

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[derive(Debug, Clone)]
struct AccountState {
    jwt: Option<String>,
    vendor_state: Option<String>,
    expiry_time: Option<i64>,
    quota: Option<Quota>,
    has_quota: bool,
    last_quota_check: Option<i64>,
}

/// One vendor account: either refreshable (license id + authorization) or
/// static (a pre-provided JWT that is never refreshed). Interior state is
/// guarded by a per-account mutex so concurrent callers reading status don't
/// contend with the whole pool.
pub struct Account {
    pub id: String,
    config: AccountConfig,
    state: Mutex<AccountState>,
}

impl Account {
    pub fn new(id: String, config: AccountConfig) -> Arc<Self> {
        let jwt = config.jwt.clone();
        Arc::new(Self {
            id,
            config,
            state: Mutex::new(AccountState {
                jwt,
                vendor_state: None,
                expiry_time: None,
                quota: None,
                has_quota: true,
                last_quota_check: None,
            }),
        })
    }

    /// True when this account was configured with a static JWT rather than
    /// a license id/authorization pair.
    pub fn is_static(&self) -> bool {
        self.config.jwt.is_some()
    }

    pub fn license_id(&self) -> Option<&str> {
        self.config.license_id.as_deref()
    }

    pub async fn current_jwt(&self) -> Option<String> {
        self.state.lock().await.jwt.clone()
    }

    pub async fn expiry_time(&self) -> Option<i64> {
        self.state.lock().await.expiry_time
    }

    /// True when the account has no JWT yet, or the JWT is within its
    /// refresh lead time of expiring. Static accounts never need refresh.
    pub async fn needs_jwt_refresh(&self) -> bool {
        if self.is_static() {
            return false;
        }
        let guard = self.state.lock().await;
        match (&guard.jwt, guard.expiry_time) {
            (None, _) => true,
            (Some(_), None) => true,
            (Some(_), Some(expiry)) => now_unix() >= expiry - JWT_REFRESH_LEAD_SECONDS,
        }
    }

    pub async fn current_quota(&self) -> Option<Quota> {
        self.state.lock().await.quota.clone()
    }

    /// Whether the last recorded quota check still allows this account to be
    /// handed out without a fresh check upstream.
    pub async fn has_quota(&self) -> bool {
        self.state.lock().await.has_quota
    }

    /// Whether the last quota check happened recently enough to trust
    /// without re-checking upstream.
    pub async fn quota_check_is_fresh(&self) -> bool {
        match self.state.lock().await.last_quota_check {
            Some(checked_at) => now_unix() - checked_at < QUOTA_FRESHNESS_SECONDS,
            None => false,
        }
    }

    /// Records a freshly-fetched quota snapshot.
    pub async fn record_quota(&self, quota: Quota) {
        let mut guard = self.state.lock().await;
        guard.has_quota = quota.has_quota();
        guard.quota = Some(quota);
        guard.last_quota_check = Some(now_unix());
    }

    /// Marks the account exhausted immediately, e.g. after the vendor
    /// rejects a chat dispatch with its quota-exhausted status. Forces the
    /// next acquisition attempt to re-check rather than trust the cache.
    pub async fn mark_quota_exhausted(&self) {
        let mut guard = self.state.lock().await;
        guard.has_quota = false;
        guard.last_quota_check = Some(now_unix());
    }

    /// Refreshes the JWT via the vendor's license endpoint. A no-op (and an
    /// `Ok`) for static accounts, since there is nothing to refresh.
    pub async fn refresh(&self, client: &UpstreamClient) -> Result<(), RefreshError> {
        let (license_id, authorization) = match (&self.config.license_id, &self.config.authorization) {
            (Some(l), Some(a)) => (l.clone(), a.clone()),
            _ => return Ok(()),
        };
        let refreshed = client.refresh_jwt(&license_id, &authorization).await?;
        let mut guard = self.state.lock().await;
        guard.jwt = Some(refreshed.token);
        guard.vendor_state = Some(refreshed.state);
        guard.expiry_time = Some(refreshed.expiry_time);
        Ok(())
    }
}
