//! Account pool: lease/release over a bounded channel of vendor accounts
//!.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use crate::cache::keys::quota_cache_key;
use crate::cache::CacheService;
use crate::error::AppError;
use crate::upstream::UpstreamClient;

use super::account::Account;

const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(60);

/// How many distinct accounts `acquire` will try before giving up when
/// refresh or quota checks keep failing.
const MAX_ACQUIRE_ATTEMPTS: usize = 3;

/// A leased account. Returned to the pool automatically when dropped, so
/// callers never have to remember to release it on an error path.
pub struct AccountLease {
    account: Option<Arc<Account>>,
    tx: mpsc::Sender<Arc<Account>>,
}

impl AccountLease {
    pub fn account(&self) -> &Arc<Account> {
        self.account.as_ref().expect("account taken before drop")
    }
}

impl Drop for AccountLease {
    fn drop(&mut self) {
        if let Some(account) = self.account.take() {
            // mpsc::Sender::send is async only because it can wait for
            // capacity; the channel is sized to the account count so this
            // never actually blocks. try_send covers the non-blocking case;
            // a failure here just means the channel was closed at shutdown.
            let _ = self.tx.try_send(account);
        }
    }
}

/// Round-robins leases over a fixed set of vendor accounts, refreshing a
/// credential's JWT on lease if it's stale and verifying it still has quota
/// before handing it out.
pub struct AccountPool {
    accounts: Vec<Arc<Account>>,
    tx: mpsc::Sender<Arc<Account>>,
    rx: Mutex<mpsc::Receiver<Arc<Account>>>,
}

impl AccountPool {
    pub fn new(accounts: Vec<Arc<Account>>) -> Self {
        let (tx, rx) = mpsc::channel(accounts.len().max(1));
        for account in &accounts {
            let _ = tx.try_send(account.clone());
        }
        Self {
            accounts,
            tx,
            rx: Mutex::new(rx),
        }
    }

    pub fn all_accounts(&self) -> &[Arc<Account>] {
        &self.accounts
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Acquires the next available account, refreshing its JWT and checking
    /// its quota first. Waits up to `timeout` (default 60s) for a free
    /// account before returning [`AppError::AcquireTimeout`]; if a leased
    /// account turns out to be unusable (refresh fails, quota exhausted) it
    /// is returned to the pool and up to [`MAX_ACQUIRE_ATTEMPTS`] other
    /// accounts are tried before giving up.
    pub async fn acquire(
        &self,
        upstream: &UpstreamClient,
        cache: &CacheService,
        timeout: Option<Duration>,
    ) -> Result<AccountLease, AppError> {
        if self.accounts.is_empty() {
            return Err(AppError::NoAccountAvailable);
        }
        let timeout = timeout.unwrap_or(DEFAULT_ACQUIRE_TIMEOUT);

        let mut last_err = AppError::NoAccountAvailable;
        for _ in 0..MAX_ACQUIRE_ATTEMPTS {
            let account = {
                let mut rx = self.rx.lock().await;
                match tokio::time::timeout(timeout, rx.recv()).await {
                    Ok(Some(account)) => account,
                    Ok(None) => return Err(AppError::NoAccountAvailable),
                    Err(_) => return Err(AppError::AcquireTimeout),
                }
            };

            match self.prepare(&account, upstream, cache).await {
                Ok(()) => {
                    return Ok(AccountLease {
                        account: Some(account),
                        tx: self.tx.clone(),
                    })
                }
                Err(err) => {
                    // Return it to the pool so a transient failure doesn't
                    // permanently strand the credential.
                    let _ = self.tx.try_send(account);
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }

    /// Refreshes the JWT if stale, then checks quota, retrying the quota
    /// check once with a forced refresh if the vendor rejects the cached
    /// token.
    async fn prepare(
        &self,
        account: &Arc<Account>,
        upstream: &UpstreamClient,
        cache: &CacheService,
    ) -> Result<(), AppError> {
        if account.needs_jwt_refresh().await {
            account
                .refresh(upstream)
                .await
                .map_err(|err| AppError::Internal(err.to_string()))?;
        }
        self.ensure_quota(account, upstream, cache).await
    }

    /// Ensures the account's quota has been checked recently enough to
    /// trust, consulting the shared cache before hitting the vendor. Retries
    /// once with a fresh JWT if the vendor rejects the cached token.
    async fn ensure_quota(
        &self,
        account: &Arc<Account>,
        upstream: &UpstreamClient,
        cache: &CacheService,
    ) -> Result<(), AppError> {
        if account.quota_check_is_fresh().await {
            return if account.has_quota().await {
                Ok(())
            } else {
                Err(AppError::QuotaExhausted)
            };
        }

        let jwt = account
            .current_jwt()
            .await
            .ok_or_else(|| AppError::Internal("account has no jwt after refresh".to_string()))?;
        let key = quota_cache_key(account.license_id(), &jwt);

        if let Some(quota) = cache.get_quota(&key).await {
            account.record_quota(quota.clone()).await;
            return if quota.has_quota() {
                Ok(())
            } else {
                Err(AppError::QuotaExhausted)
            };
        }

        let quota = match upstream.fetch_quota(&jwt).await {
            Ok(quota) => quota,
            Err(AppError::Upstream { status: 401, .. }) => {
                cache.invalidate_quota(&key).await;
                account
                    .refresh(upstream)
                    .await
                    .map_err(|err| AppError::Internal(err.to_string()))?;
                let jwt = account.current_jwt().await.ok_or_else(|| {
                    AppError::Internal("account has no jwt after refresh".to_string())
                })?;
                upstream.fetch_quota(&jwt).await?
            }
            Err(err) => return Err(err),
        };

        cache.set_quota(key, quota.clone()).await;
        account.record_quota(quota.clone()).await;
        if quota.has_quota() {
            Ok(())
        } else {
            Err(AppError::QuotaExhausted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccountConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn static_account(id: &str, jwt: &str) -> Arc<Account> {
        Account::new(
            id.to_string(),
            AccountConfig {
                license_id: None,
                authorization: None,
                jwt: Some(jwt.to_string()),
            },
        )
    }

    /// A mock vendor reporting plenty of quota left, so `ensure_quota`'s
    /// network round trip resolves without exercising real upstream.
    async fn upstream_with_quota(current: &str, maximum: &str) -> (MockServer, UpstreamClient) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/user/v5/quota/get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "current": {
                    "current": { "amount": current },
                    "maximum": { "amount": maximum }
                }
            })))
            .mount(&server)
            .await;
        let client = UpstreamClient::with_base_url(server.uri());
        (server, client)
    }

    #[tokio::test]
    async fn empty_pool_reports_no_account_available() {
        let pool = AccountPool::new(Vec::new());
        let upstream = UpstreamClient::new();
        let cache = CacheService::new();
        let err = pool
            .acquire(&upstream, &cache, Some(Duration::from_millis(10)))
            .await;
        assert!(matches!(err, Err(AppError::NoAccountAvailable)));
    }

    #[tokio::test]
    async fn lease_is_returned_to_the_pool_on_drop() {
        let pool = AccountPool::new(vec![static_account("a", "jwt-a")]);
        let (_server, upstream) = upstream_with_quota("10", "100").await;
        let cache = CacheService::new();
        {
            let lease = pool.acquire(&upstream, &cache, None).await.unwrap();
            assert_eq!(lease.account().id, "a");
        }
        let lease_again = pool
            .acquire(&upstream, &cache, Some(Duration::from_secs(1)))
            .await;
        assert!(lease_again.is_ok());
    }

    #[tokio::test]
    async fn second_acquire_times_out_while_the_only_account_is_leased() {
        let pool = AccountPool::new(vec![static_account("a", "jwt-a")]);
        let (_server, upstream) = upstream_with_quota("10", "100").await;
        let cache = CacheService::new();
        let _lease = pool.acquire(&upstream, &cache, None).await.unwrap();
        let err = pool
            .acquire(&upstream, &cache, Some(Duration::from_millis(20)))
            .await;
        assert!(matches!(err, Err(AppError::AcquireTimeout)));
    }

    #[tokio::test]
    async fn exhausted_quota_is_reported_and_account_returned_to_pool() {
        let pool = AccountPool::new(vec![static_account("a", "jwt-a")]);
        let (_server, upstream) = upstream_with_quota("100", "100").await;
        let cache = CacheService::new();
        let err = pool
            .acquire(&upstream, &cache, Some(Duration::from_millis(50)))
            .await;
        assert!(matches!(err, Err(AppError::QuotaExhausted)));
    }
}
