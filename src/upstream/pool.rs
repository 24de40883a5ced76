//! Shared, pooled `reqwest::Client` instances keyed by base URL.
//!
//! One client per upstream host, reused across every account and every
//! request, so connection pooling and TLS session reuse actually help.

use std::time::Duration;

use dashmap::DashMap;
use once_cell::sync::Lazy;

static CLIENT_POOL: Lazy<DashMap<String, reqwest::Client>> = Lazy::new(DashMap::new);

fn create_pooled_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(100)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .expect("failed to build upstream HTTP client")
}

/// Returns the pooled client for `base_url`, creating one on first use.
pub fn get_or_create_client(base_url: &str) -> reqwest::Client {
    if let Some(client) = CLIENT_POOL.get(base_url) {
        return client.clone();
    }
    let client = create_pooled_client();
    CLIENT_POOL.insert(base_url.to_string(), client.clone());
    client
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_base_url_reuses_the_same_client() {
        let a = get_or_create_client("https://example.test");
        let b = get_or_create_client("https://example.test");
        // reqwest::Client is a cheap Arc handle; same base URL must not
        // rebuild the underlying connector.
        assert_eq!(format!("{:?}", a), format!("{:?}", b));
    }
}
