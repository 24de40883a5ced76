//! Environment-driven configuration.
//!
//! The proxy reads a fixed set of environment variables at startup. There is
//! no config-file format: callers that want file-backed configuration can
//! load a `.env` file into the process environment themselves (e.g. via
//! `dotenvy`) before calling [`Config::from_env`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// One vendor credential as read from configuration.
///
/// Either `license_id` + `authorization` (refreshable) or a bare `jwt`
/// (static, never refreshed) must be present; [`Config::from_env`] enforces
/// this when assembling the list.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    pub license_id: Option<String>,
    pub authorization: Option<String>,
    pub jwt: Option<String>,
}

/// Typed, process-wide settings assembled from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Client API keys accepted by the auth middleware.
    pub client_api_keys: Vec<String>,
    /// Vendor accounts the pool is constructed from.
    pub accounts: Vec<AccountConfig>,
    /// Listen port, default 7860.
    pub port: u16,
    /// Whether `/` and `/api/stats` require a client key.
    pub stats_auth_enabled: bool,
    /// Optional Redis connection string; when absent, storage falls back to
    /// the file-backed adapter.
    pub redis_url: Option<String>,
    /// Optional path for a file log sink.
    pub debug_file: Option<PathBuf>,
    /// Mapping of client-facing model id to vendor profile id (`models.json`,.
    pub models: HashMap<String, String>,
    /// Overall HTTP client timeout for upstream dispatch, default 5 minutes.
    pub request_timeout: Duration,
}

/// Errors that can occur while assembling [`Config`] from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read models.json: {0}")]
    ModelsFile(#[from] std::io::Error),
    #[error("failed to parse models.json: {0}")]
    ModelsJson(#[from] serde_json::Error),
    #[error(
        "JETBRAINS_LICENSE_IDS and JETBRAINS_AUTHORIZATIONS must have the same number of entries"
    )]
    MismatchedAccountLists,
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    /// Build a [`Config`] from the process environment. Missing optional
    /// variables fall back to their documented defaults; `models.json`, if
    /// present in the working directory, supplies the client→vendor model
    /// map (accepting the legacy plain-list form as an identity map).
    pub fn from_env() -> Result<Self, ConfigError> {
        let client_api_keys = std::env::var("CLIENT_API_KEYS")
            .ok()
            .map(|v| split_csv(&v))
            .unwrap_or_default();

        let license_ids = std::env::var("JETBRAINS_LICENSE_IDS")
            .ok()
            .map(|v| split_csv(&v))
            .unwrap_or_default();
        let authorizations = std::env::var("JETBRAINS_AUTHORIZATIONS")
            .ok()
            .map(|v| split_csv(&v))
            .unwrap_or_default();
        if license_ids.len() != authorizations.len() {
            return Err(ConfigError::MismatchedAccountLists);
        }
        let static_jwts = std::env::var("JETBRAINS_JWTS")
            .ok()
            .map(|v| split_csv(&v))
            .unwrap_or_default();

        let mut accounts: Vec<AccountConfig> = license_ids
            .into_iter()
            .zip(authorizations)
            .map(|(license_id, authorization)| AccountConfig {
                license_id: Some(license_id),
                authorization: Some(authorization),
                jwt: None,
            })
            .collect();
        accounts.extend(static_jwts.into_iter().map(|jwt| AccountConfig {
            license_id: None,
            authorization: None,
            jwt: Some(jwt),
        }));

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(7860);

        let stats_auth_enabled = std::env::var("STATS_AUTH_ENABLED")
            .ok()
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let redis_url = std::env::var("REDIS_URL").ok().filter(|v| !v.is_empty());
        let debug_file = std::env::var("DEBUG_FILE").ok().map(PathBuf::from);

        let models = load_models_map()?;

        Ok(Config {
            client_api_keys,
            accounts,
            port,
            stats_auth_enabled,
            redis_url,
            debug_file,
            models,
            request_timeout: Duration::from_secs(300),
        })
    }
}

/// Parses `models.json` from the current working directory, accepting either
/// `{"models": {client_id: vendor_id, ...}}` or the legacy bare-list form
/// `["model-a", "model-b"]`, which is treated as an identity map.
fn load_models_map() -> Result<HashMap<String, String>, ConfigError> {
    let path = PathBuf::from("models.json");
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let raw = std::fs::read_to_string(&path)?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;

    if let Some(list) = value.as_array() {
        return Ok(list
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| (s.to_string(), s.to_string()))
            .collect());
    }

    let map = value
        .get("models")
        .and_then(|m| m.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_csv_trims_and_drops_empty() {
        assert_eq!(split_csv(" a, b ,,c"), vec!["a", "b", "c"]);
        assert_eq!(split_csv(""), Vec::<String>::new());
    }
}
