use std::env;

use aigate_clients_workers::{CloudflareAccount, DEFAULT_API_BASE_URL};

pub const DEFAULT_AI_MODEL: &str = "@cf/meta/llama-3-8b-instruct";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Shared bearer secret. Empty means every protected route answers 401.
    pub api_key: String,
    pub default_model: String,
    pub cf_account_id: Option<String>,
    pub cf_api_key: Option<String>,
    pub cf_api_base_url: String,
    pub kv_namespace_id: Option<String>,
    pub backend_timeout_seconds: u64,
    pub backend_max_inflight: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid AIGATE_PORT value: {0}")]
    InvalidPort(String),
    #[error("invalid AIGATE_BACKEND_TIMEOUT value: {0}")]
    InvalidBackendTimeout(String),
    #[error("invalid AIGATE_BACKEND_MAX_INFLIGHT value: {0}")]
    InvalidBackendMaxInflight(String),
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = non_empty(lookup("AIGATE_HOST")).unwrap_or_else(|| "127.0.0.1".to_string());

        let port_raw = lookup("AIGATE_PORT").unwrap_or_else(|| "8787".to_string());
        let port =
            port_raw.trim().parse::<u16>().map_err(|_| ConfigError::InvalidPort(port_raw.clone()))?;

        let timeout_raw = lookup("AIGATE_BACKEND_TIMEOUT").unwrap_or_else(|| "60".to_string());
        let backend_timeout_seconds = parse_positive_usize(&timeout_raw)
            .map(|seconds| seconds as u64)
            .ok_or(ConfigError::InvalidBackendTimeout(timeout_raw))?;

        let max_inflight_raw =
            lookup("AIGATE_BACKEND_MAX_INFLIGHT").unwrap_or_else(|| "64".to_string());
        let backend_max_inflight = parse_positive_usize(&max_inflight_raw)
            .ok_or(ConfigError::InvalidBackendMaxInflight(max_inflight_raw))?;

        Ok(Self {
            host,
            port,
            api_key: lookup("API_KEY").map(|key| key.trim().to_string()).unwrap_or_default(),
            default_model: non_empty(lookup("DEFAULT_AI_MODEL"))
                .unwrap_or_else(|| DEFAULT_AI_MODEL.to_string()),
            cf_account_id: non_empty(lookup("CF_ACCOUNT_ID")),
            cf_api_key: non_empty(lookup("CF_API_KEY")),
            cf_api_base_url: non_empty(lookup("CF_API_BASE_URL"))
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            kv_namespace_id: non_empty(lookup("CF_KV_NAMESPACE_ID")),
            backend_timeout_seconds,
            backend_max_inflight,
        })
    }

    /// Mock backend, built-in catalog, in-memory store.
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            api_key: "test-key".to_string(),
            default_model: DEFAULT_AI_MODEL.to_string(),
            cf_account_id: None,
            cf_api_key: None,
            cf_api_base_url: DEFAULT_API_BASE_URL.to_string(),
            kv_namespace_id: None,
            backend_timeout_seconds: 60,
            backend_max_inflight: 64,
        }
    }

    /// Present only when both the account id and the API token are set.
    pub fn cloudflare_account(&self) -> Option<CloudflareAccount> {
        let account_id = self.cf_account_id.as_deref()?;
        let api_key = self.cf_api_key.as_deref()?;
        Some(CloudflareAccount::new(&self.cf_api_base_url, account_id, api_key))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn parse_positive_usize(value: &str) -> Option<usize> {
    let parsed = value.trim().parse::<usize>().ok()?;
    if parsed == 0 { None } else { Some(parsed) }
}
