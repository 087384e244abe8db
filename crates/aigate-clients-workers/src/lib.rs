//! Cloudflare REST clients: Workers AI inference and the model catalog.

use std::time::Duration;

use aigate_core::CoreError;
use reqwest::{Client, Response};
use serde::{Deserialize, de::DeserializeOwned};

mod clients;

pub use clients::{MockBackend, WorkersAiClient, WorkersModelCatalog};

pub const DEFAULT_API_BASE_URL: &str = "https://api.cloudflare.com/client/v4";
const ERROR_BODY_LIMIT: usize = 512;

/// Account-scoped Cloudflare API credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudflareAccount {
    pub base_url: String,
    pub account_id: String,
    pub api_token: String,
}

impl CloudflareAccount {
    pub fn new(
        base_url: impl Into<String>,
        account_id: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        Self { base_url: base_url.into(), account_id: account_id.into(), api_token: api_token.into() }
    }

    /// `{base}/accounts/{id}/{path}`.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/accounts/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.account_id,
            path.trim_start_matches('/')
        )
    }
}

pub fn build_http_client(timeout_seconds: u64) -> Result<Client, CoreError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .map_err(|err| CoreError::Backend(format!("http client init failed: {err}")))
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: String,
}

/// The `{result, success, errors}` wrapper around every Cloudflare API response.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Envelope<T> {
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
}

fn describe_errors(errors: &[ApiMessage]) -> String {
    errors
        .iter()
        .map(|error| match error.code {
            Some(code) => format!("{code}: {}", error.message),
            None => error.message.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn unwrap_envelope<T>(envelope: Envelope<T>) -> Result<T, CoreError> {
    if !envelope.success {
        return Err(CoreError::Backend(format!(
            "cloudflare api reported failure: {}",
            describe_errors(&envelope.errors)
        )));
    }
    envelope
        .result
        .ok_or_else(|| CoreError::Backend("cloudflare api returned no result".to_string()))
}

/// Fails on non-2xx statuses, keeping a prefix of the body for context.
pub async fn ensure_success(response: Response) -> Result<Response, CoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > ERROR_BODY_LIMIT {
        let mut cut = ERROR_BODY_LIMIT;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    Err(CoreError::Backend(format!("cloudflare api returned {status}: {body}")))
}

pub(crate) async fn read_envelope<T: DeserializeOwned>(response: Response) -> Result<T, CoreError> {
    let response = ensure_success(response).await?;
    let bytes = response
        .bytes()
        .await
        .map_err(|err| CoreError::Backend(format!("cloudflare response read failed: {err}")))?;
    parse_envelope(&bytes)
}

pub(crate) fn parse_envelope<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CoreError> {
    let envelope: Envelope<T> = serde_json::from_slice(bytes)
        .map_err(|err| CoreError::Backend(format!("cloudflare response parse failed: {err}")))?;
    unwrap_envelope(envelope)
}
