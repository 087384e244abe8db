use aigate_clients_workers::{CloudflareAccount, build_http_client, ensure_success};
use aigate_core::{CoreError, KvStore};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

const LIST_PAGE_LIMIT: u32 = 1000;

/// Workers KV namespace accessed through the Cloudflare REST API.
pub struct WorkersKvStore {
    account: CloudflareAccount,
    namespace_id: String,
    http_client: Client,
}

#[derive(Debug, Deserialize)]
struct KeyEntry {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KeyPage {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Vec<KeyEntry>,
    #[serde(default)]
    result_info: ResultInfo,
}

fn store_error(context: &str, err: impl std::fmt::Display) -> CoreError {
    CoreError::Store(format!("{context}: {err}"))
}

impl WorkersKvStore {
    pub fn new_with_http_client(
        account: CloudflareAccount,
        namespace_id: impl Into<String>,
        http_client: Client,
    ) -> Self {
        Self { account, namespace_id: namespace_id.into(), http_client }
    }

    pub fn new(
        account: CloudflareAccount,
        namespace_id: impl Into<String>,
        timeout_seconds: u64,
    ) -> Result<Self, CoreError> {
        Ok(Self::new_with_http_client(account, namespace_id, build_http_client(timeout_seconds)?))
    }

    fn namespace_url(&self, tail: &[&str]) -> Result<Url, CoreError> {
        let base = self.account.url(&format!("storage/kv/namespaces/{}", self.namespace_id));
        let mut url = Url::parse(&base).map_err(|err| store_error("invalid kv url", err))?;
        url.path_segments_mut()
            .map_err(|_| CoreError::Store("kv url cannot carry a path".to_string()))?
            .extend(tail);
        Ok(url)
    }

    /// Keys are pushed as a single encoded segment, so `:` and `/` survive.
    pub fn value_url(&self, key: &str) -> Result<Url, CoreError> {
        self.namespace_url(&["values", key])
    }

    fn keys_url(&self, prefix: &str, cursor: Option<&str>) -> Result<Url, CoreError> {
        let mut url = self.namespace_url(&["keys"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("prefix", prefix).append_pair("limit", &LIST_PAGE_LIMIT.to_string());
            if let Some(cursor) = cursor {
                query.append_pair("cursor", cursor);
            }
        }
        Ok(url)
    }
}

fn parse_key_page(bytes: &[u8]) -> Result<(Vec<String>, Option<String>), CoreError> {
    let page: KeyPage =
        serde_json::from_slice(bytes).map_err(|err| store_error("kv key list parse failed", err))?;
    if !page.success {
        return Err(CoreError::Store("kv key list reported failure".to_string()));
    }
    let cursor = page.result_info.cursor.filter(|cursor| !cursor.is_empty());
    Ok((page.result.into_iter().map(|entry| entry.name).collect(), cursor))
}

#[async_trait]
impl KvStore for WorkersKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        let response = self
            .http_client
            .get(self.value_url(key)?)
            .bearer_auth(&self.account.api_token)
            .send()
            .await
            .map_err(|err| store_error("kv get failed", err))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response).await.map_err(|err| store_error("kv get", err))?;
        let value = response.text().await.map_err(|err| store_error("kv get read failed", err))?;
        Ok(Some(value))
    }

    async fn put(&self, key: &str, value: String) -> Result<(), CoreError> {
        let response = self
            .http_client
            .put(self.value_url(key)?)
            .bearer_auth(&self.account.api_token)
            .header("Content-Type", "text/plain")
            .body(value)
            .send()
            .await
            .map_err(|err| store_error("kv put failed", err))?;
        ensure_success(response).await.map_err(|err| store_error("kv put", err))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, CoreError> {
        let mut keys = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let response = self
                .http_client
                .get(self.keys_url(prefix, cursor.as_deref())?)
                .bearer_auth(&self.account.api_token)
                .send()
                .await
                .map_err(|err| store_error("kv list failed", err))?;
            let response =
                ensure_success(response).await.map_err(|err| store_error("kv list", err))?;
            let bytes =
                response.bytes().await.map_err(|err| store_error("kv list read failed", err))?;
            let (page, next) = parse_key_page(&bytes)?;
            debug!(event = "kv.list.page", prefix, keys = page.len());
            keys.extend(page);
            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<(), CoreError> {
        let response = self
            .http_client
            .delete(self.value_url(key)?)
            .bearer_auth(&self.account.api_token)
            .send()
            .await
            .map_err(|err| store_error("kv delete failed", err))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(response).await.map_err(|err| store_error("kv delete", err))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> WorkersKvStore {
        WorkersKvStore::new_with_http_client(
            CloudflareAccount::new("https://api.example.test/client/v4", "acct", "token"),
            "ns1",
            Client::new(),
        )
    }

    #[test]
    fn value_url_encodes_the_key_as_one_segment() {
        let url = store().value_url("thread:thread_1:messages").expect("url");
        assert_eq!(
            url.as_str(),
            "https://api.example.test/client/v4/accounts/acct/storage/kv/namespaces/ns1/values/thread:thread_1:messages"
        );
        let url = store().value_url("a/b c").expect("url");
        assert!(url.as_str().ends_with("/values/a%2Fb%20c"));
    }

    #[test]
    fn keys_url_carries_prefix_and_cursor() {
        let url = store().keys_url("thread:", Some("abc")).expect("url");
        let query: Vec<(String, String)> =
            url.query_pairs().map(|(key, value)| (key.into_owned(), value.into_owned())).collect();
        assert!(query.contains(&("prefix".to_string(), "thread:".to_string())));
        assert!(query.contains(&("cursor".to_string(), "abc".to_string())));
    }

    #[test]
    fn key_pages_expose_the_next_cursor() {
        let (keys, cursor) = parse_key_page(
            br#"{"success":true,"errors":[],"result":[{"name":"run:1"},{"name":"run:2"}],"result_info":{"count":2,"cursor":"next"}}"#,
        )
        .expect("page");
        assert_eq!(keys, vec!["run:1", "run:2"]);
        assert_eq!(cursor.as_deref(), Some("next"));

        let (_, cursor) =
            parse_key_page(br#"{"success":true,"result":[],"result_info":{"cursor":""}}"#)
                .expect("last page");
        assert_eq!(cursor, None);
    }
}
