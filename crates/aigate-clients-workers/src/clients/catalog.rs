use aigate_contracts::ModelEntry;
use aigate_core::{CatalogSource, CoreError, catalog::catalog_entry};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{CloudflareAccount, build_http_client, read_envelope};

#[derive(Debug, Deserialize)]
struct SearchTask {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchModel {
    name: String,
    #[serde(default)]
    description: String,
    task: SearchTask,
}

/// Lists the account's models from `ai/models/search`.
pub struct WorkersModelCatalog {
    account: CloudflareAccount,
    http_client: Client,
    created: i64,
}

impl WorkersModelCatalog {
    pub fn new_with_http_client(account: CloudflareAccount, http_client: Client, created: i64) -> Self {
        Self { account, http_client, created }
    }

    pub fn new(account: CloudflareAccount, timeout_seconds: u64, created: i64) -> Result<Self, CoreError> {
        Ok(Self::new_with_http_client(account, build_http_client(timeout_seconds)?, created))
    }
}

fn to_entries(models: Vec<SearchModel>, created: i64) -> Vec<ModelEntry> {
    models
        .into_iter()
        .map(|model| {
            catalog_entry(
                &model.name,
                &model.description,
                &model.task.name,
                model.task.description.as_deref(),
                created,
            )
        })
        .collect()
}

#[async_trait]
impl CatalogSource for WorkersModelCatalog {
    async fn fetch(&self) -> Result<Vec<ModelEntry>, CoreError> {
        let url = self.account.url("ai/models/search");
        debug!(event = "catalog.fetch", url = %url);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.account.api_token)
            .send()
            .await
            .map_err(|err| CoreError::Backend(format!("catalog request failed: {err}")))?;
        let models: Vec<SearchModel> = read_envelope(response).await?;
        Ok(to_entries(models, self.created))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_envelope;

    #[test]
    fn search_results_become_tagged_entries() {
        let models: Vec<SearchModel> = parse_envelope(
            br#"{"success":true,"errors":[],"result":[
                {"name":"@cf/baai/bge-small-en-v1.5","description":"small","task":{"name":"Text Embeddings","description":"vectors"}},
                {"name":"@cf/openai/whisper","description":"speech","task":{"name":"Automatic Speech Recognition"}}
            ]}"#,
        )
        .expect("models");

        let entries = to_entries(models, 42);
        assert_eq!(entries[0].id, "@cf/baai/bge-small-en-v1.5#text-embeddings");
        assert!(entries[0].is_embedding_model());
        assert_eq!(entries[0].task_description.as_deref(), Some("vectors"));
        assert_eq!(entries[1].id, "@cf/openai/whisper#automatic-speech-recognition");
        assert!(!entries[1].in_use);
        assert_eq!(entries[1].created, 42);
    }
}
