use std::sync::Arc;

use aigate_contracts::{BackendCall, BackendChatResponse, BackendEmbeddingResponse, BackendOptions};
use aigate_core::{BackendResponse, CoreError, InferenceBackend};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::{CloudflareAccount, build_http_client, ensure_success, read_envelope};

/// Runs models through the Workers AI REST endpoint.
pub struct WorkersAiClient {
    account: CloudflareAccount,
    http_client: Client,
    max_inflight: Option<Arc<Semaphore>>,
}

impl WorkersAiClient {
    pub fn new_with_http_client(
        account: CloudflareAccount,
        http_client: Client,
        max_inflight: Option<usize>,
    ) -> Self {
        let max_inflight = max_inflight.map(Semaphore::new).map(Arc::new);
        Self { account, http_client, max_inflight }
    }

    pub fn new(
        account: CloudflareAccount,
        timeout_seconds: u64,
        max_inflight: Option<usize>,
    ) -> Result<Self, CoreError> {
        let http_client = build_http_client(timeout_seconds)?;
        Ok(Self::new_with_http_client(account, http_client, max_inflight))
    }

    pub fn run_url(&self, model: &str) -> String {
        self.account.url(&format!("ai/run/{model}"))
    }
}

#[async_trait]
impl InferenceBackend for WorkersAiClient {
    async fn run(&self, call: BackendCall) -> Result<BackendResponse, CoreError> {
        let permit = self
            .max_inflight
            .as_ref()
            .map(|semaphore| {
                semaphore.clone().try_acquire_owned().map_err(|_| {
                    CoreError::Backend(
                        "backend overloaded: max in-flight limit reached".to_string(),
                    )
                })
            })
            .transpose()?;

        let url = self.run_url(&call.model);
        debug!(event = "workers_ai.request", model = %call.model, stream = call.options.is_stream());
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.account.api_token)
            .json(&call.options)
            .send()
            .await
            .map_err(|err| CoreError::Backend(format!("backend request failed: {err}")))?;

        match &call.options {
            BackendOptions::Chat(options) if options.stream.unwrap_or(false) => {
                let response = ensure_success(response).await?;
                // The permit lives as long as the body stream.
                let upstream = response.bytes_stream().map(move |chunk| {
                    let _permit = &permit;
                    chunk.map_err(|err| CoreError::Backend(format!("backend stream failed: {err}")))
                });
                Ok(BackendResponse::Stream(Box::pin(upstream)))
            }
            BackendOptions::Chat(_) => {
                read_envelope::<BackendChatResponse>(response).await.map(BackendResponse::Chat)
            }
            BackendOptions::Embedding(_) => read_envelope::<BackendEmbeddingResponse>(response)
                .await
                .map(BackendResponse::Embedding),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> WorkersAiClient {
        WorkersAiClient::new_with_http_client(
            CloudflareAccount::new("https://api.example.test/client/v4", "acct", "token"),
            Client::new(),
            Some(1),
        )
    }

    #[test]
    fn run_url_keeps_model_path_segments() {
        assert_eq!(
            client().run_url("@cf/meta/llama-3-8b-instruct"),
            "https://api.example.test/client/v4/accounts/acct/ai/run/@cf/meta/llama-3-8b-instruct"
        );
    }

    #[tokio::test]
    async fn exhausted_permits_fail_fast() {
        let client = client();
        let semaphore = client.max_inflight.clone().expect("semaphore");
        let _held = semaphore.try_acquire_owned().expect("permit");

        let error = client
            .run(BackendCall {
                model: "@cf/meta/llama-3-8b-instruct".to_string(),
                options: BackendOptions::Chat(Default::default()),
            })
            .await
            .expect_err("overloaded");
        assert!(error.message().contains("max in-flight"));
    }
}
