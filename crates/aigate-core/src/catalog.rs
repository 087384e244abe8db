use std::sync::Arc;

use aigate_contracts::{ModelEntry, TASK_TEXT_EMBEDDINGS, TASK_TEXT_GENERATION};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::{CatalogSource, CoreError};

/// Tasks the gateway can serve.
pub const IN_USE_TASKS: [&str; 5] = [
    TASK_TEXT_GENERATION,
    TASK_TEXT_EMBEDDINGS,
    "Translation",
    "Text Classification",
    "Summarization",
];

const BUILTIN_CREATED: i64 = 1_710_979_200;
const OWNER: &str = "cloudflare";

/// Builds a catalog entry keyed `name#task-name`.
pub fn catalog_entry(
    name: &str,
    description: &str,
    task_name: &str,
    task_description: Option<&str>,
    created: i64,
) -> ModelEntry {
    let task_slug = task_name.to_lowercase().replace(' ', "-");
    ModelEntry {
        id: format!("{name}#{task_slug}"),
        object: "model".to_string(),
        created,
        owned_by: OWNER.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        task_name: Some(task_name.to_string()),
        task_description: task_description.map(str::to_string),
        in_use: IN_USE_TASKS.contains(&task_name),
    }
}

fn builtin_entry(name: &str, description: &str, task_name: &str) -> ModelEntry {
    ModelEntry {
        id: name.to_string(),
        ..catalog_entry(name, description, task_name, None, BUILTIN_CREATED)
    }
}

/// Static catalog served when no source is configured or the source fails.
pub fn builtin_models() -> Vec<ModelEntry> {
    [
        ("@cf/meta/llama-3-8b-instruct", "Meta Llama 3 8B instruction-tuned"),
        ("@cf/meta/llama-3.2-1b-instruct", "Meta Llama 3.2 1B instruction-tuned"),
        ("@cf/meta/llama-3.2-3b-instruct", "Meta Llama 3.2 3B instruction-tuned"),
        ("@cf/meta/llama-3.3-70b-instruct-fp8-fast", "Meta Llama 3.3 70B, fp8 quantized"),
        ("@cf/mistral/mistral-7b-instruct-v0.1", "Mistral 7B instruct v0.1"),
        ("@hf/mistral/mistral-7b-instruct-v0.2", "Mistral 7B instruct v0.2"),
    ]
    .into_iter()
    .map(|(name, description)| builtin_entry(name, description, TASK_TEXT_GENERATION))
    .chain(std::iter::once(builtin_entry(
        "@cf/baai/bge-base-en-v1.5",
        "BAAI general embedding, base English, 768 dimensions",
        TASK_TEXT_EMBEDDINGS,
    )))
    .collect()
}

/// Process-wide model list, populated once.
///
/// A failed fetch is not cached: that call gets the built-in list and the
/// next call tries the source again.
pub struct ModelCatalog {
    source: Option<Arc<dyn CatalogSource>>,
    cached: OnceCell<Arc<Vec<ModelEntry>>>,
}

impl ModelCatalog {
    pub fn new(source: Option<Arc<dyn CatalogSource>>) -> Self {
        Self { source, cached: OnceCell::new() }
    }

    pub fn builtin() -> Self {
        Self::new(None)
    }

    pub async fn models(&self) -> Arc<Vec<ModelEntry>> {
        let Some(source) = &self.source else {
            return Arc::clone(self.cached.get_or_init(|| async { Arc::new(builtin_models()) }).await);
        };

        let fetched = self
            .cached
            .get_or_try_init(|| async {
                let models = source.fetch().await?;
                if models.is_empty() {
                    return Err(CoreError::Backend("model catalog is empty".to_string()));
                }
                info!(event = "catalog.loaded", models = models.len());
                Ok::<_, CoreError>(Arc::new(models))
            })
            .await;

        match fetched {
            Ok(models) => Arc::clone(models),
            Err(error) => {
                warn!(event = "catalog.fetch.failed", error = %error, "serving built-in catalog");
                Arc::new(builtin_models())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    struct CountingSource {
        calls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl CatalogSource for CountingSource {
        async fn fetch(&self) -> Result<Vec<ModelEntry>, CoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(CoreError::Backend("catalog unavailable".to_string()));
            }
            Ok(vec![catalog_entry(
                "@cf/qwen/qwen1.5-7b-chat-awq",
                "Qwen chat",
                TASK_TEXT_GENERATION,
                Some("generates text"),
                1,
            )])
        }
    }

    #[test]
    fn entry_ids_carry_hyphenated_task() {
        let entry = catalog_entry("@cf/x/y", "d", "Text Classification", None, 1);
        assert_eq!(entry.id, "@cf/x/y#text-classification");
        assert!(entry.in_use);
        assert!(!catalog_entry("@cf/x/y", "d", "Image Generation", None, 1).in_use);
    }

    #[test]
    fn builtin_catalog_has_an_embedding_model() {
        let models = builtin_models();
        assert!(models.iter().any(|model| model.id == "@cf/meta/llama-3-8b-instruct"));
        assert!(models.iter().any(ModelEntry::is_embedding_model));
    }

    #[tokio::test]
    async fn successful_fetch_is_cached() {
        let source = Arc::new(CountingSource { calls: AtomicUsize::new(0), fail_first: 0 });
        let catalog = ModelCatalog::new(Some(source.clone() as Arc<dyn CatalogSource>));

        let first = catalog.models().await;
        let second = catalog.models().await;
        assert_eq!(first[0].id, "@cf/qwen/qwen1.5-7b-chat-awq#text-generation");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_fetch_serves_builtin_and_retries() {
        let source = Arc::new(CountingSource { calls: AtomicUsize::new(0), fail_first: 1 });
        let catalog = ModelCatalog::new(Some(source.clone() as Arc<dyn CatalogSource>));

        let fallback = catalog.models().await;
        assert_eq!(fallback.len(), builtin_models().len());

        let fetched = catalog.models().await;
        assert_eq!(fetched.len(), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn no_source_serves_builtin() {
        let catalog = ModelCatalog::builtin();
        assert_eq!(*catalog.models().await, builtin_models());
    }
}
