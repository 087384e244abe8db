use std::collections::BTreeMap;
use std::sync::Arc;

use aigate_core::{CoreError, KvStore};
use async_trait::async_trait;
use tokio::sync::Mutex;

mod workers_kv;

pub use workers_kv::WorkersKvStore;

/// Process-local namespace; listing returns keys in lexicographic order.
#[derive(Clone, Default)]
pub struct InMemoryKvStore {
    inner: Arc<Mutex<BTreeMap<String, String>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        let guard = self.inner.lock().await;
        Ok(guard.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> Result<(), CoreError> {
        let mut guard = self.inner.lock().await;
        guard.insert(key.to_string(), value);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, CoreError> {
        let guard = self.inner.lock().await;
        Ok(guard
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<(), CoreError> {
        let mut guard = self.inner.lock().await;
        guard.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_returns_only_prefixed_keys_in_order() {
        let store = InMemoryKvStore::new();
        for key in ["thread:b", "assistant:a", "thread:a", "thread:a:messages", "threads"] {
            store.put(key, "{}".to_string()).await.expect("put");
        }

        let keys = store.list("thread:").await.expect("list");
        assert_eq!(keys, vec!["thread:a", "thread:a:messages", "thread:b"]);
    }

    #[tokio::test]
    async fn delete_of_missing_key_is_a_no_op() {
        let store = InMemoryKvStore::new();
        store.put("run:1", "{}".to_string()).await.expect("put");
        store.delete("run:2").await.expect("delete");
        store.delete("run:1").await.expect("delete");
        assert!(store.is_empty().await);
        assert_eq!(store.get("run:1").await.expect("get"), None);
    }
}
