use crate::error::StoreError;
use crate::traits::ObjectStore;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::RwLock;

/// Process-local object store, used by tests and offline runs.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, Bytes>>,
    presign_base: Option<String>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables presigned URLs of the form `{base}/{key}?expires_in={secs}`.
    pub fn with_presign_base(mut self, base: impl Into<String>) -> Self {
        self.presign_base = Some(base.into());
        self
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    pub async fn remove(&self, key: &str) -> Option<Bytes> {
        self.objects.write().await.remove(key)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, body: Bytes, _content_type: &str) -> Result<(), StoreError> {
        self.objects.write().await.insert(key.to_string(), body);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn list(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> Result<Vec<String>, StoreError> {
        Ok(self
            .objects
            .read()
            .await
            .keys()
            .filter(|key| match key.strip_prefix(prefix) {
                Some(rest) => delimiter.map_or(true, |delimiter| !rest.contains(delimiter)),
                None => false,
            })
            .cloned()
            .collect())
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String, StoreError> {
        let base = self.presign_base.as_deref().ok_or_else(|| StoreError::Presign {
            key: key.to_string(),
            details: "presigning is not configured for the memory backend".to_string(),
        })?;
        Ok(format!(
            "{}/{key}?expires_in={}",
            base.trim_end_matches('/'),
            expires_in.as_secs()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_keys_are_not_found() {
        let store = MemoryObjectStore::new();
        assert!(matches!(store.get("absent").await, Err(StoreError::NotFound(_))));
        assert!(!store.exists("absent").await.unwrap());
    }

    #[tokio::test]
    async fn listing_filters_by_prefix() {
        let store = MemoryObjectStore::new();
        for key in ["a.index", "a/memory/1.json", "b.meta"] {
            store.put(key, Bytes::from_static(b"x"), "text/plain").await.unwrap();
        }
        assert_eq!(store.list("a", None).await.unwrap(), vec!["a.index", "a/memory/1.json"]);
        assert_eq!(store.list("", None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn delimiter_hides_nested_keys() {
        let store = MemoryObjectStore::new();
        for key in ["a.index", "a/memory/1.json", "b.meta"] {
            store.put(key, Bytes::from_static(b"x"), "text/plain").await.unwrap();
        }
        assert_eq!(store.list("", Some("/")).await.unwrap(), vec!["a.index", "b.meta"]);
        assert_eq!(
            store.list("a/", Some("/")).await.unwrap(),
            Vec::<String>::new()
        );
    }

    #[tokio::test]
    async fn presigning_requires_a_base() {
        let store = MemoryObjectStore::new();
        assert!(matches!(
            store.presign_get("a.pdf", Duration::from_secs(60)).await,
            Err(StoreError::Presign { .. })
        ));

        let store = MemoryObjectStore::new().with_presign_base("http://files.local/");
        assert_eq!(
            store.presign_get("a.pdf", Duration::from_secs(60)).await.unwrap(),
            "http://files.local/a.pdf?expires_in=60"
        );
    }
}
