use crate::error::{IndexError, ProviderError, StoreError};
use crate::llm::{Completion, GenerationParams};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Flat key/value blob storage inside a single bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), StoreError>;

    /// Fails with [`StoreError::NotFound`] when the key is absent.
    async fn get(&self, key: &str) -> Result<Bytes, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Keys starting with `prefix`. With a `delimiter`, keys that contain it
    /// after the prefix are left out.
    async fn list(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> Result<Vec<String>, StoreError>;

    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String, StoreError>;
}

/// Nearest-neighbour search over vectors identified by their insertion order.
pub trait SimilarityIndex: Send + Sync + Sized {
    fn build(dimensions: usize, vectors: &[Vec<f32>]) -> Result<Self, IndexError>;

    fn dimensions(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns up to `k` `(id, distance)` pairs, closest first.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u64, f32)>, IndexError>;

    fn to_bytes(&self) -> Vec<u8>;

    fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError>;
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Completion, ProviderError>;
}
