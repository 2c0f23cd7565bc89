use crate::cache::IndexCache;
use crate::error::{QueryError, StoreError};
use crate::index::DatasetIndex;
use crate::models::{DatasetManifest, QueryRecord};
use crate::rag::{AnswerOutcome, RetrievalAnswerer};
use crate::store::{sha256_hex, DatasetStore, StoredIndex};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const PREVIEW_CHARS: usize = 500;

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str, QueryError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(QueryError::InvalidArgument(format!("{field} is empty")));
    }
    Ok(value)
}

fn verify_manifest(stored: &StoredIndex, manifest: &DatasetManifest) -> Result<(), QueryError> {
    if sha256_hex(&stored.geometry) != manifest.index_sha256 {
        return Err(QueryError::ChecksumMismatch {
            key: manifest.index_key.clone(),
        });
    }
    if sha256_hex(&stored.metadata) != manifest.meta_sha256 {
        return Err(QueryError::ChecksumMismatch {
            key: manifest.meta_key.clone(),
        });
    }
    Ok(())
}

/// Serves loaded contexts: loading, answering, previews and the memory log.
pub struct QueryCoordinator {
    store: Arc<DatasetStore>,
    cache: IndexCache,
    answerer: RetrievalAnswerer,
}

impl QueryCoordinator {
    pub fn new(store: Arc<DatasetStore>, cache: IndexCache, answerer: RetrievalAnswerer) -> Self {
        Self {
            store,
            cache,
            answerer,
        }
    }

    pub fn store(&self) -> &Arc<DatasetStore> {
        &self.store
    }

    pub fn cache(&self) -> &IndexCache {
        &self.cache
    }

    /// Datasets with both companion artifacts in storage, loaded or not.
    pub async fn list_contexts(&self) -> Result<Vec<String>, QueryError> {
        Ok(self.store.list_available().await?)
    }

    /// Fetches, verifies and caches the index for `name`. The index must have
    /// been built with the answerer's embedder. A failed load
    /// leaves any previously cached index for `name` in place.
    pub async fn load_context(&self, name: &str) -> Result<usize, QueryError> {
        let name = required(name, "context name")?;

        let stored = match self.store.load_index(name).await {
            Ok(stored) => stored,
            Err(StoreError::NotFound(key)) => {
                debug!(dataset = name, key = %key, "companion artifact missing");
                return Err(QueryError::MissingArtifacts(name.to_string()));
            }
            Err(error) => return Err(error.into()),
        };
        if let Some(manifest) = &stored.manifest {
            verify_manifest(&stored, manifest)?;
        }

        let index: DatasetIndex = DatasetIndex::deserialize(&stored.geometry, &stored.metadata)?;
        self.answerer.check_compatible(&index)?;
        let chunks = index.chunk_count();
        self.cache.insert(name, index).await;

        info!(dataset = name, chunks, "loaded context");
        Ok(chunks)
    }

    /// Answers from an already loaded context; never loads implicitly.
    pub async fn ask(&self, name: &str, question: &str) -> Result<String, QueryError> {
        let name = required(name, "context name")?;
        let question = required(question, "question")?;

        let index = self
            .cache
            .get(name)
            .await
            .ok_or_else(|| QueryError::NotLoaded(name.to_string()))?;

        let answer = self.answerer.answer(&index, question).await;
        if answer.outcome != AnswerOutcome::Completed {
            warn!(dataset = name, outcome = ?answer.outcome, "answered with fallback");
        }

        let record = QueryRecord::new(question, answer.text.as_str());
        match self.store.append_query_record(name, &record).await {
            Ok(key) => debug!(dataset = name, key = %key, "recorded query"),
            Err(error) => warn!(dataset = name, %error, "failed to record query"),
        }

        Ok(answer.text)
    }

    /// First characters of the stored raw text of a loaded context.
    pub async fn preview_context(&self, name: &str) -> Result<String, QueryError> {
        let name = required(name, "context name")?;
        if !self.cache.contains(name).await {
            return Err(QueryError::NotLoaded(name.to_string()));
        }

        let text = match self.store.raw_text(name).await {
            Ok(text) => text,
            Err(StoreError::NotFound(_)) => {
                return Err(QueryError::RawTextMissing(name.to_string()))
            }
            Err(error) => return Err(error.into()),
        };

        Ok(text.chars().take(PREVIEW_CHARS).collect())
    }

    pub async fn history(&self, name: &str) -> Result<Vec<QueryRecord>, QueryError> {
        let name = required(name, "context name")?;
        let mut records = self.store.query_records(name).await?;
        records.sort_by_key(|record| record.timestamp);
        Ok(records)
    }
}
