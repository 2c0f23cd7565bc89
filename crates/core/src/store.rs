//! Dataset-level view over an [`ObjectStore`]: key naming, companion
//! artifacts, manifests and the query memory log.

use crate::error::StoreError;
use crate::models::{DatasetManifest, QueryRecord};
use crate::traits::ObjectStore;
use bytes::Bytes;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Index,
    Meta,
    RawText,
    Document,
    Manifest,
}

impl ArtifactKind {
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Index => ".index",
            Self::Meta => ".meta",
            Self::RawText => ".txt",
            Self::Document => ".pdf",
            Self::Manifest => ".manifest.json",
        }
    }

    fn content_type(self) -> &'static str {
        match self {
            Self::Index => "application/octet-stream",
            Self::Meta | Self::Manifest => "application/json",
            Self::RawText => "text/plain; charset=utf-8",
            Self::Document => "application/pdf",
        }
    }
}

pub fn artifact_key(dataset: &str, kind: ArtifactKind) -> String {
    format!("{dataset}{}", kind.suffix())
}

pub fn memory_prefix(dataset: &str) -> String {
    format!("{dataset}/memory/")
}

pub fn validate_dataset_name(name: &str) -> Result<&str, StoreError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::InvalidName("name is empty".to_string()));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(StoreError::InvalidName(format!(
            "'{name}' must not contain path separators"
        )));
    }
    Ok(name)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Both companion artifacts of a dataset, as fetched from storage.
pub struct StoredIndex {
    pub geometry: Bytes,
    pub metadata: Bytes,
    pub manifest: Option<DatasetManifest>,
}

#[derive(Clone)]
pub struct DatasetStore {
    objects: Arc<dyn ObjectStore>,
}

impl DatasetStore {
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self { objects }
    }

    pub async fn put(&self, key: &str, body: Bytes) -> Result<(), StoreError> {
        self.objects.put(key, body, "application/octet-stream").await
    }

    pub async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        self.objects.get(key).await
    }

    async fn put_artifact(
        &self,
        dataset: &str,
        kind: ArtifactKind,
        body: Bytes,
    ) -> Result<String, StoreError> {
        let key = artifact_key(dataset, kind);
        self.objects.put(&key, body, kind.content_type()).await?;
        Ok(key)
    }

    /// True iff both companion artifacts of `dataset` exist.
    pub async fn exists_pair(&self, dataset: &str) -> Result<bool, StoreError> {
        let dataset = validate_dataset_name(dataset)?;
        Ok(self
            .objects
            .exists(&artifact_key(dataset, ArtifactKind::Index))
            .await?
            && self
                .objects
                .exists(&artifact_key(dataset, ArtifactKind::Meta))
                .await?)
    }

    /// Dataset names whose companion artifacts are both present, sorted.
    pub async fn list_available(&self) -> Result<Vec<String>, StoreError> {
        let mut seen: BTreeMap<String, (bool, bool)> = BTreeMap::new();

        for key in self.objects.list("", Some("/")).await? {
            if let Some(name) = key.strip_suffix(ArtifactKind::Index.suffix()) {
                seen.entry(name.to_string()).or_default().0 = true;
            } else if let Some(name) = key.strip_suffix(ArtifactKind::Meta.suffix()) {
                seen.entry(name.to_string()).or_default().1 = true;
            }
        }

        Ok(seen
            .into_iter()
            .filter(|(name, pair)| !name.is_empty() && *pair == (true, true))
            .map(|(name, _)| name)
            .collect())
    }

    /// Writes the geometry and metadata blobs, then the manifest that commits them.
    pub async fn save_index(
        &self,
        dataset: &str,
        geometry: Vec<u8>,
        metadata: Vec<u8>,
        chunk_count: usize,
        embedding_model: &str,
    ) -> Result<DatasetManifest, StoreError> {
        let dataset = validate_dataset_name(dataset)?;
        let index_sha256 = sha256_hex(&geometry);
        let meta_sha256 = sha256_hex(&metadata);

        let index_key = self
            .put_artifact(dataset, ArtifactKind::Index, Bytes::from(geometry))
            .await?;
        let meta_key = self
            .put_artifact(dataset, ArtifactKind::Meta, Bytes::from(metadata))
            .await?;

        let manifest = DatasetManifest {
            dataset: dataset.to_string(),
            index_key,
            index_sha256,
            meta_key,
            meta_sha256,
            chunk_count,
            embedding_model: embedding_model.to_string(),
            created_at: Utc::now(),
        };
        self.put_artifact(
            dataset,
            ArtifactKind::Manifest,
            Bytes::from(serde_json::to_vec_pretty(&manifest)?),
        )
        .await?;

        info!(dataset, chunk_count, "stored index artifacts");
        Ok(manifest)
    }

    pub async fn load_index(&self, dataset: &str) -> Result<StoredIndex, StoreError> {
        let dataset = validate_dataset_name(dataset)?;
        let manifest = match self
            .objects
            .get(&artifact_key(dataset, ArtifactKind::Manifest))
            .await
        {
            Ok(raw) => Some(serde_json::from_slice::<DatasetManifest>(&raw)?),
            Err(StoreError::NotFound(_)) => {
                warn!(dataset, "no manifest stored, loading companions unchecked");
                None
            }
            Err(error) => return Err(error),
        };

        let geometry = self
            .objects
            .get(&artifact_key(dataset, ArtifactKind::Index))
            .await?;
        let metadata = self
            .objects
            .get(&artifact_key(dataset, ArtifactKind::Meta))
            .await?;

        Ok(StoredIndex {
            geometry,
            metadata,
            manifest,
        })
    }

    pub async fn put_raw_text(&self, dataset: &str, text: String) -> Result<String, StoreError> {
        let dataset = validate_dataset_name(dataset)?;
        self.put_artifact(dataset, ArtifactKind::RawText, Bytes::from(text))
            .await
    }

    pub async fn raw_text(&self, dataset: &str) -> Result<String, StoreError> {
        let dataset = validate_dataset_name(dataset)?;
        let raw = self
            .objects
            .get(&artifact_key(dataset, ArtifactKind::RawText))
            .await?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    pub async fn put_document(&self, dataset: &str, pdf: Bytes) -> Result<String, StoreError> {
        let dataset = validate_dataset_name(dataset)?;
        self.put_artifact(dataset, ArtifactKind::Document, pdf).await
    }

    pub async fn presigned_document_url(
        &self,
        dataset: &str,
        expires_in: Duration,
    ) -> Result<String, StoreError> {
        let dataset = validate_dataset_name(dataset)?;
        self.objects
            .presign_get(&artifact_key(dataset, ArtifactKind::Document), expires_in)
            .await
    }

    /// Appends one record under `{dataset}/memory/` with a random key.
    pub async fn append_query_record(
        &self,
        dataset: &str,
        record: &QueryRecord,
    ) -> Result<String, StoreError> {
        let dataset = validate_dataset_name(dataset)?;
        let key = format!("{}{}.json", memory_prefix(dataset), Uuid::new_v4());
        self.objects
            .put(&key, Bytes::from(serde_json::to_vec(record)?), "application/json")
            .await?;
        Ok(key)
    }

    pub async fn query_records(&self, dataset: &str) -> Result<Vec<QueryRecord>, StoreError> {
        let dataset = validate_dataset_name(dataset)?;
        let mut records = Vec::new();
        for key in self.objects.list(&memory_prefix(dataset), None).await? {
            let raw = self.objects.get(&key).await?;
            records.push(serde_json::from_slice(&raw)?);
        }
        Ok(records)
    }
}
