use crate::embeddings::Embedder;
use crate::error::{IndexError, IngestError};
use crate::models::{Chunk, ScoredChunk};
use crate::traits::SimilarityIndex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

const MAGIC: &[u8; 4] = b"PQFX";
const FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = 4 + 1 + 1 + 4 + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceMetric {
    #[default]
    L2,
    Cosine,
}

impl DistanceMetric {
    fn tag(self) -> u8 {
        match self {
            Self::L2 => 0,
            Self::Cosine => 1,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, IndexError> {
        match tag {
            0 => Ok(Self::L2),
            1 => Ok(Self::Cosine),
            other => Err(IndexError::Corrupt(format!("unknown metric tag {other}"))),
        }
    }
}

/// Exact search over a dense row-major vector matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimensions: usize,
    metric: DistanceMetric,
    vectors: Vec<f32>,
}

impl FlatIndex {
    pub fn with_metric(
        dimensions: usize,
        metric: DistanceMetric,
        vectors: &[Vec<f32>],
    ) -> Result<Self, IndexError> {
        if vectors.is_empty() {
            return Err(IndexError::Empty);
        }
        if dimensions == 0 {
            return Err(IndexError::Corrupt("dimensions must be positive".to_string()));
        }

        let mut flat = Vec::with_capacity(vectors.len() * dimensions);
        for vector in vectors {
            if vector.len() != dimensions {
                return Err(IndexError::DimensionMismatch {
                    expected: dimensions,
                    actual: vector.len(),
                });
            }
            match metric {
                DistanceMetric::L2 => flat.extend_from_slice(vector),
                DistanceMetric::Cosine => flat.extend(unit_vector(vector)),
            }
        }

        Ok(Self {
            dimensions,
            metric,
            vectors: flat,
        })
    }

    fn distance(&self, row: &[f32], query: &[f32]) -> f32 {
        match self.metric {
            DistanceMetric::L2 => row
                .iter()
                .zip(query)
                .map(|(left, right)| (left - right) * (left - right))
                .sum(),
            DistanceMetric::Cosine => {
                1.0 - row.iter().zip(query).map(|(left, right)| left * right).sum::<f32>()
            }
        }
    }
}

fn unit_vector(vector: &[f32]) -> Vec<f32> {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|value| value / magnitude).collect()
}

impl SimilarityIndex for FlatIndex {
    fn build(dimensions: usize, vectors: &[Vec<f32>]) -> Result<Self, IndexError> {
        Self::with_metric(dimensions, DistanceMetric::default(), vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn len(&self) -> usize {
        if self.dimensions == 0 {
            0
        } else {
            self.vectors.len() / self.dimensions
        }
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u64, f32)>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }

        let query = match self.metric {
            DistanceMetric::L2 => query.to_vec(),
            DistanceMetric::Cosine => unit_vector(query),
        };

        let mut scored = self
            .vectors
            .chunks_exact(self.dimensions)
            .enumerate()
            .map(|(id, row)| (id as u64, self.distance(row, &query)))
            .collect::<Vec<_>>();

        scored.sort_by(|left, right| left.1.total_cmp(&right.1).then(left.0.cmp(&right.0)));
        scored.truncate(k);
        Ok(scored)
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.vectors.len() * 4);
        bytes.extend_from_slice(MAGIC);
        bytes.push(FORMAT_VERSION);
        bytes.push(self.metric.tag());
        bytes.extend_from_slice(&(self.dimensions as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for value in &self.vectors {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
            return Err(IndexError::Corrupt("missing index header".to_string()));
        }
        if bytes[4] != FORMAT_VERSION {
            return Err(IndexError::Corrupt(format!(
                "unsupported format version {}",
                bytes[4]
            )));
        }

        let metric = DistanceMetric::from_tag(bytes[5])?;
        let dimensions = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
        let mut count = [0u8; 8];
        count.copy_from_slice(&bytes[10..18]);
        let count = u64::from_le_bytes(count) as usize;

        let body = &bytes[HEADER_LEN..];
        let expected = count
            .checked_mul(dimensions)
            .and_then(|values| values.checked_mul(4))
            .ok_or_else(|| IndexError::Corrupt("vector count overflows".to_string()))?;
        if dimensions == 0 || body.len() != expected {
            return Err(IndexError::Corrupt(format!(
                "expected {expected} bytes of vectors, found {}",
                body.len()
            )));
        }

        let vectors = body
            .chunks_exact(4)
            .map(|raw| f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
            .collect();

        Ok(Self {
            dimensions,
            metric,
            vectors,
        })
    }
}

/// Chunk text and provenance keyed by vector id; the metadata companion artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexMetadata {
    pub dataset: String,
    pub embedding_model: String,
    pub dimensions: usize,
    pub chunks: BTreeMap<u64, Chunk>,
}

pub struct SerializedIndex {
    pub geometry: Vec<u8>,
    pub metadata: Vec<u8>,
}

/// A searchable index together with the chunks its vectors point to.
#[derive(Debug, Clone)]
pub struct DatasetIndex<I = FlatIndex> {
    index: I,
    metadata: IndexMetadata,
}

impl<I: SimilarityIndex> DatasetIndex<I> {
    /// Embeds every chunk and builds the index. Any embedding failure aborts the build.
    pub async fn build(
        dataset: &str,
        chunks: Vec<Chunk>,
        embedder: &dyn Embedder,
    ) -> Result<Self, IngestError> {
        if chunks.is_empty() {
            return Err(IndexError::Empty.into());
        }

        let texts = chunks.iter().map(|chunk| chunk.text.as_str()).collect::<Vec<_>>();
        let vectors = embedder.embed_batch(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(IndexError::CountMismatch {
                vectors: vectors.len(),
                chunks: chunks.len(),
            }
            .into());
        }

        let index = I::build(embedder.dimensions(), &vectors)?;
        info!(
            dataset,
            vectors = index.len(),
            dimensions = index.dimensions(),
            model = embedder.model_name(),
            "built similarity index"
        );

        let metadata = IndexMetadata {
            dataset: dataset.to_string(),
            embedding_model: embedder.model_name().to_string(),
            dimensions: index.dimensions(),
            chunks: chunks
                .into_iter()
                .enumerate()
                .map(|(id, chunk)| (id as u64, chunk))
                .collect(),
        };

        Ok(Self { index, metadata })
    }

    pub fn from_parts(index: I, metadata: IndexMetadata) -> Result<Self, IndexError> {
        if index.len() != metadata.chunks.len() {
            return Err(IndexError::CountMismatch {
                vectors: index.len(),
                chunks: metadata.chunks.len(),
            });
        }
        if index.dimensions() != metadata.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: metadata.dimensions,
                actual: index.dimensions(),
            });
        }
        if let Some(missing) = (0..index.len() as u64).find(|id| !metadata.chunks.contains_key(id)) {
            return Err(IndexError::Corrupt(format!("no chunk stored for vector {missing}")));
        }

        Ok(Self { index, metadata })
    }

    pub fn serialize(&self) -> Result<SerializedIndex, IndexError> {
        Ok(SerializedIndex {
            geometry: self.index.to_bytes(),
            metadata: serde_json::to_vec(&self.metadata)?,
        })
    }

    pub fn deserialize(geometry: &[u8], metadata: &[u8]) -> Result<Self, IndexError> {
        let index = I::from_bytes(geometry)?;
        let metadata: IndexMetadata = serde_json::from_slice(metadata)?;
        Self::from_parts(index, metadata)
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        self.index
            .search(query, k)?
            .into_iter()
            .map(|(id, distance)| {
                let chunk = self
                    .metadata
                    .chunks
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| IndexError::Corrupt(format!("no chunk stored for vector {id}")))?;
                Ok(ScoredChunk { chunk, distance })
            })
            .collect()
    }

    pub fn dataset(&self) -> &str {
        &self.metadata.dataset
    }

    pub fn embedding_model(&self) -> &str {
        &self.metadata.embedding_model
    }

    pub fn dimensions(&self) -> usize {
        self.index.dimensions()
    }

    pub fn chunk_count(&self) -> usize {
        self.metadata.chunks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::ProviderError;
    use async_trait::async_trait;

    fn chunk(index: u64, text: &str) -> Chunk {
        Chunk {
            chunk_id: format!("c{index}"),
            chunk_index: index,
            page_start: 1,
            page_end: 1,
            offset: 0,
            text: text.to_string(),
        }
    }

    #[test]
    fn l2_search_orders_by_distance() {
        let index = FlatIndex::build(2, &[vec![0.0, 0.0], vec![5.0, 5.0], vec![1.0, 1.0]]).unwrap();
        let hits = index.search(&[0.9, 0.9], 2).unwrap();
        assert_eq!(hits.iter().map(|hit| hit.0).collect::<Vec<_>>(), vec![2, 0]);
    }

    #[test]
    fn cosine_search_ignores_magnitude() {
        let index = FlatIndex::with_metric(
            2,
            DistanceMetric::Cosine,
            &[vec![10.0, 0.0], vec![0.0, 0.1]],
        )
        .unwrap();
        let hits = index.search(&[0.0, 3.0], 1).unwrap();
        assert_eq!(hits[0].0, 1);
        assert!(hits[0].1.abs() < 1e-6);
    }

    #[test]
    fn geometry_survives_serialization() {
        let index = FlatIndex::with_metric(
            3,
            DistanceMetric::Cosine,
            &[vec![1.0, 2.0, 3.0], vec![-1.0, 0.5, 0.0]],
        )
        .unwrap();
        let restored = FlatIndex::from_bytes(&index.to_bytes()).unwrap();
        assert_eq!(restored, index);
    }

    #[test]
    fn truncated_geometry_is_corrupt() {
        let index = FlatIndex::build(2, &[vec![1.0, 2.0]]).unwrap();
        let bytes = index.to_bytes();
        assert!(matches!(
            FlatIndex::from_bytes(&bytes[..bytes.len() - 1]),
            Err(IndexError::Corrupt(_))
        ));
        assert!(matches!(FlatIndex::from_bytes(b"nope"), Err(IndexError::Corrupt(_))));
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let result = FlatIndex::build(2, &[vec![1.0, 2.0], vec![1.0]]);
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }

    #[tokio::test]
    async fn dataset_index_round_trips_and_finds_the_matching_chunk() {
        let embedder = CharacterNgramEmbedder::default();
        let chunks = vec![
            chunk(0, "refunds are accepted within thirty days"),
            chunk(1, "shipping is free above fifty euros"),
            chunk(2, "support is open on weekdays"),
        ];

        let built: DatasetIndex = DatasetIndex::build("policy", chunks, &embedder).await.unwrap();
        let serialized = built.serialize().unwrap();
        let restored: DatasetIndex =
            DatasetIndex::deserialize(&serialized.geometry, &serialized.metadata).unwrap();

        assert_eq!(restored.dataset(), "policy");
        assert_eq!(restored.chunk_count(), 3);

        let query = embedder.embed_sync("shipping free above fifty euros");
        let hits = restored.search(&query, 1).unwrap();
        assert_eq!(hits[0].chunk.chunk_id, "c1");
    }

    #[test]
    fn metadata_must_cover_every_vector() {
        let index = FlatIndex::build(2, &[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        let metadata = IndexMetadata {
            dataset: "d".to_string(),
            embedding_model: "m".to_string(),
            dimensions: 2,
            chunks: BTreeMap::from([(0, chunk(0, "a"))]),
        };
        assert!(matches!(
            DatasetIndex::from_parts(index, metadata),
            Err(IndexError::CountMismatch { .. })
        ));
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }

        fn dimensions(&self) -> usize {
            4
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            Err(ProviderError::Request {
                provider: "test".to_string(),
                details: "offline".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn embedding_failure_aborts_the_build() {
        let result: Result<DatasetIndex, _> =
            DatasetIndex::build("d", vec![chunk(0, "text")], &FailingEmbedder).await;
        assert!(matches!(result, Err(IngestError::Embedding(_))));
    }
}
