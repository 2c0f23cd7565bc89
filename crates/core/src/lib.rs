pub mod cache;
pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod rag;
pub mod store;
pub mod stores;
pub mod traits;

pub use cache::{CachePolicy, IndexCache, DEFAULT_CACHE_CAPACITY};
pub use chunking::{build_chunks, merge_chunks, normalize_whitespace, ChunkingConfig};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, HttpEmbedder, HttpEmbedderConfig,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{
    ConfigError, IndexError, IngestError, ProviderError, QueryError, RetrievalError, StoreError,
};
pub use extractor::{flatten_pages, LopdfExtractor, PageText, PdfExtractor};
pub use index::{DatasetIndex, DistanceMetric, FlatIndex, IndexMetadata};
pub use ingest::{
    dataset_name_for, discover_pdf_files, FolderIngestionReport, IngestionPipeline,
    IngestionReport, SkippedPdf,
};
pub use llm::{Completion, EchoModel, GenerationParams, HttpChatModel, HttpChatModelConfig};
pub use models::{
    Chunk, DatasetManifest, IngestionOptions, LengthUnit, QueryRecord, ScoredChunk,
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE,
};
pub use orchestrator::{QueryCoordinator, PREVIEW_CHARS};
pub use rag::{
    Answer, AnswerOutcome, PromptConfig, RetrievalAnswerer, DEFAULT_PROMPT_TEMPLATE, DEFAULT_TOP_K,
    NO_ANSWER,
};
pub use store::{artifact_key, ArtifactKind, DatasetStore};
pub use stores::{MemoryObjectStore, S3ObjectStore, S3Settings};
pub use traits::{LanguageModel, ObjectStore, SimilarityIndex};
