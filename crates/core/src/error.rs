use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("not a pdf file: {0}")]
    NotPdf(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("embedding failed: {0}")]
    Embedding(#[from] ProviderError),

    #[error("index build failed: {0}")]
    Index(#[from] IndexError),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("background task failed: {0}")]
    Task(String),
}

/// Failures reported by the embedding or language-model endpoints.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} request failed: {details}")]
    Request { provider: String, details: String },

    #[error("{provider} returned {status}: {details}")]
    Status {
        provider: String,
        status: u16,
        details: String,
    },

    #[error("invalid response from {provider}: {details}")]
    InvalidResponse { provider: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("{backend} error: {details}")]
    Backend { backend: String, details: String },

    #[error("failed to presign {key}: {details}")]
    Presign { key: String, details: String },

    #[error("invalid dataset name: {0}")]
    InvalidName(String),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("cannot build an index without vectors")]
    Empty,

    #[error("invalid dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector count {vectors} does not match chunk count {chunks}")]
    CountMismatch { vectors: usize, chunks: usize },

    #[error("corrupt index data: {0}")]
    Corrupt(String),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Why a question could not be matched against a loaded index.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Embedding(#[from] ProviderError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Context '{0}' not loaded")]
    NotLoaded(String),

    #[error("No raw text found for '{0}'.")]
    RawTextMissing(String),

    #[error("context '{0}' has no stored index")]
    MissingArtifacts(String),

    #[error("artifact {key} does not match its manifest checksum")]
    ChecksumMismatch { key: String },

    #[error("context '{dataset}' was indexed with {stored}, not {configured}")]
    EmbedderMismatch {
        dataset: String,
        stored: String,
        configured: String,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid prompt template: {0}")]
    PromptTemplate(String),

    #[error("invalid cache policy: {0}")]
    CachePolicy(String),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
