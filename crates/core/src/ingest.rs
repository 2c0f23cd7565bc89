use crate::chunking::{build_chunks, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::error::IngestError;
use crate::extractor::{flatten_pages, PdfExtractor};
use crate::index::DatasetIndex;
use crate::models::IngestionOptions;
use crate::store::{validate_dataset_name, DatasetStore};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        if has_pdf_extension(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Dataset name for an uploaded file: its base name without the `.pdf` extension.
pub fn dataset_name_for(file_name: &str) -> Result<String, IngestError> {
    let path = Path::new(file_name.trim());
    let base = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(file_name.to_string()))?;

    if !has_pdf_extension(path) {
        return Err(IngestError::NotPdf(base.to_string()));
    }

    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| IngestError::MissingFileName(file_name.to_string()))?;
    Ok(validate_dataset_name(stem)?.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionReport {
    pub dataset: String,
    pub chunks: usize,
    pub pages: usize,
}

pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

pub struct FolderIngestionReport {
    pub ingested: Vec<IngestionReport>,
    pub skipped_files: Vec<SkippedPdf>,
}

/// Extracts, chunks, embeds and persists uploaded PDFs.
#[derive(Clone)]
pub struct IngestionPipeline {
    store: Arc<DatasetStore>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn PdfExtractor>,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<DatasetStore>,
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn PdfExtractor>,
    ) -> Self {
        Self {
            store,
            embedder,
            extractor,
        }
    }

    pub fn store(&self) -> &Arc<DatasetStore> {
        &self.store
    }

    /// Writes `N.index`, `N.meta` and the manifest, then `N.txt`, then `N.pdf`.
    /// A failure part way leaves earlier artifacts in place; re-ingesting overwrites them.
    pub async fn ingest_pdf(
        &self,
        file_name: &str,
        pdf: Bytes,
        options: &IngestionOptions,
    ) -> Result<IngestionReport, IngestError> {
        ChunkingConfig::from(*options).validate()?;
        let dataset = dataset_name_for(file_name)?;

        let extractor = self.extractor.clone();
        let source = pdf.clone();
        let pages = tokio::task::spawn_blocking(move || extractor.extract_pages(&source))
            .await
            .map_err(|error| IngestError::Task(error.to_string()))??;

        let chunks = build_chunks(&dataset, &pages, options)?;
        info!(
            dataset = %dataset,
            pages = pages.len(),
            chunks = chunks.len(),
            chunk_size = options.chunk_size,
            chunk_overlap = options.chunk_overlap,
            unit = %options.length_unit,
            "chunked document"
        );

        let index: DatasetIndex =
            DatasetIndex::build(&dataset, chunks, self.embedder.as_ref()).await?;
        let chunk_count = index.chunk_count();
        let serialized = index.serialize()?;

        self.store
            .save_index(
                &dataset,
                serialized.geometry,
                serialized.metadata,
                chunk_count,
                index.embedding_model(),
            )
            .await?;
        self.store
            .put_raw_text(&dataset, flatten_pages(&pages))
            .await?;
        self.store.put_document(&dataset, pdf).await?;

        info!(dataset = %dataset, chunks = chunk_count, "ingested pdf");
        Ok(IngestionReport {
            dataset,
            chunks: chunk_count,
            pages: pages.len(),
        })
    }

    pub async fn ingest_file(
        &self,
        path: &Path,
        options: &IngestionOptions,
    ) -> Result<IngestionReport, IngestError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;
        let bytes = tokio::fs::read(path).await?;
        self.ingest_pdf(file_name, Bytes::from(bytes), options).await
    }

    /// Ingests every PDF under `folder`, skipping the ones that fail.
    pub async fn ingest_folder_best_effort(
        &self,
        folder: &Path,
        options: &IngestionOptions,
    ) -> Result<FolderIngestionReport, IngestError> {
        ChunkingConfig::from(*options).validate()?;
        let files = discover_pdf_files(folder);

        if files.is_empty() {
            return Err(IngestError::InvalidArgument(format!(
                "no pdf files found in {}",
                folder.display()
            )));
        }

        let mut ingested = Vec::new();
        let mut skipped_files = Vec::new();

        for path in files {
            match self.ingest_file(&path, options).await {
                Ok(report) => ingested.push(report),
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping pdf");
                    skipped_files.push(SkippedPdf {
                        path,
                        reason: error.to_string(),
                    });
                }
            }
        }

        Ok(FolderIngestionReport {
            ingested,
            skipped_files,
        })
    }
}
