use crate::error::{ApiError, ApiResult};
use crate::{cors_layer, HttpConfig};
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::QueryRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use pdf_qa_core::{IngestionOptions, IngestionPipeline, LengthUnit};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub const DEFAULT_PRESIGN_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone)]
pub struct AdminState {
    pub pipeline: Arc<IngestionPipeline>,
    pub presign_ttl: Duration,
}

impl AdminState {
    pub fn new(pipeline: Arc<IngestionPipeline>) -> Self {
        Self {
            pipeline,
            presign_ttl: DEFAULT_PRESIGN_TTL,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub chunks: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PdfUrlResponse {
    pub pdf_url: String,
}

#[derive(Debug, Deserialize)]
struct BaseNameQuery {
    #[serde(default)]
    base_name: Option<String>,
}

pub fn router(state: AdminState, config: &HttpConfig) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/upload-pdf", post(upload_pdf))
        .route("/get-pdf-url", get(get_pdf_url))
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_upload_bytes))
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Admin PDF Uploader is running." }))
}

fn form_number(field: &str, raw: &str) -> ApiResult<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| ApiError::bad_request(format!("{field} must be a non-negative integer.")))
}

async fn upload_pdf(
    State(state): State<AdminState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadResponse>> {
    let mut multipart = multipart?;
    let mut upload: Option<(String, Bytes)> = None;
    let mut options = IngestionOptions::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "pdf" => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::bad_request("Please upload a PDF file."))?;
                upload = Some((file_name, field.bytes().await?));
            }
            "chunk_size" => options.chunk_size = form_number(&name, &field.text().await?)?,
            "chunk_overlap" => options.chunk_overlap = form_number(&name, &field.text().await?)?,
            "length_unit" => {
                options.length_unit = field
                    .text()
                    .await?
                    .parse::<LengthUnit>()
                    .map_err(ApiError::bad_request)?;
            }
            _ => {}
        }
    }

    let (file_name, pdf) = upload.ok_or_else(|| ApiError::bad_request("pdf file is required."))?;
    info!(
        file = %file_name,
        size = pdf.len(),
        chunk_size = options.chunk_size,
        chunk_overlap = options.chunk_overlap,
        "received upload"
    );

    let report = state.pipeline.ingest_pdf(&file_name, pdf, &options).await?;
    Ok(Json(UploadResponse {
        message: format!("Successfully processed PDF '{file_name}'."),
        chunks: report.chunks,
    }))
}

async fn get_pdf_url(
    State(state): State<AdminState>,
    params: Result<Query<BaseNameQuery>, QueryRejection>,
) -> ApiResult<Json<PdfUrlResponse>> {
    let Query(query) = params?;
    let base_name = query
        .base_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::bad_request("base_name is required."))?;

    let pdf_url = state
        .pipeline
        .store()
        .presigned_document_url(base_name, state.presign_ttl)
        .await?;
    Ok(Json(PdfUrlResponse { pdf_url }))
}
