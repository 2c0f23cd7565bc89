use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use pdf_qa_core::{
    CachePolicy, CharacterNgramEmbedder, Completion, DatasetStore, GenerationParams, IndexCache,
    IngestError, IngestionPipeline, LanguageModel, MemoryObjectStore, ObjectStore, PageText,
    PdfExtractor, PromptConfig, ProviderError, QueryCoordinator, RetrievalAnswerer,
};
use pdf_qa_server::{admin, query, AdminState, HttpConfig, QueryState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "pdfqaboundary";

struct PolicyExtractor;

impl PdfExtractor for PolicyExtractor {
    fn extract_pages(&self, _pdf: &[u8]) -> Result<Vec<PageText>, IngestError> {
        Ok((1..=3u32)
            .map(|number| PageText {
                number,
                text: (0..500)
                    .map(|word| match word % 5 {
                        0 => "refunds".to_string(),
                        1 => "within".to_string(),
                        2 => "thirty".to_string(),
                        3 => "days".to_string(),
                        _ => format!("page{number}word{word}"),
                    })
                    .collect::<Vec<_>>()
                    .join(" "),
            })
            .collect())
    }
}

struct CannedModel;

#[async_trait]
impl LanguageModel for CannedModel {
    fn model_name(&self) -> &str {
        "canned"
    }

    async fn complete(
        &self,
        _prompt: &str,
        _params: &GenerationParams,
    ) -> Result<Completion, ProviderError> {
        Ok(Completion::Text(
            "Refunds are accepted within 30 days.".to_string(),
        ))
    }
}

struct Services {
    objects: Arc<MemoryObjectStore>,
    admin: Router,
    query: Router,
}

fn services(objects: MemoryObjectStore) -> Services {
    let objects = Arc::new(objects);
    let store = Arc::new(DatasetStore::new(objects.clone()));
    let embedder = Arc::new(CharacterNgramEmbedder::default());
    let config = HttpConfig::default();

    let pipeline = IngestionPipeline::new(store.clone(), embedder.clone(), Arc::new(PolicyExtractor));
    let admin = admin::router(AdminState::new(Arc::new(pipeline)), &config);

    let answerer = RetrievalAnswerer::new(embedder, Arc::new(CannedModel), PromptConfig::default());
    let cache = IndexCache::new(CachePolicy::default()).expect("cache policy");
    let coordinator = QueryCoordinator::new(store, cache, answerer);
    let query = query::router(
        QueryState {
            coordinator: Arc::new(coordinator),
        },
        &config,
    );

    Services {
        objects,
        admin,
        query,
    }
}

fn multipart_upload(file_name: &str, chunk_size: usize, chunk_overlap: usize) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"pdf\"; filename=\"{file_name}\"\r\n\
         Content-Type: application/pdf\r\n\r\n\
         %PDF-1.4 fake\r\n\
         --{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"chunk_size\"\r\n\r\n\
         {chunk_size}\r\n\
         --{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"chunk_overlap\"\r\n\r\n\
         {chunk_overlap}\r\n\
         --{BOUNDARY}--\r\n"
    );

    Request::builder()
        .method("POST")
        .uri("/upload-pdf")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("upload request")
}

fn json_post(uri: &str, payload: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("json request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("get request")
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("response body")
        .to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn asking_an_unknown_context_is_not_found() {
    let services = services(MemoryObjectStore::new());

    let (status, body) = send(
        &services.query,
        json_post("/ask", json!({"base_name": "ghost", "question": "anything?"})),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].as_str().unwrap_or_default().contains("ghost"));
    assert!(services.objects.keys().await.is_empty());
}

#[tokio::test]
async fn uploading_policy_stores_all_artifacts() {
    let services = services(MemoryObjectStore::new());

    let (status, body) = send(&services.admin, multipart_upload("policy.pdf", 1000, 200)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Successfully processed PDF 'policy.pdf'.");
    let chunks = body["chunks"].as_u64().expect("chunk count");
    assert!(chunks > 1 && chunks <= 2);

    let keys = services.objects.keys().await;
    for key in ["policy.index", "policy.meta", "policy.txt", "policy.pdf"] {
        assert!(keys.contains(&key.to_string()), "missing {key}");
    }
}

#[tokio::test]
async fn load_then_ask_answers_and_records_memory() {
    let services = services(MemoryObjectStore::new());
    send(&services.admin, multipart_upload("policy.pdf", 1000, 200)).await;

    let (status, body) = send(&services.query, get("/list-contexts")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["policy"]));

    let (status, body) = send(
        &services.query,
        json_post("/load-context", json!({"base_name": "policy"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Context 'policy' loaded successfully.");

    let (status, body) = send(
        &services.query,
        json_post(
            "/ask",
            json!({"base_name": "policy", "question": "What is the refund window?"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body["answer"].as_str().unwrap_or_default().is_empty());

    let memory = services
        .objects
        .list("policy/memory/", None)
        .await
        .expect("memory listing");
    assert_eq!(memory.len(), 1);
    let record: Value =
        serde_json::from_slice(&services.objects.get(&memory[0]).await.expect("record"))
            .expect("record json");
    assert_eq!(record["query"], "What is the refund window?");
    assert!(record["timestamp"].is_string());
}

#[tokio::test]
async fn preview_requires_a_loaded_context() {
    let services = services(MemoryObjectStore::new());
    send(&services.admin, multipart_upload("policy.pdf", 1000, 200)).await;

    let (status, _) = send(&services.query, get("/preview-context?base_name=policy")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    send(
        &services.query,
        json_post("/load-context", json!({"base_name": "policy"})),
    )
    .await;
    let (status, body) = send(&services.query, get("/preview-context?base_name=policy")).await;
    assert_eq!(status, StatusCode::OK);
    let preview = body["preview"].as_str().unwrap_or_default();
    assert_eq!(preview.chars().count(), 500);
    assert!(preview.starts_with("refunds within thirty days"));
}

#[tokio::test]
async fn non_pdf_uploads_are_rejected() {
    let services = services(MemoryObjectStore::new());

    let (status, body) = send(&services.admin, multipart_upload("notes.txt", 1000, 200)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Please upload a PDF file.");
    assert!(services.objects.keys().await.is_empty());
}

#[tokio::test]
async fn overlap_not_smaller_than_size_is_rejected() {
    let services = services(MemoryObjectStore::new());

    let (status, _) = send(&services.admin, multipart_upload("policy.pdf", 200, 200)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(services.objects.keys().await.is_empty());
}

#[tokio::test]
async fn empty_fields_are_bad_requests() {
    let services = services(MemoryObjectStore::new());

    let (status, _) = send(
        &services.query,
        json_post("/load-context", json!({"base_name": "  "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &services.query,
        json_post("/ask", json!({"base_name": "policy", "question": " "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&services.admin, get("/get-pdf-url")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_bodies_are_reported_as_json_details() {
    let services = services(MemoryObjectStore::new());

    let request = Request::builder()
        .method("POST")
        .uri("/ask")
        .header("content-type", "application/json")
        .body(Body::from("not json"))
        .expect("ask request");
    let (status, body) = send(&services.query, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());

    let request = Request::builder()
        .method("POST")
        .uri("/load-context")
        .body(Body::from(r#"{"base_name": "policy"}"#))
        .expect("load request");
    let (status, body) = send(&services.query, request).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(body["detail"].is_string());

    let request = Request::builder()
        .method("POST")
        .uri("/upload-pdf")
        .header("content-type", "text/plain")
        .body(Body::from("policy"))
        .expect("upload request");
    let (status, body) = send(&services.admin, request).await;
    assert!(status.is_client_error());
    assert!(body["detail"].is_string());
    assert!(services.objects.keys().await.is_empty());
}

#[tokio::test]
async fn pdf_urls_are_presigned() {
    let services = services(MemoryObjectStore::new().with_presign_base("http://files.local"));

    let (status, body) = send(&services.admin, get("/get-pdf-url?base_name=policy")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["pdf_url"],
        "http://files.local/policy.pdf?expires_in=3600"
    );
}

#[tokio::test]
async fn signing_failures_are_internal_errors() {
    let services = services(MemoryObjectStore::new());

    let (status, body) = send(&services.admin, get("/get-pdf-url?base_name=policy")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn liveness_routes_respond() {
    let services = services(MemoryObjectStore::new());

    let (status, body) = send(&services.admin, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Admin PDF Uploader is running.");

    let (status, _) = send(&services.query, get("/")).await;
    assert_eq!(status, StatusCode::OK);
}
