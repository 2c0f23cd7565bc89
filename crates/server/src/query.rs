use crate::error::{ApiError, ApiResult};
use crate::{cors_layer, HttpConfig};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use pdf_qa_core::QueryCoordinator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct QueryState {
    pub coordinator: Arc<QueryCoordinator>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LoadContextRequest {
    #[serde(default)]
    pub base_name: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub base_name: String,
    #[serde(default)]
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PreviewResponse {
    pub preview: String,
}

#[derive(Debug, Deserialize)]
struct BaseNameQuery {
    #[serde(default)]
    base_name: String,
}

pub fn router(state: QueryState, config: &HttpConfig) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/list-contexts", get(list_contexts))
        .route("/load-context", post(load_context))
        .route("/ask", post(ask))
        .route("/preview-context", get(preview_context))
        .with_state(state)
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
}

async fn root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "PDF query service is running.".to_string(),
    })
}

async fn list_contexts(State(state): State<QueryState>) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.coordinator.list_contexts().await?))
}

async fn load_context(
    State(state): State<QueryState>,
    payload: Result<Json<LoadContextRequest>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let Json(request) = payload?;
    let base_name = request.base_name.trim();
    if base_name.is_empty() {
        return Err(ApiError::bad_request("base_name is required."));
    }

    state.coordinator.load_context(base_name).await?;
    Ok(Json(MessageResponse {
        message: format!("Context '{base_name}' loaded successfully."),
    }))
}

async fn ask(
    State(state): State<QueryState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> ApiResult<Json<AnswerResponse>> {
    let Json(request) = payload?;
    if request.base_name.trim().is_empty() || request.question.trim().is_empty() {
        return Err(ApiError::bad_request("Missing required fields"));
    }

    let answer = state
        .coordinator
        .ask(&request.base_name, &request.question)
        .await?;
    Ok(Json(AnswerResponse { answer }))
}

async fn preview_context(
    State(state): State<QueryState>,
    params: Result<Query<BaseNameQuery>, QueryRejection>,
) -> ApiResult<Json<PreviewResponse>> {
    let Query(query) = params?;
    if query.base_name.trim().is_empty() {
        return Err(ApiError::bad_request("base_name is required."));
    }

    let preview = state.coordinator.preview_context(&query.base_name).await?;
    Ok(Json(PreviewResponse { preview }))
}
