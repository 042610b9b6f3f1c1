use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use extract::Entity;
use index::{GraphRow, GraphStats, IngestionRecord};
use ingest::{Error, FileReader};
use query::Answer;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::metrics::{MetricsSnapshot, TimedOperation};
use crate::state::AppState;

const DEFAULT_SEARCH_LIMIT: usize = 10;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/ingest", post(ingest_document))
        .route("/query", post(query_documents))
        .route("/stats", get(get_stats))
        .route("/search/entities", get(search_entities))
        .route("/metrics", get(get_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Maps the shared error taxonomy onto HTTP status codes
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::UsagePrecondition(_) => StatusCode::BAD_REQUEST,
            Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::WriteUnavailable(_) | Error::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            Error::TransientProvider(_)
            | Error::Provider(_)
            | Error::MalformedExtraction(_)
            | Error::RetrievalPath { .. }
            | Error::RetrievalFailed(_) => StatusCode::BAD_GATEWAY,
            Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
            Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = %status, error = %self.0, "Request failed");
        } else {
            warn!(status = %status, error = %self.0, "Request rejected");
        }

        let body = match &self.0 {
            Error::RetrievalFailed(paths) => json!({ "error": self.0.to_string(), "paths": paths }),
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct ServiceInfo {
    name: &'static str,
    version: &'static str,
    status: &'static str,
}

async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
    })
}

#[derive(Debug, Serialize, Deserialize)]
struct HealthResponse {
    graph_store: String,
    vector_store: String,
}

impl HealthResponse {
    fn is_healthy(&self) -> bool {
        self.graph_store == "ok" && self.vector_store == "ok"
    }
}

fn status_text(result: anyhow::Result<()>) -> String {
    match result {
        Ok(()) => "ok".to_string(),
        Err(e) => format!("error: {:#}", e),
    }
}

async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let graph = state.graph.clone();
    let graph_status = state.pool.run(move || graph.health_check()).await;
    let vector_status = state.vectors.health_check().await;

    let response = HealthResponse {
        graph_store: status_text(graph_status),
        vector_store: status_text(vector_status),
    };
    let code = if response.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(response))
}

/// Either inline text or a path readable by the server
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IngestRequest {
    Text { filename: String, text: String },
    File { path: PathBuf },
}

fn check_filename(filename: &str) -> Result<(), Error> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    if FileReader::is_supported(extension) {
        Ok(())
    } else {
        Err(Error::UsagePrecondition(format!(
            "Unsupported file format: {:?} (only .txt and .md are accepted)",
            filename
        )))
    }
}

async fn ingest_document(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestionRecord>, ApiError> {
    let timer = TimedOperation::start();

    let (filename, text) = match req {
        IngestRequest::Text { filename, text } => match check_filename(&filename) {
            Ok(()) => (filename, text),
            Err(e) => {
                state.metrics.record_ingest(timer.elapsed(), None);
                return Err(e.into());
            }
        },
        IngestRequest::File { path } => match ingest::load_document(&path).await {
            Ok(loaded) => loaded,
            Err(e) => {
                state.metrics.record_ingest(timer.elapsed(), None);
                return Err(e.into());
            }
        },
    };

    let cancel = state.shutdown.child_token();
    let result = state
        .pipeline
        .ingest_with(&text, &filename, &cancel, None)
        .await;
    state.metrics.record_ingest(timer.elapsed(), result.as_ref().ok());

    let record = result?;
    info!(
        document_id = %record.document_id,
        chunks = record.chunk_count,
        entities = record.entity_count,
        "Document ingested"
    );
    Ok(Json(record))
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default = "default_true")]
    use_vector_search: bool,
    #[serde(default = "default_true")]
    use_graph_search: bool,
}

#[derive(Debug, Serialize)]
struct QueryResponse {
    answer: String,
    sources: Vec<String>,
    warnings: Vec<String>,
    vector_context: Vec<String>,
    graph_context: Vec<GraphRow>,
}

impl From<Answer> for QueryResponse {
    fn from(answer: Answer) -> Self {
        Self {
            answer: answer.text,
            sources: answer.sources,
            warnings: answer.warnings,
            vector_context: answer.vector_context,
            graph_context: answer.graph_context,
        }
    }
}

async fn query_documents(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let timer = TimedOperation::start();
    let result = state
        .retriever
        .answer_with_cancel(
            &req.query,
            req.use_vector_search,
            req.use_graph_search,
            &state.shutdown,
        )
        .await;

    let degraded = matches!(&result, Ok(answer) if !answer.warnings.is_empty());
    state
        .metrics
        .record_query(timer.elapsed(), result.is_ok(), degraded);

    Ok(Json(result?.into()))
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Result<Json<GraphStats>, ApiError> {
    Ok(Json(state.retriever.graph_stats().await?))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: String,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    query: String,
    count: usize,
    entities: Vec<Entity>,
}

async fn search_entities(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    let entities = state.retriever.search_entities(&params.query, limit).await?;
    Ok(Json(SearchResponse {
        count: entities.len(),
        query: params.query,
        entities,
    }))
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
