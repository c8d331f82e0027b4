use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::labels::{LabelRecord, LabelStore};

struct ServerError(anyhow::Error);

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Labeler error: {}", self.0),
        );
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl<E> From<E> for ServerError where E: Into<anyhow::Error> {
    fn from(err: E) -> Self { Self(err.into()) }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LabelStore>,
    /// DID the labels are issued by.
    pub labeler_did: String,
}

#[derive(Serialize)]
struct LabelView {
    src: String,
    uri: String,
    val: String,
    neg: bool,
    cts: String,
}

#[derive(Serialize)]
struct QueryLabelsResponse {
    labels: Vec<LabelView>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/xrpc/com.atproto.label.queryLabels", get(query_labels))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn query_labels(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<QueryLabelsResponse>, ServerError> {
    let patterns: Vec<String> = params
        .into_iter()
        .filter(|(k, _)| k == "uriPatterns")
        .map(|(_, v)| v)
        .collect();

    let records = state.store.query_labels(&patterns).await?;
    Ok(Json(QueryLabelsResponse {
        labels: records
            .into_iter()
            .map(|r: LabelRecord| LabelView {
                src: state.labeler_did.clone(),
                uri: r.uri,
                val: r.val,
                neg: r.neg,
                cts: r.cts,
            })
            .collect(),
    }))
}
