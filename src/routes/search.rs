use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    error::AppResult,
    middleware::RequestId,
    models::SimilarityResult,
    routes::AppState,
    services::embedding_store::DEFAULT_SEARCH_LIMIT,
};

#[derive(Debug, Deserialize)]
pub struct SemanticSearchRequest {
    pub query: String,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SemanticSearchResponse {
    pub query: String,
    pub results: Vec<SimilarityResult>,
}

/// Handler for semantic movie search
pub async fn semantic_search(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<SemanticSearchRequest>,
) -> AppResult<Json<SemanticSearchResponse>> {
    let limit = request.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    tracing::info!(request_id = %request_id, limit, "Processing semantic search");

    let results = state.embedding_store.search(&request.query, limit).await?;

    Ok(Json(SemanticSearchResponse {
        query: request.query,
        results,
    }))
}
