use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    error::AppResult,
    middleware::RequestId,
    models::EmbeddingSummary,
    routes::AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct UpsertEmbeddingRequest {
    /// Text to embed; the movie's overview when omitted
    #[serde(default)]
    pub content: Option<String>,
}

/// Handler that (re)embeds one content type of a movie
pub async fn upsert_embedding(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path((movie_id, content_type)): Path<(i64, String)>,
    body: Option<Json<UpsertEmbeddingRequest>>,
) -> AppResult<Json<EmbeddingSummary>> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    tracing::info!(
        request_id = %request_id,
        movie_id,
        content_type = %content_type,
        "Upserting embedding"
    );

    let record = state
        .embedding_store
        .upsert(movie_id, &content_type, request.content.as_deref())
        .await?;

    Ok(Json(EmbeddingSummary::from(&record)))
}
