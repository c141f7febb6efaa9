use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    db::ConversationRepository,
    middleware::{make_span_with_request_id, request_id_middleware},
    services::{chat::ChatService, embedding_store::EmbeddingStore},
};

pub mod chat;
pub mod embeddings;
pub mod search;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub embedding_store: EmbeddingStore,
    pub chat: ChatService,
    pub conversations: Arc<dyn ConversationRepository>,
}

/// Creates the application router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .layer(
            // request_id runs first so the trace span can read it
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/movies/semantic-search", post(search::semantic_search))
        .route(
            "/movies/:movie_id/embeddings/:content_type",
            put(embeddings::upsert_embedding),
        )
        .route("/chat", post(chat::chat))
        .route(
            "/conversations/:conversation_id/messages",
            get(chat::conversation_messages),
        )
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
