use std::sync::Arc;

use tracing::instrument;

use crate::{
    db::CorpusRepository,
    error::{AppError, AppResult},
    models::{EmbeddingRecord, SimilarityResult, MAX_CONTENT_TYPE_LEN, OVERVIEW_CONTENT},
    services::embedder::Embedder,
};

/// Limit applied when a search request does not carry one
pub const DEFAULT_SEARCH_LIMIT: i64 = 10;

/// Largest limit a search request may ask for
pub const MAX_SEARCH_LIMIT: i64 = 100;

/// Owns the vector column: writes embeddings and ranks them against queries
#[derive(Clone)]
pub struct EmbeddingStore {
    repo: Arc<dyn CorpusRepository>,
    embedder: Embedder,
}

impl EmbeddingStore {
    pub fn new(repo: Arc<dyn CorpusRepository>, embedder: Embedder) -> Self {
        Self { repo, embedder }
    }

    pub fn repository(&self) -> &Arc<dyn CorpusRepository> {
        &self.repo
    }

    /// Embeds and stores text for a (movie, content-type) pair
    ///
    /// Without `text` the movie's overview is embedded. The existing record,
    /// if any, is overwritten in the same transaction that looks it up.
    #[instrument(skip(self, text))]
    pub async fn upsert(
        &self,
        movie_id: i64,
        content_type: &str,
        text: Option<&str>,
    ) -> AppResult<EmbeddingRecord> {
        let content_type = content_type.trim();
        if content_type.is_empty() || content_type.chars().count() > MAX_CONTENT_TYPE_LEN {
            return Err(AppError::InvalidInput(format!(
                "content type must be 1 to {} characters",
                MAX_CONTENT_TYPE_LEN
            )));
        }

        let movie = self
            .repo
            .get_movie(movie_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("movie {}", movie_id)))?;

        let content = match text {
            Some(text) => text.trim().to_string(),
            None => movie.describable_text().unwrap_or_default().to_string(),
        };

        if content.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "movie {} has no text to embed",
                movie_id
            )));
        }

        let embedding = self.embedder.embed(&content).await;
        if embedding.is_fallback() {
            tracing::warn!(movie_id, content_type, "Storing fallback vector");
        }

        match self
            .repo
            .upsert_embedding(movie_id, content_type, &content, embedding.into_vector())
            .await
        {
            Ok(record) => {
                tracing::debug!(movie_id, content_type, record_id = record.id, "Embedding stored");
                Ok(record)
            }
            Err(e) => {
                tracing::error!(movie_id, content_type, error = %e, "Failed to store embedding");
                Err(e)
            }
        }
    }

    /// Ranks stored overview embeddings against `query`
    ///
    /// Invalid input is an error. Anything that goes wrong while ranking is
    /// logged and yields an empty list.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, limit: i64) -> AppResult<Vec<SimilarityResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::InvalidInput(
                "Search query cannot be empty".to_string(),
            ));
        }
        if !(1..=MAX_SEARCH_LIMIT).contains(&limit) {
            return Err(AppError::InvalidInput(format!(
                "limit must be between 1 and {}",
                MAX_SEARCH_LIMIT
            )));
        }

        let embedding = self.embedder.embed(query).await;

        match self
            .repo
            .nearest_by_cosine(embedding.vector(), OVERVIEW_CONTENT, limit)
            .await
        {
            Ok(results) => {
                tracing::info!(
                    results = results.len(),
                    fallback_query = embedding.is_fallback(),
                    "Semantic search completed"
                );
                Ok(results)
            }
            Err(e) => {
                tracing::error!(error = %e, "Similarity ranking failed, returning no results");
                Ok(Vec::new())
            }
        }
    }
}
