//! Storage seams for the retrieval core and the chat collaborator.

use crate::{
    error::AppResult,
    models::{ChatRole, Conversation, EmbeddingRecord, Movie, SimilarityResult, StoredMessage},
};

/// Movies and their embeddings
#[async_trait::async_trait]
pub trait CorpusRepository: Send + Sync {
    /// Inserts a movie unless its id is already stored
    ///
    /// Returns `false` for a duplicate id; existing rows are never overwritten.
    async fn insert_movie(&self, movie: &Movie) -> AppResult<bool>;

    async fn get_movie(&self, movie_id: i64) -> AppResult<Option<Movie>>;

    /// Movies in ascending id order, starting after `after_id`
    async fn list_movies(&self, after_id: Option<i64>, limit: i64) -> AppResult<Vec<Movie>>;

    async fn count_movies(&self) -> AppResult<i64>;

    async fn find_embedding(
        &self,
        movie_id: i64,
        content_type: &str,
    ) -> AppResult<Option<EmbeddingRecord>>;

    /// Writes the (movie, content-type) record in one transaction
    ///
    /// Fails with `Conflict` when a concurrent writer inserted the same key
    /// first and with `NotFound` when the movie does not exist.
    async fn upsert_embedding(
        &self,
        movie_id: i64,
        content_type: &str,
        content: &str,
        embedding: Vec<f32>,
    ) -> AppResult<EmbeddingRecord>;

    async fn count_embeddings(&self) -> AppResult<i64>;

    /// Exact nearest neighbours by cosine distance, ties in storage order
    async fn nearest_by_cosine(
        &self,
        query: &[f32],
        content_type: &str,
        limit: i64,
    ) -> AppResult<Vec<SimilarityResult>>;
}

/// Conversation history
#[async_trait::async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn create_conversation(&self, user_id: &str) -> AppResult<Conversation>;

    async fn get_conversation(&self, conversation_id: i64) -> AppResult<Option<Conversation>>;

    /// Messages oldest first
    async fn list_messages(&self, conversation_id: i64) -> AppResult<Vec<StoredMessage>>;

    /// Appends a message and bumps the conversation's last activity
    async fn append_message(
        &self,
        conversation_id: i64,
        role: ChatRole,
        content: &str,
    ) -> AppResult<StoredMessage>;
}
