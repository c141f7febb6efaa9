//! In-process repositories used by tests and local runs without Postgres.
//!
//! Ranking is the same exact cosine ordering the Postgres query performs,
//! with ties kept in insertion order.

use std::collections::BTreeMap;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    db::repository::{ConversationRepository, CorpusRepository},
    error::{AppError, AppResult},
    models::{
        cosine_similarity, ChatRole, Conversation, EmbeddingRecord, Movie, SimilarityResult,
        StoredMessage,
    },
};

#[derive(Default)]
struct CorpusState {
    movies: BTreeMap<i64, Movie>,
    /// Kept in insertion order, which doubles as storage order for ties
    embeddings: Vec<EmbeddingRecord>,
    next_embedding_id: i64,
}

/// Movie and embedding storage held in memory
#[derive(Default)]
pub struct MemoryCorpusRepository {
    state: RwLock<CorpusState>,
}

impl MemoryCorpusRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CorpusRepository for MemoryCorpusRepository {
    async fn insert_movie(&self, movie: &Movie) -> AppResult<bool> {
        let mut state = self.state.write().await;
        if state.movies.contains_key(&movie.id) {
            return Ok(false);
        }
        state.movies.insert(movie.id, movie.clone());
        Ok(true)
    }

    async fn get_movie(&self, movie_id: i64) -> AppResult<Option<Movie>> {
        Ok(self.state.read().await.movies.get(&movie_id).cloned())
    }

    async fn list_movies(&self, after_id: Option<i64>, limit: i64) -> AppResult<Vec<Movie>> {
        let state = self.state.read().await;
        let take = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        let movies = match after_id {
            Some(after) => state
                .movies
                .range((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded))
                .map(|(_, movie)| movie.clone())
                .take(take)
                .collect(),
            None => state.movies.values().take(take).cloned().collect(),
        };
        Ok(movies)
    }

    async fn count_movies(&self) -> AppResult<i64> {
        Ok(self.state.read().await.movies.len() as i64)
    }

    async fn find_embedding(
        &self,
        movie_id: i64,
        content_type: &str,
    ) -> AppResult<Option<EmbeddingRecord>> {
        let state = self.state.read().await;
        Ok(state
            .embeddings
            .iter()
            .find(|r| r.movie_id == movie_id && r.content_type == content_type)
            .cloned())
    }

    async fn upsert_embedding(
        &self,
        movie_id: i64,
        content_type: &str,
        content: &str,
        embedding: Vec<f32>,
    ) -> AppResult<EmbeddingRecord> {
        let mut state = self.state.write().await;

        if !state.movies.contains_key(&movie_id) {
            return Err(AppError::NotFound(format!("movie {}", movie_id)));
        }

        let now = Utc::now();
        if let Some(existing) = state
            .embeddings
            .iter_mut()
            .find(|r| r.movie_id == movie_id && r.content_type == content_type)
        {
            existing.content = content.to_string();
            existing.embedding = embedding;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        state.next_embedding_id += 1;
        let record = EmbeddingRecord {
            id: state.next_embedding_id,
            movie_id,
            content_type: content_type.to_string(),
            content: content.to_string(),
            embedding,
            created_at: now,
            updated_at: now,
        };
        state.embeddings.push(record.clone());
        Ok(record)
    }

    async fn count_embeddings(&self) -> AppResult<i64> {
        Ok(self.state.read().await.embeddings.len() as i64)
    }

    async fn nearest_by_cosine(
        &self,
        query: &[f32],
        content_type: &str,
        limit: i64,
    ) -> AppResult<Vec<SimilarityResult>> {
        let state = self.state.read().await;

        let mut scored = Vec::new();
        for record in state
            .embeddings
            .iter()
            .filter(|r| r.content_type == content_type)
        {
            let similarity = cosine_similarity(query, &record.embedding).ok_or_else(|| {
                AppError::Internal(format!(
                    "embedding {} has dimension {}, query has {}",
                    record.id,
                    record.embedding.len(),
                    query.len()
                ))
            })?;
            let Some(movie) = state.movies.get(&record.movie_id) else {
                continue;
            };
            scored.push(SimilarityResult {
                movie_id: movie.id,
                title: movie.title.clone(),
                overview: movie.overview.clone(),
                release_date: movie.release_date,
                vote_average: movie.vote_average,
                poster_path: movie.poster_path.clone(),
                similarity,
            });
        }

        // sort_by is stable, so equal scores keep storage order
        scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        scored.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(scored)
    }
}

#[derive(Default)]
struct ConversationState {
    conversations: BTreeMap<i64, Conversation>,
    messages: Vec<StoredMessage>,
    next_conversation_id: i64,
    next_message_id: i64,
}

/// Conversation storage held in memory
#[derive(Default)]
pub struct MemoryConversationRepository {
    state: RwLock<ConversationState>,
}

impl MemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ConversationRepository for MemoryConversationRepository {
    async fn create_conversation(&self, user_id: &str) -> AppResult<Conversation> {
        let mut state = self.state.write().await;
        state.next_conversation_id += 1;
        let now = Utc::now();
        let conversation = Conversation {
            id: state.next_conversation_id,
            user_id: user_id.to_string(),
            started_at: now,
            last_message_at: now,
        };
        state
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn get_conversation(&self, conversation_id: i64) -> AppResult<Option<Conversation>> {
        Ok(self
            .state
            .read()
            .await
            .conversations
            .get(&conversation_id)
            .cloned())
    }

    async fn list_messages(&self, conversation_id: i64) -> AppResult<Vec<StoredMessage>> {
        let state = self.state.read().await;
        Ok(state
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn append_message(
        &self,
        conversation_id: i64,
        role: ChatRole,
        content: &str,
    ) -> AppResult<StoredMessage> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        let Some(conversation) = state.conversations.get_mut(&conversation_id) else {
            return Err(AppError::NotFound(format!(
                "conversation {}",
                conversation_id
            )));
        };
        conversation.last_message_at = now;

        state.next_message_id += 1;
        let message = StoredMessage {
            id: state.next_message_id,
            conversation_id,
            role,
            content: content.to_string(),
            created_at: now,
        };
        state.messages.push(message.clone());
        Ok(message)
    }
}
