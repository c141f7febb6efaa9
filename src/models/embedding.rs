use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Dimension of every vector produced by the embedding model
pub const EMBEDDING_DIMENSION: usize = 768;

/// Content-type label for embeddings of a movie's overview
pub const OVERVIEW_CONTENT: &str = "overview";

/// Longest content-type label the store accepts
pub const MAX_CONTENT_TYPE_LEN: usize = 50;

/// One stored vector for a (movie, content-type) pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingRecord {
    pub id: i64,
    pub movie_id: i64,
    pub content_type: String,
    /// Exact text that was embedded
    pub content: String,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Embedding record without the vector, returned over HTTP
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingSummary {
    pub id: i64,
    pub movie_id: i64,
    pub content_type: String,
    pub content: String,
    pub dimension: usize,
    pub updated_at: DateTime<Utc>,
}

impl From<&EmbeddingRecord> for EmbeddingSummary {
    fn from(record: &EmbeddingRecord) -> Self {
        Self {
            id: record.id,
            movie_id: record.movie_id,
            content_type: record.content_type.clone(),
            content: record.content.clone(),
            dimension: record.embedding.len(),
            updated_at: record.updated_at,
        }
    }
}

/// A movie ranked by semantic closeness to a query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityResult {
    pub movie_id: i64,
    pub title: String,
    pub overview: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub vote_average: Option<f64>,
    pub poster_path: Option<String>,
    /// `1 - cosine_distance`
    pub similarity: f64,
}

/// Cosine similarity of two equal-length vectors
///
/// Returns 0.0 when either vector has zero norm, so fallback vectors rank
/// below anything with a real signal. Returns `None` on a length mismatch.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(0.0);
    }

    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}
