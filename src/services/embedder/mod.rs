//! Text to vector conversion with an explicit degrade path.
//!
//! The [`Embedder`] never fails: a provider error, an empty input or a vector
//! of the wrong length all yield [`Embedding::Fallback`], a zero vector that
//! scores 0.0 against everything.

use std::sync::Arc;

use crate::{error::AppResult, models::EMBEDDING_DIMENSION};

pub mod gemini;

pub use gemini::GeminiEmbeddingProvider;

/// Remote model that turns text into a dense vector
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_text(&self, text: &str) -> AppResult<Vec<f32>>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// Outcome of an embedding call
#[derive(Debug, Clone, PartialEq)]
pub enum Embedding {
    Generated(Vec<f32>),
    /// Zero vector used when no real embedding could be produced
    Fallback(Vec<f32>),
}

impl Embedding {
    pub fn fallback() -> Self {
        Embedding::Fallback(vec![0.0; EMBEDDING_DIMENSION])
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Embedding::Fallback(_))
    }

    pub fn vector(&self) -> &[f32] {
        match self {
            Embedding::Generated(v) | Embedding::Fallback(v) => v,
        }
    }

    pub fn into_vector(self) -> Vec<f32> {
        match self {
            Embedding::Generated(v) | Embedding::Fallback(v) => v,
        }
    }
}

/// Truncates to at most `max_chars` characters, never splitting a code point
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    max_chars: usize,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, max_chars: usize) -> Self {
        Self {
            provider,
            max_chars,
        }
    }

    /// Embeds `text`, falling back to the zero vector on any failure
    pub async fn embed(&self, text: &str) -> Embedding {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            tracing::warn!("Refusing to embed empty text, using fallback vector");
            return Embedding::fallback();
        }

        let input = truncate_chars(trimmed, self.max_chars);
        if input.len() < trimmed.len() {
            tracing::debug!(
                max_chars = self.max_chars,
                original_bytes = trimmed.len(),
                "Truncated embedding input"
            );
        }

        match self.provider.embed_text(input).await {
            Ok(vector) if vector.len() == EMBEDDING_DIMENSION => Embedding::Generated(vector),
            Ok(vector) => {
                tracing::error!(
                    provider = self.provider.name(),
                    expected = EMBEDDING_DIMENSION,
                    actual = vector.len(),
                    "Embedding provider returned a vector of the wrong dimension"
                );
                Embedding::fallback()
            }
            Err(e) => {
                tracing::error!(
                    provider = self.provider.name(),
                    error = %e,
                    "Embedding provider call failed, using fallback vector"
                );
                Embedding::fallback()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use mockall::predicate::eq;

    fn embedder(mock: MockEmbeddingProvider, max_chars: usize) -> Embedder {
        Embedder::new(Arc::new(mock), max_chars)
    }

    #[test]
    fn test_truncate_chars_respects_code_points() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("日本語テキスト", 3), "日本語");
        assert_eq!(truncate_chars("short", 100), "short");
        assert_eq!(truncate_chars("", 5), "");
    }

    #[tokio::test]
    async fn test_embed_returns_generated_vector() {
        let mut mock = MockEmbeddingProvider::new();
        mock.expect_name().return_const("mock");
        mock.expect_embed_text()
            .with(eq("space survival"))
            .times(1)
            .returning(|_| Ok(vec![0.5; EMBEDDING_DIMENSION]));

        let embedding = embedder(mock, 8000).embed("  space survival  ").await;

        assert!(!embedding.is_fallback());
        assert_eq!(embedding.vector().len(), EMBEDDING_DIMENSION);
    }

    #[tokio::test]
    async fn test_empty_text_skips_provider() {
        let mut mock = MockEmbeddingProvider::new();
        mock.expect_name().return_const("mock");
        mock.expect_embed_text().never();

        let embedding = embedder(mock, 8000).embed("   \n ").await;

        assert!(embedding.is_fallback());
        assert!(embedding.vector().iter().all(|v| *v == 0.0));
        assert_eq!(embedding.vector().len(), EMBEDDING_DIMENSION);
    }

    #[tokio::test]
    async fn test_provider_failure_yields_zero_vector() {
        let mut mock = MockEmbeddingProvider::new();
        mock.expect_name().return_const("mock");
        mock.expect_embed_text()
            .returning(|_| Err(AppError::ExternalApi("quota exceeded".to_string())));

        let embedding = embedder(mock, 8000).embed("heist thriller").await;

        assert_eq!(embedding, Embedding::fallback());
    }

    #[tokio::test]
    async fn test_wrong_dimension_is_rejected() {
        let mut mock = MockEmbeddingProvider::new();
        mock.expect_name().return_const("mock");
        mock.expect_embed_text().returning(|_| Ok(vec![1.0; 3]));

        let embedding = embedder(mock, 8000).embed("noir").await;

        assert!(embedding.is_fallback());
        assert_eq!(embedding.into_vector().len(), EMBEDDING_DIMENSION);
    }

    #[tokio::test]
    async fn test_input_truncated_before_provider_call() {
        let mut mock = MockEmbeddingProvider::new();
        mock.expect_name().return_const("mock");
        mock.expect_embed_text()
            .with(eq("abcd"))
            .times(1)
            .returning(|_| Ok(vec![0.1; EMBEDDING_DIMENSION]));

        let embedding = embedder(mock, 4).embed("abcdefgh").await;
        assert!(!embedding.is_fallback());
    }
}
