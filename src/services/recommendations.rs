use std::{fmt::Write as _, sync::Arc, time::Duration};

use tracing::instrument;

use crate::{
    error::AppResult,
    models::{
        ChatTurn, MovieCandidate, MovieRecommendation, RecommendationPayload, SimilarityResult,
        ThrillerPick,
    },
    services::{
        catalog::{self, CatalogClient},
        embedding_store::EmbeddingStore,
        generation::{parse_structured_response, Generator},
    },
};

/// Companion thrillers attached to each recommendation
const THRILLERS_PER_MOVIE: usize = 3;

/// Retrieval-augmented recommendation pipeline
///
/// Retrieves movies similar to the user's message, grounds the generation
/// call with them and enriches the generated picks from the catalog.
#[derive(Clone)]
pub struct RecommendationEngine {
    store: EmbeddingStore,
    generator: Arc<dyn Generator>,
    catalog: Arc<dyn CatalogClient>,
    top_k: i64,
    retrieval_timeout: Duration,
    enrichment_timeout: Duration,
}

impl RecommendationEngine {
    pub fn new(
        store: EmbeddingStore,
        generator: Arc<dyn Generator>,
        catalog: Arc<dyn CatalogClient>,
    ) -> Self {
        Self {
            store,
            generator,
            catalog,
            top_k: 5,
            retrieval_timeout: Duration::from_secs(10),
            enrichment_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_top_k(mut self, top_k: i64) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_timeouts(mut self, retrieval: Duration, enrichment: Duration) -> Self {
        self.retrieval_timeout = retrieval;
        self.enrichment_timeout = enrichment;
        self
    }

    /// Produces the assistant's reply to `utterance`
    ///
    /// `history` holds the earlier turns of the conversation, oldest first.
    /// Only a generation failure is an error; retrieval and enrichment
    /// problems reduce the reply to what could be produced.
    #[instrument(skip(self, utterance, history), fields(history = history.len()))]
    pub async fn recommend(
        &self,
        utterance: &str,
        history: &[ChatTurn],
    ) -> AppResult<RecommendationPayload> {
        let grounding = self.retrieve(utterance).await;

        let mut turns = Vec::with_capacity(history.len() + 2);
        if !grounding.is_empty() {
            turns.push(ChatTurn::system(build_grounding_context(&grounding)));
        }
        turns.extend_from_slice(history);
        turns.push(ChatTurn::user(utterance));

        let raw = self.generator.generate(&turns).await?;
        let reply = parse_structured_response(&raw);

        tracing::info!(
            grounding = grounding.len(),
            candidates = reply.movies.len(),
            "Generated recommendation reply"
        );

        let movies = self.enrich_all(reply.movies).await;

        Ok(RecommendationPayload {
            message: reply.message,
            movies,
        })
    }

    /// Top-K similar movies, empty on any failure or timeout
    async fn retrieve(&self, utterance: &str) -> Vec<SimilarityResult> {
        match tokio::time::timeout(self.retrieval_timeout, self.store.search(utterance, self.top_k))
            .await
        {
            Ok(Ok(results)) => results,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Retrieval failed, generating without grounding");
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.retrieval_timeout.as_secs_f64(),
                    "Retrieval timed out, generating without grounding"
                );
                Vec::new()
            }
        }
    }

    /// Enriches candidates concurrently, preserving their order
    async fn enrich_all(&self, candidates: Vec<MovieCandidate>) -> Vec<MovieRecommendation> {
        let mut tasks = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let catalog = self.catalog.clone();
            let timeout = self.enrichment_timeout;
            let fallback = candidate.clone();
            let task = tokio::spawn(async move {
                enrich_with_timeout(catalog.as_ref(), candidate, timeout).await
            });
            tasks.push((task, fallback));
        }

        let mut movies = Vec::with_capacity(tasks.len());
        for (task, fallback) in tasks {
            match task.await {
                Ok(movie) => movies.push(movie),
                Err(e) => {
                    tracing::error!(error = %e, movie_id = fallback.id, "Enrichment task join error");
                    movies.push(MovieRecommendation::from(fallback));
                }
            }
        }

        movies
    }
}

async fn enrich_with_timeout(
    catalog: &dyn CatalogClient,
    candidate: MovieCandidate,
    timeout: Duration,
) -> MovieRecommendation {
    if !candidate.is_resolvable() {
        return candidate.into();
    }

    let movie_id = candidate.id;
    match tokio::time::timeout(timeout, enrich_candidate(catalog, candidate.clone())).await {
        Ok(movie) => movie,
        Err(_) => {
            tracing::warn!(movie_id, "Enrichment timed out, using generated data");
            candidate.into()
        }
    }
}

/// Adds catalog details, thriller picks and a trailer to a candidate
///
/// Without details the candidate is returned as generated. Thrillers and
/// the trailer are looked up concurrently and degrade on their own.
pub async fn enrich_candidate(
    catalog: &dyn CatalogClient,
    candidate: MovieCandidate,
) -> MovieRecommendation {
    let movie_id = candidate.id;

    let details = match catalog.movie_details(movie_id).await {
        Ok(details) => details,
        Err(e) => {
            tracing::warn!(movie_id, error = %e, "Movie details unavailable, using generated data");
            return candidate.into();
        }
    };

    let (thrillers, trailer_key) = tokio::join!(
        catalog::thriller_picks(catalog, Some(movie_id), THRILLERS_PER_MOVIE),
        catalog::trailer_key(catalog, movie_id),
    );

    let thrillers = if thrillers.is_empty() {
        candidate.thrillers
    } else {
        thrillers.iter().map(ThrillerPick::from).collect()
    };

    MovieRecommendation {
        id: details.id,
        title: details.title,
        reason: candidate.reason,
        poster_path: details.poster_path,
        vote_average: details.vote_average,
        release_date: details.release_date.filter(|d| !d.trim().is_empty()),
        overview: details.overview,
        thrillers,
        trailer_key,
    }
}

/// Renders retrieved movies as a context block for the generation model
pub fn build_grounding_context(results: &[SimilarityResult]) -> String {
    let mut context = String::from(
        "Movies from the catalog that match the user's request. \
         Prefer these and use their ids when you recommend them:\n",
    );

    for (rank, result) in results.iter().enumerate() {
        let year = result
            .release_date
            .map(|d| d.format("%Y").to_string())
            .unwrap_or_else(|| "unknown year".to_string());
        let rating = result
            .vote_average
            .map(|r| format!("{:.1}/10", r))
            .unwrap_or_else(|| "unrated".to_string());
        let overview = result
            .overview
            .as_deref()
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .unwrap_or("No overview available.");

        let _ = writeln!(
            context,
            "{}. {} (id: {}, {}, rating {}, similarity {:.3})\n   {}",
            rank + 1,
            result.title,
            result.movie_id,
            year,
            rating,
            result.similarity,
            overview
        );
    }

    context
}
