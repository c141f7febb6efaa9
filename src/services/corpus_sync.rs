//! Batch jobs that fill the corpus: catalog import and embedding sync.
//!
//! Both jobs run sequentially, log progress with `tracing`, and stop between
//! items once the shutdown channel flips to `true`.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::{
    db::CorpusRepository,
    error::{AppError, AppResult},
    models::{Movie, OVERVIEW_CONTENT},
    services::{catalog::CatalogClient, embedding_store::EmbeddingStore},
};

/// Pages between import progress log lines
const IMPORT_PROGRESS_EVERY: u32 = 5;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Movies read per page
    pub batch_size: i64,
    /// Pause after each embedding call
    pub delay: Duration,
    /// Items between progress log lines
    pub progress_every: u64,
    /// Pause between catalog pages during import
    pub import_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            delay: Duration::from_millis(25),
            progress_every: 10,
            import_delay: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub processed: u64,
    pub created: u64,
    pub skipped: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Catalog entries received
    pub fetched: u64,
    /// New movies written
    pub stored: u64,
    /// Entries whose id was already stored
    pub duplicates: u64,
    /// Failed pages and failed inserts
    pub errors: u64,
}

enum ItemOutcome {
    Created,
    Skipped,
    Failed,
}

pub struct CorpusSync {
    repo: Arc<dyn CorpusRepository>,
    store: EmbeddingStore,
    config: SyncConfig,
    progress: watch::Sender<SyncReport>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl CorpusSync {
    pub fn new(store: EmbeddingStore, config: SyncConfig) -> Self {
        let (progress, _) = watch::channel(SyncReport::default());
        Self {
            repo: store.repository().clone(),
            store,
            config,
            progress,
            shutdown: None,
        }
    }

    /// Stops the job between items once the receiver reads `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn repository(&self) -> &Arc<dyn CorpusRepository> {
        &self.repo
    }

    /// Running report of the current or last sync
    pub fn subscribe(&self) -> watch::Receiver<SyncReport> {
        self.progress.subscribe()
    }

    fn interrupted(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Ensures every movie with an overview has an overview embedding
    ///
    /// Idempotent: movies that already have one are skipped, so an
    /// interrupted run can simply be started again. Failing to list movies
    /// aborts the job; failures on single movies are counted and skipped.
    pub async fn sync_all(&self) -> AppResult<SyncReport> {
        let total = self.repo.count_movies().await?;
        let started = Instant::now();
        let mut report = SyncReport::default();
        let mut after_id = None;

        info!(total, batch_size = self.config.batch_size, "Starting embedding sync");

        'pages: loop {
            let movies = self
                .repo
                .list_movies(after_id, self.config.batch_size)
                .await?;
            let Some(last) = movies.last() else {
                break;
            };
            after_id = Some(last.id);

            for movie in &movies {
                if self.interrupted() {
                    warn!(?report, "Embedding sync interrupted");
                    break 'pages;
                }

                match self.sync_movie(movie).await {
                    ItemOutcome::Created => report.created += 1,
                    ItemOutcome::Skipped => report.skipped += 1,
                    ItemOutcome::Failed => report.failed += 1,
                }
                report.processed += 1;
                self.progress.send_replace(report);

                if self.config.progress_every > 0
                    && report.processed % self.config.progress_every == 0
                {
                    log_progress(&report, total, started.elapsed());
                }
            }
        }

        info!(
            processed = report.processed,
            created = report.created,
            skipped = report.skipped,
            failed = report.failed,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Embedding sync finished"
        );

        Ok(report)
    }

    async fn sync_movie(&self, movie: &Movie) -> ItemOutcome {
        let Some(text) = movie.describable_text() else {
            return ItemOutcome::Skipped;
        };

        match self.repo.find_embedding(movie.id, OVERVIEW_CONTENT).await {
            Ok(Some(_)) => return ItemOutcome::Skipped,
            Ok(None) => {}
            Err(e) => {
                error!(movie_id = movie.id, error = %e, "Failed to check existing embedding");
                return ItemOutcome::Failed;
            }
        }

        let result = self.store.upsert(movie.id, OVERVIEW_CONTENT, Some(text)).await;
        tokio::time::sleep(self.config.delay).await;

        match result {
            Ok(_) => ItemOutcome::Created,
            Err(AppError::Conflict(_)) => {
                info!(movie_id = movie.id, "Embedding written by another worker, skipping");
                ItemOutcome::Skipped
            }
            Err(e) => {
                error!(movie_id = movie.id, title = %movie.title, error = %e, "Failed to embed movie");
                ItemOutcome::Failed
            }
        }
    }

    /// Imports popular catalog movies, pages `1..=pages`
    ///
    /// Movies are deduplicated by id only. A failed page is counted and the
    /// import moves on to the next one.
    pub async fn import_catalog(
        &self,
        catalog: &dyn CatalogClient,
        pages: u32,
    ) -> AppResult<ImportReport> {
        let mut report = ImportReport::default();
        info!(pages, "Starting catalog import");

        for page in 1..=pages {
            if self.interrupted() {
                warn!(page, ?report, "Catalog import interrupted");
                break;
            }

            match catalog.popular_movies(page).await {
                Ok(listing) => {
                    for entry in listing.results {
                        report.fetched += 1;
                        let movie = Movie::from(entry);
                        match self.repo.insert_movie(&movie).await {
                            Ok(true) => report.stored += 1,
                            Ok(false) => report.duplicates += 1,
                            Err(e) => {
                                report.errors += 1;
                                error!(movie_id = movie.id, error = %e, "Failed to store movie");
                            }
                        }
                    }

                    if listing.total_pages.is_some_and(|total| page >= total) {
                        info!(page, "Reached last catalog page");
                        break;
                    }
                }
                Err(e) => {
                    report.errors += 1;
                    error!(page, error = %e, "Failed to fetch catalog page");
                }
            }

            if page % IMPORT_PROGRESS_EVERY == 0 {
                info!(
                    page,
                    pages,
                    stored = report.stored,
                    duplicates = report.duplicates,
                    "Catalog import progress"
                );
            }

            if page < pages {
                tokio::time::sleep(self.config.import_delay).await;
            }
        }

        info!(
            fetched = report.fetched,
            stored = report.stored,
            duplicates = report.duplicates,
            errors = report.errors,
            "Catalog import finished"
        );

        Ok(report)
    }
}

fn log_progress(report: &SyncReport, total: i64, elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        report.processed as f64 / secs
    } else {
        0.0
    };
    let remaining = (total as f64 - report.processed as f64).max(0.0);
    let eta_secs = if rate > 0.0 { remaining / rate } else { 0.0 };

    info!(
        processed = report.processed,
        total,
        created = report.created,
        skipped = report.skipped,
        failed = report.failed,
        per_sec = (rate * 10.0).round() / 10.0,
        eta_secs = eta_secs.round() as u64,
        "Embedding sync progress"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::MemoryCorpusRepository,
        models::{EmbeddingRecord, SimilarityResult, TmdbMovie, TmdbPage, EMBEDDING_DIMENSION},
        services::{
            catalog::MockCatalogClient,
            embedder::{Embedder, MockEmbeddingProvider},
        },
    };
    use tokio_test::assert_ok;

    fn fast_config() -> SyncConfig {
        SyncConfig {
            batch_size: 2,
            delay: Duration::ZERO,
            progress_every: 1,
            import_delay: Duration::ZERO,
        }
    }

    fn provider(calls: usize) -> MockEmbeddingProvider {
        let mut mock = MockEmbeddingProvider::new();
        mock.expect_name().return_const("mock");
        mock.expect_embed_text()
            .times(calls)
            .returning(|_| Ok(vec![0.25; EMBEDDING_DIMENSION]));
        mock
    }

    async fn seeded_repo() -> Arc<MemoryCorpusRepository> {
        let repo = Arc::new(MemoryCorpusRepository::new());
        repo.insert_movie(&Movie::new(1, "Apollo 13").with_overview("Astronauts stranded in space"))
            .await
            .unwrap();
        repo.insert_movie(&Movie::new(2, "Untitled")).await.unwrap();
        repo.insert_movie(&Movie::new(3, "Heat").with_overview("A crew of thieves in LA"))
            .await
            .unwrap();
        repo
    }

    fn sync_for(repo: Arc<MemoryCorpusRepository>, provider: MockEmbeddingProvider) -> CorpusSync {
        let store = EmbeddingStore::new(repo, Embedder::new(Arc::new(provider), 8000));
        CorpusSync::new(store, fast_config())
    }

    #[tokio::test]
    async fn test_sync_counts_and_skips_missing_overview() {
        let repo = seeded_repo().await;
        let sync = sync_for(repo.clone(), provider(2));

        let report = assert_ok!(sync.sync_all().await);

        assert_eq!(
            report,
            SyncReport {
                processed: 3,
                created: 2,
                skipped: 1,
                failed: 0
            }
        );
        assert_eq!(repo.count_embeddings().await.unwrap(), 2);
        assert!(repo.find_embedding(2, OVERVIEW_CONTENT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_sync_creates_nothing() {
        let repo = seeded_repo().await;
        sync_for(repo.clone(), provider(2)).sync_all().await.unwrap();

        let report = sync_for(repo.clone(), provider(0)).sync_all().await.unwrap();

        assert_eq!(report.processed, 3);
        assert_eq!(report.created, 0);
        assert_eq!(report.skipped, 3);
        assert_eq!(repo.count_embeddings().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_sync_publishes_progress() {
        let repo = seeded_repo().await;
        let sync = sync_for(repo, provider(2));
        let progress = sync.subscribe();

        sync.sync_all().await.unwrap();

        assert_eq!(progress.borrow().processed, 3);
        assert_eq!(progress.borrow().created, 2);
    }

    #[tokio::test]
    async fn test_sync_stops_on_shutdown() {
        let repo = seeded_repo().await;
        let (tx, rx) = watch::channel(true);
        let sync = sync_for(repo.clone(), provider(0)).with_shutdown(rx);

        let report = sync.sync_all().await.unwrap();

        assert_eq!(report, SyncReport::default());
        assert_eq!(repo.count_embeddings().await.unwrap(), 0);
        drop(tx);
    }

    #[tokio::test]
    async fn test_sync_on_empty_corpus() {
        let repo = Arc::new(MemoryCorpusRepository::new());
        let report = sync_for(repo, provider(0)).sync_all().await.unwrap();
        assert_eq!(report, SyncReport::default());
    }

    fn page(page: u32, ids: &[i64], total_pages: u32) -> TmdbPage {
        TmdbPage {
            page,
            results: ids
                .iter()
                .map(|id| {
                    serde_json::from_value::<TmdbMovie>(serde_json::json!({
                        "id": id,
                        "title": format!("movie {}", id),
                        "release_date": "2001-02-03",
                    }))
                    .unwrap()
                })
                .collect(),
            total_pages: Some(total_pages),
        }
    }

    #[tokio::test]
    async fn test_import_dedupes_by_id_and_survives_failed_page() {
        let repo = Arc::new(MemoryCorpusRepository::new());
        repo.insert_movie(&Movie::new(2, "Already here")).await.unwrap();

        let mut catalog = MockCatalogClient::new();
        catalog.expect_popular_movies().returning(|p| match p {
            1 => Ok(page(1, &[1, 2], 10)),
            2 => Err(AppError::ExternalApi("502".to_string())),
            _ => Ok(page(p, &[3, 1], 10)),
        });

        let sync = sync_for(repo.clone(), provider(0));
        let report = sync.import_catalog(&catalog, 3).await.unwrap();

        assert_eq!(
            report,
            ImportReport {
                fetched: 4,
                stored: 2,
                duplicates: 2,
                errors: 1
            }
        );
        assert_eq!(repo.count_movies().await.unwrap(), 3);
        assert_eq!(repo.get_movie(2).await.unwrap().unwrap().title, "Already here");
        assert_eq!(
            repo.get_movie(3).await.unwrap().unwrap().release_year(),
            Some(2001)
        );
    }

    #[tokio::test]
    async fn test_import_stops_at_last_catalog_page() {
        let repo = Arc::new(MemoryCorpusRepository::new());
        let mut catalog = MockCatalogClient::new();
        catalog
            .expect_popular_movies()
            .times(1)
            .returning(|_| Ok(page(1, &[7], 1)));

        let report = sync_for(repo, provider(0))
            .import_catalog(&catalog, 5)
            .await
            .unwrap();
        assert_eq!(report.stored, 1);
    }

    /// Memory repository whose embedding writes fail for chosen movies
    struct FlakyRepository {
        inner: MemoryCorpusRepository,
        fails: i64,
        conflicts: i64,
    }

    #[async_trait::async_trait]
    impl CorpusRepository for FlakyRepository {
        async fn insert_movie(&self, movie: &Movie) -> AppResult<bool> {
            self.inner.insert_movie(movie).await
        }

        async fn get_movie(&self, movie_id: i64) -> AppResult<Option<Movie>> {
            self.inner.get_movie(movie_id).await
        }

        async fn list_movies(&self, after_id: Option<i64>, limit: i64) -> AppResult<Vec<Movie>> {
            self.inner.list_movies(after_id, limit).await
        }

        async fn count_movies(&self) -> AppResult<i64> {
            self.inner.count_movies().await
        }

        async fn find_embedding(
            &self,
            movie_id: i64,
            content_type: &str,
        ) -> AppResult<Option<EmbeddingRecord>> {
            self.inner.find_embedding(movie_id, content_type).await
        }

        async fn upsert_embedding(
            &self,
            movie_id: i64,
            content_type: &str,
            content: &str,
            embedding: Vec<f32>,
        ) -> AppResult<EmbeddingRecord> {
            if movie_id == self.fails {
                return Err(AppError::Internal("disk full".to_string()));
            }
            if movie_id == self.conflicts {
                return Err(AppError::Conflict(format!("embedding for movie {}", movie_id)));
            }
            self.inner
                .upsert_embedding(movie_id, content_type, content, embedding)
                .await
        }

        async fn count_embeddings(&self) -> AppResult<i64> {
            self.inner.count_embeddings().await
        }

        async fn nearest_by_cosine(
            &self,
            query: &[f32],
            content_type: &str,
            limit: i64,
        ) -> AppResult<Vec<SimilarityResult>> {
            self.inner.nearest_by_cosine(query, content_type, limit).await
        }
    }

    #[tokio::test]
    async fn test_sync_counts_failures_and_conflicts_and_continues() {
        let inner = MemoryCorpusRepository::new();
        for (id, title) in [(1, "Apollo 13"), (2, "Heat"), (3, "Alien")] {
            inner
                .insert_movie(&Movie::new(id, title).with_overview("A tense story"))
                .await
                .unwrap();
        }
        let repo = Arc::new(FlakyRepository {
            inner,
            fails: 1,
            conflicts: 2,
        });
        let store = EmbeddingStore::new(repo.clone(), Embedder::new(Arc::new(provider(3)), 8000));
        let sync = CorpusSync::new(store, fast_config());

        let report = assert_ok!(sync.sync_all().await);

        assert_eq!(
            report,
            SyncReport {
                processed: 3,
                created: 1,
                skipped: 1,
                failed: 1
            }
        );
        assert_eq!(repo.count_embeddings().await.unwrap(), 1);
        assert!(repo.find_embedding(3, OVERVIEW_CONTENT).await.unwrap().is_some());
    }
}
