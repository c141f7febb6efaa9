use std::{sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use movie_magic_api::{
    db::{
        create_pool, create_redis_client, Cache, CorpusRepository, PgConversationRepository,
        PgCorpusRepository,
    },
    routes::{create_router, AppState},
    services::{
        catalog::TmdbCatalog,
        chat::ChatService,
        corpus_sync::{CorpusSync, SyncConfig},
        embedder::{Embedder, GeminiEmbeddingProvider},
        embedding_store::EmbeddingStore,
        generation::GeminiGenerator,
        recommendations::RecommendationEngine,
    },
    Config,
};

#[derive(Parser, Debug)]
#[command(name = "movie-magic-api", about = "Movie recommendation chat backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Import popular movies from TMDB
    Populate {
        /// Number of catalog pages to import (20 movies per page)
        #[arg(long, default_value_t = 5)]
        pages: u32,
    },
    /// Embed every movie overview that has no embedding yet
    SyncEmbeddings,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("movie_magic_api=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let db_pool = create_pool(&config.database_url).await?;
    tracing::info!("Database pool created and migrations applied");

    let redis_client = create_redis_client(&config.redis_url)?;
    let (cache, cache_writer) = Cache::new(redis_client).await;

    let corpus: Arc<dyn CorpusRepository> = Arc::new(PgCorpusRepository::new(db_pool.clone()));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, db_pool, corpus, cache).await?,
        Command::Populate { pages } => {
            let catalog = TmdbCatalog::new(
                cache,
                config.tmdb_access_token.clone(),
                config.tmdb_api_url.clone(),
                config.batch_timeout(),
            )?;
            let sync = corpus_sync(&config, corpus, config.batch_timeout())?
                .with_shutdown(shutdown_channel());
            let report = sync.import_catalog(&catalog, pages).await?;
            let total = sync_store_count(&sync).await;
            tracing::info!(?report, total_movies = total, "Populate finished");
        }
        Command::SyncEmbeddings => {
            let sync = corpus_sync(&config, corpus, config.batch_timeout())?
                .with_shutdown(shutdown_channel());
            let report = sync.sync_all().await?;
            tracing::info!(?report, "Embedding sync finished");
        }
    }

    cache_writer.shutdown().await;
    Ok(())
}

async fn serve(
    config: &Config,
    db_pool: sqlx::PgPool,
    corpus: Arc<dyn CorpusRepository>,
    cache: Cache,
) -> anyhow::Result<()> {
    let store = embedding_store(config, corpus, config.request_timeout())?;

    let generator = GeminiGenerator::new(
        config.gemini_api_key.clone(),
        config.gemini_api_url.clone(),
        config.generation_model.clone(),
        config.request_timeout(),
    )?;
    let catalog = TmdbCatalog::new(
        cache,
        config.tmdb_access_token.clone(),
        config.tmdb_api_url.clone(),
        config.request_timeout(),
    )?;

    let engine = RecommendationEngine::new(store.clone(), Arc::new(generator), Arc::new(catalog))
        .with_top_k(config.rag_top_k)
        .with_timeouts(config.retrieval_timeout(), config.enrichment_timeout());

    let conversations = Arc::new(PgConversationRepository::new(db_pool));
    let state = Arc::new(AppState {
        embedding_store: store,
        chat: ChatService::new(conversations.clone(), engine),
        conversations,
    });

    let app = create_router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn embedding_store(
    config: &Config,
    corpus: Arc<dyn CorpusRepository>,
    timeout: Duration,
) -> anyhow::Result<EmbeddingStore> {
    let provider = GeminiEmbeddingProvider::new(
        config.gemini_api_key.clone(),
        config.gemini_api_url.clone(),
        config.embedding_model.clone(),
        timeout,
    )?;
    let embedder = Embedder::new(Arc::new(provider), config.embedding_max_chars);
    Ok(EmbeddingStore::new(corpus, embedder))
}

fn corpus_sync(
    config: &Config,
    corpus: Arc<dyn CorpusRepository>,
    timeout: Duration,
) -> anyhow::Result<CorpusSync> {
    let store = embedding_store(config, corpus, timeout)?;
    Ok(CorpusSync::new(
        store,
        SyncConfig {
            batch_size: config.sync_batch_size,
            delay: config.sync_delay(),
            import_delay: config.import_delay(),
            ..SyncConfig::default()
        },
    ))
}

async fn sync_store_count(sync: &CorpusSync) -> Option<i64> {
    sync.repository().count_movies().await.ok()
}

/// Flips to `true` on Ctrl-C so batch jobs stop between items
fn shutdown_channel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current item");
            let _ = tx.send(true);
        }
    });
    rx
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
