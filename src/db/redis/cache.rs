use redis::AsyncCommands;
use redis::Client;
use std::fmt::Display;
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::error::AppResult;

/// Cache TTLs for catalog responses, in seconds
pub mod ttl {
    pub const MOVIE_DETAILS: u64 = 24 * 60 * 60;
    pub const SIMILAR_MOVIES: u64 = 6 * 60 * 60;
    pub const DISCOVER: u64 = 6 * 60 * 60;
    pub const MOVIE_VIDEOS: u64 = 24 * 60 * 60;
    pub const POPULAR: u64 = 60 * 60;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    MovieDetails(i64),
    /// Movie id and page
    SimilarMovies(i64, u32),
    MovieVideos(i64),
    /// Discover query signature
    Discover(String),
    Popular(u32),
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::MovieDetails(id) => write!(f, "tmdb:movie:{}", id),
            CacheKey::SimilarMovies(id, page) => write!(f, "tmdb:similar:{}:{}", id, page),
            CacheKey::MovieVideos(id) => write!(f, "tmdb:videos:{}", id),
            CacheKey::Discover(signature) => write!(f, "tmdb:discover:{}", signature),
            CacheKey::Popular(page) => write!(f, "tmdb:popular:{}", page),
        }
    }
}

/// Creates a Redis client for caching
///
/// Connections are multiplexed, one per cache operation.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Message for asynchronous cache writes
struct CacheWriteMessage {
    key: String,
    value: String,
    ttl: u64,
}

/// Catalog response cache backed by Redis
#[derive(Clone)]
pub struct Cache {
    redis_client: Client,
    write_tx: mpsc::UnboundedSender<CacheWriteMessage>,
}

/// Handle for gracefully shutting down the cache writer
pub struct CacheWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl CacheWriterHandle {
    /// Signals the writer task to flush pending writes and stop
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Cache writer shutdown signal sent");
    }
}

impl Cache {
    /// Creates a new Cache and spawns its background writer
    ///
    /// Writes go through a channel so a slow or unavailable Redis never
    /// delays a catalog response.
    pub async fn new(redis_client: Client) -> (Self, CacheWriterHandle) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let client = redis_client.clone();
        tokio::spawn(async move {
            Self::cache_writer_task(client, write_rx, shutdown_rx).await;
        });

        let cache = Self {
            redis_client,
            write_tx,
        };

        (cache, CacheWriterHandle { shutdown_tx })
    }

    async fn cache_writer_task(
        client: Client,
        mut write_rx: mpsc::UnboundedReceiver<CacheWriteMessage>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Cache writer task started");
        let mut failed_writes = 0u64;

        loop {
            tokio::select! {
                Some(msg) = write_rx.recv() => {
                    let key = msg.key.clone();
                    if let Err(e) = Self::write_to_redis(&client, msg).await {
                        failed_writes += 1;
                        tracing::warn!(error = %e, key = %key, "Failed to write catalog response to cache");
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!(failed = failed_writes, "Cache writer shutting down, flushing remaining writes");

                    // Senders live in every Cache clone, so drain what is queued instead of waiting for close
                    while let Ok(msg) = write_rx.try_recv() {
                        if let Err(e) = Self::write_to_redis(&client, msg).await {
                            tracing::error!(error = %e, "Failed to flush cache write during shutdown");
                        }
                    }

                    tracing::info!("Cache writer task stopped");
                    break;
                }
            }
        }
    }

    async fn write_to_redis(client: &Client, msg: CacheWriteMessage) -> AppResult<()> {
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(msg.key, msg.value, msg.ttl).await?;
        Ok(())
    }

    /// Retrieves a cached value, `None` on a miss
    pub async fn get_from_cache<T: serde::de::DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> AppResult<Option<T>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let cached: Option<String> = conn.get(key.to_string()).await?;

        match cached {
            Some(json) => {
                let data = serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!("Cache deserialization error: {}", e))
                })?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    /// Queues a value for writing without waiting on Redis
    pub fn set_in_background<T: serde::Serialize>(&self, key: &CacheKey, value: &T, ttl: u64) {
        let json = match serde_json::to_string(value) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Cache serialization error");
                return;
            }
        };

        let msg = CacheWriteMessage {
            key: key.to_string(),
            value: json,
            ttl,
        };

        if let Err(e) = self.write_tx.send(msg) {
            tracing::error!(error = %e, "Failed to send cache write message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_display_movie_details() {
        assert_eq!(CacheKey::MovieDetails(550).to_string(), "tmdb:movie:550");
    }

    #[test]
    fn test_cache_key_display_similar_includes_page() {
        assert_eq!(
            CacheKey::SimilarMovies(550, 2).to_string(),
            "tmdb:similar:550:2"
        );
        assert_ne!(
            CacheKey::SimilarMovies(550, 1).to_string(),
            CacheKey::SimilarMovies(550, 2).to_string()
        );
    }

    #[test]
    fn test_cache_key_display_videos_and_popular() {
        assert_eq!(CacheKey::MovieVideos(27205).to_string(), "tmdb:videos:27205");
        assert_eq!(CacheKey::Popular(3).to_string(), "tmdb:popular:3");
    }

    #[test]
    fn test_cache_key_display_discover() {
        let key = CacheKey::Discover("with_genres=53&page=1".to_string());
        assert_eq!(key.to_string(), "tmdb:discover:with_genres=53&page=1");
    }

    #[test]
    fn test_ttls_ordered_by_volatility() {
        assert!(ttl::POPULAR < ttl::SIMILAR_MOVIES);
        assert!(ttl::SIMILAR_MOVIES < ttl::MOVIE_DETAILS);
        assert_eq!(ttl::DISCOVER, ttl::SIMILAR_MOVIES);
    }

    // The tests below need a running Redis (REDIS_URL, default localhost)

    #[tokio::test]
    #[ignore]
    async fn test_cache_miss() {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

        let client = create_redis_client(&redis_url).unwrap();
        let (cache, _handle) = Cache::new(client).await;

        let key = CacheKey::MovieDetails(-987_654);
        let retrieved: Option<Vec<String>> = cache.get_from_cache(&key).await.unwrap();

        assert_eq!(retrieved, None);
    }

    #[tokio::test]
    #[ignore]
    async fn test_set_in_background_writes_to_cache() {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

        let client = create_redis_client(&redis_url).unwrap();
        let (cache, _handle) = Cache::new(client.clone()).await;

        let key = CacheKey::Popular(9_999);
        let value = vec!["Heat".to_string(), "Ronin".to_string()];

        cache.set_in_background(&key, &value, 60);
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let retrieved: Option<Vec<String>> = cache.get_from_cache(&key).await.unwrap();
        assert_eq!(retrieved, Some(value));

        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = conn.del(key.to_string()).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_cache_writer_graceful_shutdown() {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

        let client = create_redis_client(&redis_url).unwrap();
        let (cache, handle) = Cache::new(client.clone()).await;

        let key = CacheKey::MovieVideos(-1);
        let value = vec!["trailer".to_string()];

        cache.set_in_background(&key, &value, 60);
        handle.shutdown().await;
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        let retrieved: Option<Vec<String>> = cache.get_from_cache(&key).await.unwrap();
        assert_eq!(retrieved, Some(value));

        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = conn.del(key.to_string()).await.unwrap();
    }
}
