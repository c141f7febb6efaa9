/// Read-through caching for catalog calls.
///
/// Returns the cached value when present. On a miss, or when the cache
/// cannot be read, runs `$block`, queues the result for a background write
/// with `$ttl` seconds, and returns it. A cache outage therefore costs a live
/// fetch, never a failed request. Errors from `$block` propagate with `?`.
///
/// # Example
/// ```rust,ignore
/// cached!(self.cache, CacheKey::MovieDetails(id), ttl::MOVIE_DETAILS, async move {
///     self.fetch_details(id).await
/// })
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        let key = $key;
        match $cache.get_from_cache(&key).await {
            Ok(Some(cached)) => Ok::<_, $crate::error::AppError>(cached),
            result => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, key = %key, "Cache read failed, fetching live");
                }
                let value = $block.await?;
                $cache.set_in_background(&key, &value, $ttl);
                Ok(value)
            }
        }
    }};
}
