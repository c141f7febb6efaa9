/// TMDB v3 catalog client
///
/// Authenticates with a v4 read access token as a bearer token. Every
/// response is cached in Redis through [`cached!`](crate::cached).
use std::time::Duration;

use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use tracing::instrument;

use crate::{
    cached,
    db::{redis::cache::ttl, Cache, CacheKey},
    error::{AppError, AppResult},
    models::{DiscoverQuery, TmdbMovie, TmdbMovieDetails, TmdbPage, TmdbVideo, TmdbVideos},
    services::catalog::CatalogClient,
};

#[derive(Clone)]
pub struct TmdbCatalog {
    http_client: HttpClient,
    access_token: String,
    api_url: String,
    cache: Cache,
}

impl TmdbCatalog {
    pub fn new(
        cache: Cache,
        access_token: String,
        api_url: String,
        timeout: Duration,
    ) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            access_token,
            api_url: api_url.trim_end_matches('/').to_string(),
            cache,
        })
    }

    /// GET {api_url}{path} and decode the JSON body
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> AppResult<T> {
        let url = format!("{}{}", self.api_url, path);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(path = %path, status = %status, "TMDB request failed");
            return Err(AppError::ExternalApi(format!(
                "TMDB API returned status {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }
}

fn language() -> (&'static str, String) {
    ("language", "en-US".to_string())
}

#[async_trait::async_trait]
impl CatalogClient for TmdbCatalog {
    #[instrument(skip(self))]
    async fn movie_details(&self, movie_id: i64) -> AppResult<TmdbMovieDetails> {
        cached!(
            self.cache,
            CacheKey::MovieDetails(movie_id),
            ttl::MOVIE_DETAILS,
            async move {
                self.get_json::<TmdbMovieDetails>(&format!("/movie/{}", movie_id), &[language()])
                    .await
            }
        )
    }

    #[instrument(skip(self))]
    async fn similar_movies(&self, movie_id: i64, page: u32) -> AppResult<Vec<TmdbMovie>> {
        let similar: TmdbPage = cached!(
            self.cache,
            CacheKey::SimilarMovies(movie_id, page),
            ttl::SIMILAR_MOVIES,
            async move {
                self.get_json::<TmdbPage>(
                    &format!("/movie/{}/similar", movie_id),
                    &[language(), ("page", page.to_string())],
                )
                .await
            }
        )?;
        Ok(similar.results)
    }

    #[instrument(skip(self))]
    async fn movie_videos(&self, movie_id: i64) -> AppResult<Vec<TmdbVideo>> {
        cached!(
            self.cache,
            CacheKey::MovieVideos(movie_id),
            ttl::MOVIE_VIDEOS,
            async move {
                let videos = self
                    .get_json::<TmdbVideos>(&format!("/movie/{}/videos", movie_id), &[language()])
                    .await?;
                Ok::<_, AppError>(videos.results)
            }
        )
    }

    #[instrument(skip(self))]
    async fn discover(&self, query: &DiscoverQuery) -> AppResult<Vec<TmdbMovie>> {
        let discovered: TmdbPage = cached!(
            self.cache,
            CacheKey::Discover(query.signature()),
            ttl::DISCOVER,
            async move {
                self.get_json::<TmdbPage>("/discover/movie", &query.to_params())
                    .await
            }
        )?;
        Ok(discovered.results)
    }

    #[instrument(skip(self))]
    async fn popular_movies(&self, page: u32) -> AppResult<TmdbPage> {
        cached!(
            self.cache,
            CacheKey::Popular(page),
            ttl::POPULAR,
            async move {
                self.get_json::<TmdbPage>(
                    "/movie/popular",
                    &[language(), ("page", page.to_string())],
                )
                .await
            }
        )
    }
}
