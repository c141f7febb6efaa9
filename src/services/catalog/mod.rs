//! Movie catalog (TMDB) abstraction and the lookups built on top of it.

use crate::{
    error::AppResult,
    models::{DiscoverQuery, TmdbMovie, TmdbMovieDetails, TmdbPage, TmdbVideo, THRILLER_GENRE_ID},
};

pub mod tmdb;

pub use tmdb::TmdbCatalog;

/// Minimum rating for discovered thriller picks
const THRILLER_MIN_RATING: f64 = 7.0;

/// Read-only access to the movie catalog
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogClient: Send + Sync {
    async fn movie_details(&self, movie_id: i64) -> AppResult<TmdbMovieDetails>;

    async fn similar_movies(&self, movie_id: i64, page: u32) -> AppResult<Vec<TmdbMovie>>;

    async fn movie_videos(&self, movie_id: i64) -> AppResult<Vec<TmdbVideo>>;

    async fn discover(&self, query: &DiscoverQuery) -> AppResult<Vec<TmdbMovie>>;

    async fn popular_movies(&self, page: u32) -> AppResult<TmdbPage>;
}

/// Thriller companion picks for a movie
///
/// Similar movies in the thriller genre come first, topped up with the
/// best-rated thrillers when there are not enough. Without a movie id only
/// the top-rated list is used. If that fails the popular thrillers are tried,
/// and a second failure yields nothing.
pub async fn thriller_picks(
    catalog: &dyn CatalogClient,
    movie_id: Option<i64>,
    limit: usize,
) -> Vec<TmdbMovie> {
    match collect_thrillers(catalog, movie_id, limit).await {
        Ok(picks) => picks,
        Err(e) => {
            tracing::warn!(movie_id, error = %e, "Thriller lookup failed, trying popular thrillers");
            let popular = DiscoverQuery::genre(THRILLER_GENRE_ID, "popularity.desc");
            match catalog.discover(&popular).await {
                Ok(mut movies) => {
                    movies.truncate(limit);
                    movies
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Popular thriller lookup failed");
                    Vec::new()
                }
            }
        }
    }
}

async fn collect_thrillers(
    catalog: &dyn CatalogClient,
    movie_id: Option<i64>,
    limit: usize,
) -> AppResult<Vec<TmdbMovie>> {
    let mut picks: Vec<TmdbMovie> = match movie_id {
        Some(id) => catalog
            .similar_movies(id, 1)
            .await?
            .into_iter()
            .filter(|m| m.id != id && m.has_genre(THRILLER_GENRE_ID))
            .take(limit)
            .collect(),
        None => Vec::new(),
    };

    if picks.len() < limit {
        let top_rated =
            DiscoverQuery::genre(THRILLER_GENRE_ID, "vote_average.desc").min_rating(THRILLER_MIN_RATING);
        for movie in catalog.discover(&top_rated).await? {
            if picks.len() >= limit {
                break;
            }
            if Some(movie.id) == movie_id || picks.iter().any(|p| p.id == movie.id) {
                continue;
            }
            picks.push(movie);
        }
    }

    Ok(picks)
}

/// Picks the video to show as a trailer
///
/// First YouTube video typed "Trailer", otherwise the first YouTube video.
pub fn select_trailer(videos: &[TmdbVideo]) -> Option<&TmdbVideo> {
    let youtube = || videos.iter().filter(|v| v.site.eq_ignore_ascii_case("YouTube"));
    youtube()
        .find(|v| v.video_type == "Trailer")
        .or_else(|| youtube().next())
}

/// YouTube key of a movie's trailer, `None` when absent or on lookup failure
pub async fn trailer_key(catalog: &dyn CatalogClient, movie_id: i64) -> Option<String> {
    match catalog.movie_videos(movie_id).await {
        Ok(videos) => select_trailer(&videos).map(|v| v.key.clone()),
        Err(e) => {
            tracing::warn!(movie_id, error = %e, "Trailer lookup failed");
            None
        }
    }
}
