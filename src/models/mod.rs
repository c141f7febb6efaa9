use serde::{Deserialize, Serialize};

pub mod chat;
pub mod embedding;
pub mod movie;

pub use chat::{
    ChatRequest, ChatResponse, ChatRole, ChatTurn, Conversation, GeneratedReply, MovieCandidate,
    MovieRecommendation, RecommendationPayload, StoredMessage, ThrillerPick,
};
pub use embedding::{
    cosine_similarity, EmbeddingRecord, EmbeddingSummary, SimilarityResult, EMBEDDING_DIMENSION,
    MAX_CONTENT_TYPE_LEN, OVERVIEW_CONTENT,
};
pub use movie::{parse_release_date, Movie};

/// TMDB genre id for thrillers
pub const THRILLER_GENRE_ID: i64 = 53;

// ============================================================================
// TMDB API Types
// ============================================================================

fn unknown_title() -> String {
    "Unknown".to_string()
}

/// Movie entry as returned by TMDB list endpoints (popular, similar, discover)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TmdbMovie {
    pub id: i64,
    #[serde(default = "unknown_title")]
    pub title: String,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub vote_count: Option<i64>,
    #[serde(default)]
    pub popularity: Option<f64>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub original_language: Option<String>,
    #[serde(default)]
    pub genre_ids: Vec<i64>,
}

impl TmdbMovie {
    pub fn has_genre(&self, genre_id: i64) -> bool {
        self.genre_ids.contains(&genre_id)
    }
}

impl From<TmdbMovie> for Movie {
    fn from(entry: TmdbMovie) -> Self {
        Movie {
            id: entry.id,
            title: entry.title,
            overview: entry.overview,
            original_language: entry.original_language,
            popularity: entry.popularity,
            release_date: parse_release_date(entry.release_date.as_deref()),
            vote_average: entry.vote_average,
            vote_count: entry.vote_count,
            poster_path: entry.poster_path,
            backdrop_path: entry.backdrop_path,
            genre_ids: entry.genre_ids,
        }
    }
}

impl From<&TmdbMovie> for ThrillerPick {
    fn from(entry: &TmdbMovie) -> Self {
        ThrillerPick {
            id: entry.id,
            title: entry.title.clone(),
        }
    }
}

/// Paged list response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TmdbPage {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub results: Vec<TmdbMovie>,
    #[serde(default)]
    pub total_pages: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TmdbGenre {
    pub id: i64,
    pub name: String,
}

/// Response from GET /movie/{id}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TmdbMovieDetails {
    pub id: i64,
    #[serde(default = "unknown_title")]
    pub title: String,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub runtime: Option<u32>,
    #[serde(default)]
    pub genres: Vec<TmdbGenre>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TmdbVideo {
    pub key: String,
    pub site: String,
    #[serde(rename = "type")]
    pub video_type: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Response from GET /movie/{id}/videos
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbVideos {
    #[serde(default)]
    pub results: Vec<TmdbVideo>,
}

/// Parameters for GET /discover/movie
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoverQuery {
    pub genre_ids: Vec<i64>,
    pub sort_by: String,
    pub page: u32,
    pub year: Option<i32>,
    pub vote_average_gte: Option<f64>,
}

impl DiscoverQuery {
    pub fn genre(genre_id: i64, sort_by: &str) -> Self {
        Self {
            genre_ids: vec![genre_id],
            sort_by: sort_by.to_string(),
            page: 1,
            year: None,
            vote_average_gte: None,
        }
    }

    pub fn min_rating(mut self, vote_average_gte: f64) -> Self {
        self.vote_average_gte = Some(vote_average_gte);
        self
    }

    /// Query string pairs, omitting unset filters
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("language", "en-US".to_string()),
            ("sort_by", self.sort_by.clone()),
            ("page", self.page.to_string()),
        ];

        if !self.genre_ids.is_empty() {
            let genres: Vec<String> = self.genre_ids.iter().map(|id| id.to_string()).collect();
            params.push(("with_genres", genres.join(",")));
        }
        if let Some(year) = self.year {
            params.push(("primary_release_year", year.to_string()));
        }
        if let Some(rating) = self.vote_average_gte {
            params.push(("vote_average.gte", rating.to_string()));
        }

        params
    }

    /// Stable textual form, used as the cache key
    pub fn signature(&self) -> String {
        self.to_params()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }
}
