use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// A catalog movie as stored locally
///
/// The identifier is the catalog's own (TMDB) id, so imports can dedupe on it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Movie {
    pub id: i64,
    pub title: String,
    pub overview: Option<String>,
    pub original_language: Option<String>,
    pub popularity: Option<f64>,
    pub release_date: Option<NaiveDate>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub genre_ids: Vec<i64>,
}

impl Movie {
    /// Creates a movie with only the required fields set
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            overview: None,
            original_language: None,
            popularity: None,
            release_date: None,
            vote_average: None,
            vote_count: None,
            poster_path: None,
            backdrop_path: None,
            genre_ids: Vec::new(),
        }
    }

    pub fn with_overview(mut self, overview: impl Into<String>) -> Self {
        self.overview = Some(overview.into());
        self
    }

    /// Returns the overview when it contains something worth embedding
    pub fn describable_text(&self) -> Option<&str> {
        self.overview
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    pub fn release_year(&self) -> Option<i32> {
        self.release_date.map(|date| date.year())
    }
}

/// Parses a catalog release date (`YYYY-MM-DD`)
///
/// The catalog sends empty strings for unreleased titles and occasionally
/// bare years, neither of which is a usable date.
pub fn parse_release_date(raw: Option<&str>) -> Option<NaiveDate> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}
