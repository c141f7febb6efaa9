use chrono::{DateTime, NaiveDate, Utc};
use pgvector::Vector;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    db::repository::{ConversationRepository, CorpusRepository},
    error::{AppError, AppResult},
    models::{ChatRole, Conversation, EmbeddingRecord, Movie, SimilarityResult, StoredMessage},
};

/// Creates a PostgreSQL connection pool and applies pending migrations
///
/// Migrations enable the `vector` extension and create the movie, embedding
/// and conversation tables.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

const MOVIE_COLUMNS: &str = "id, title, overview, original_language, popularity, release_date, \
     vote_average, vote_count, poster_path, backdrop_path, genre_ids";

const EMBEDDING_COLUMNS: &str =
    "id, movie_id, content_type, content, embedding, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct EmbeddingRow {
    id: i64,
    movie_id: i64,
    content_type: String,
    content: String,
    embedding: Vector,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<EmbeddingRow> for EmbeddingRecord {
    fn from(row: EmbeddingRow) -> Self {
        EmbeddingRecord {
            id: row.id,
            movie_id: row.movie_id,
            content_type: row.content_type,
            content: row.content,
            embedding: row.embedding.to_vec(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SimilarityRow {
    movie_id: i64,
    title: String,
    overview: Option<String>,
    release_date: Option<NaiveDate>,
    vote_average: Option<f64>,
    poster_path: Option<String>,
    similarity: Option<f64>,
}

impl From<SimilarityRow> for SimilarityResult {
    fn from(row: SimilarityRow) -> Self {
        // pgvector yields NaN for zero-norm vectors
        let similarity = row.similarity.filter(|s| s.is_finite()).unwrap_or(0.0);
        SimilarityResult {
            movie_id: row.movie_id,
            title: row.title,
            overview: row.overview,
            release_date: row.release_date,
            vote_average: row.vote_average,
            poster_path: row.poster_path,
            similarity,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    conversation_id: i64,
    role: String,
    content: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for StoredMessage {
    type Error = AppError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let role = row.role.parse::<ChatRole>().map_err(AppError::Internal)?;
        Ok(StoredMessage {
            id: row.id,
            conversation_id: row.conversation_id,
            role,
            content: row.content,
            created_at: row.created_at,
        })
    }
}

/// pgvector-backed movie and embedding storage
#[derive(Clone)]
pub struct PgCorpusRepository {
    pool: PgPool,
}

impl PgCorpusRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CorpusRepository for PgCorpusRepository {
    async fn insert_movie(&self, movie: &Movie) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO movies (id, title, overview, original_language, popularity, release_date,
                                vote_average, vote_count, poster_path, backdrop_path, genre_ids)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(movie.id)
        .bind(&movie.title)
        .bind(&movie.overview)
        .bind(&movie.original_language)
        .bind(movie.popularity)
        .bind(movie.release_date)
        .bind(movie.vote_average)
        .bind(movie.vote_count)
        .bind(&movie.poster_path)
        .bind(&movie.backdrop_path)
        .bind(&movie.genre_ids)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_movie(&self, movie_id: i64) -> AppResult<Option<Movie>> {
        let sql = format!("SELECT {} FROM movies WHERE id = $1", MOVIE_COLUMNS);
        let movie = sqlx::query_as::<_, Movie>(&sql)
            .bind(movie_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(movie)
    }

    async fn list_movies(&self, after_id: Option<i64>, limit: i64) -> AppResult<Vec<Movie>> {
        let sql = format!(
            "SELECT {} FROM movies WHERE ($1::BIGINT IS NULL OR id > $1) ORDER BY id LIMIT $2",
            MOVIE_COLUMNS
        );
        let movies = sqlx::query_as::<_, Movie>(&sql)
            .bind(after_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(movies)
    }

    async fn count_movies(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movies")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn find_embedding(
        &self,
        movie_id: i64,
        content_type: &str,
    ) -> AppResult<Option<EmbeddingRecord>> {
        let sql = format!(
            "SELECT {} FROM movie_embeddings WHERE movie_id = $1 AND content_type = $2",
            EMBEDDING_COLUMNS
        );
        let row = sqlx::query_as::<_, EmbeddingRow>(&sql)
            .bind(movie_id)
            .bind(content_type)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(EmbeddingRecord::from))
    }

    async fn upsert_embedding(
        &self,
        movie_id: i64,
        content_type: &str,
        content: &str,
        embedding: Vec<f32>,
    ) -> AppResult<EmbeddingRecord> {
        // Dropping the transaction on an early return rolls it back
        let mut tx = self.pool.begin().await?;

        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM movie_embeddings WHERE movie_id = $1 AND content_type = $2 FOR UPDATE",
        )
        .bind(movie_id)
        .bind(content_type)
        .fetch_optional(&mut *tx)
        .await?;

        let vector = Vector::from(embedding);
        let row = match existing {
            Some(id) => {
                let sql = format!(
                    "UPDATE movie_embeddings SET content = $2, embedding = $3, updated_at = now() \
                     WHERE id = $1 RETURNING {}",
                    EMBEDDING_COLUMNS
                );
                sqlx::query_as::<_, EmbeddingRow>(&sql)
                    .bind(id)
                    .bind(content)
                    .bind(vector)
                    .fetch_one(&mut *tx)
                    .await
            }
            None => {
                let sql = format!(
                    "INSERT INTO movie_embeddings (movie_id, content_type, content, embedding) \
                     VALUES ($1, $2, $3, $4) RETURNING {}",
                    EMBEDDING_COLUMNS
                );
                sqlx::query_as::<_, EmbeddingRow>(&sql)
                    .bind(movie_id)
                    .bind(content_type)
                    .bind(content)
                    .bind(vector)
                    .fetch_one(&mut *tx)
                    .await
            }
        }
        .map_err(|e| {
            AppError::from_db(
                e,
                &format!("embedding ({}, {})", movie_id, content_type),
            )
        })?;

        tx.commit().await?;

        Ok(row.into())
    }

    async fn count_embeddings(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movie_embeddings")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn nearest_by_cosine(
        &self,
        query: &[f32],
        content_type: &str,
        limit: i64,
    ) -> AppResult<Vec<SimilarityResult>> {
        // <=> is pgvector's cosine distance; ascending distance, then storage order
        let rows = sqlx::query_as::<_, SimilarityRow>(
            r#"
            SELECT me.movie_id,
                   m.title,
                   m.overview,
                   m.release_date,
                   m.vote_average,
                   m.poster_path,
                   1 - (me.embedding <=> $1) AS similarity
            FROM movie_embeddings me
                     JOIN movies m ON me.movie_id = m.id
            WHERE me.content_type = $2
            ORDER BY me.embedding <=> $1, me.id
            LIMIT $3
            "#,
        )
        .bind(Vector::from(query.to_vec()))
        .bind(content_type)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SimilarityResult::from).collect())
    }
}

/// Conversation storage in Postgres
#[derive(Clone)]
pub struct PgConversationRepository {
    pool: PgPool,
}

impl PgConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ConversationRepository for PgConversationRepository {
    async fn create_conversation(&self, user_id: &str) -> AppResult<Conversation> {
        let conversation = sqlx::query_as::<_, Conversation>(
            "INSERT INTO conversations (user_id) VALUES ($1) \
             RETURNING id, user_id, started_at, last_message_at",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(conversation)
    }

    async fn get_conversation(&self, conversation_id: i64) -> AppResult<Option<Conversation>> {
        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT id, user_id, started_at, last_message_at FROM conversations WHERE id = $1",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(conversation)
    }

    async fn list_messages(&self, conversation_id: i64) -> AppResult<Vec<StoredMessage>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, conversation_id, role, content, created_at FROM conversation_messages \
             WHERE conversation_id = $1 ORDER BY id",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StoredMessage::try_from).collect()
    }

    async fn append_message(
        &self,
        conversation_id: i64,
        role: ChatRole,
        content: &str,
    ) -> AppResult<StoredMessage> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, MessageRow>(
            "INSERT INTO conversation_messages (conversation_id, role, content) VALUES ($1, $2, $3) \
             RETURNING id, conversation_id, role, content, created_at",
        )
        .bind(conversation_id)
        .bind(role.as_str())
        .bind(content)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::from_db(e, &format!("conversation {}", conversation_id)))?;

        sqlx::query("UPDATE conversations SET last_message_at = now() WHERE id = $1")
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        row.try_into()
    }
}
