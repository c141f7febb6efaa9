pub mod memory;
pub mod postgres;
pub mod redis;
pub mod repository;

pub use memory::{MemoryConversationRepository, MemoryCorpusRepository};
pub use postgres::{create_pool, PgConversationRepository, PgCorpusRepository};
pub use redis::create_redis_client;
pub use redis::Cache;
pub use redis::CacheKey;
pub use repository::{ConversationRepository, CorpusRepository};
