pub mod catalog;
pub mod chat;
pub mod corpus_sync;
pub mod embedder;
pub mod embedding_store;
pub mod generation;
pub mod recommendations;
