pub mod chat;
pub mod embedder;
pub mod ingest;
pub mod retrieve;
