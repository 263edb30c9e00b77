//! Core data models for the chunked object store.
//!
//! A stored file is one [`file::FileInfo`] row plus an ordered run of
//! [`chunk::Chunk`] rows sharing its id. Both map onto SQLite tables via
//! `sqlx::FromRow` and serialize as JSON via `serde`.

pub mod chunk;
pub mod file;
pub mod file_id;
