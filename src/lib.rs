//! gridstore: chunked file storage on SQLite.
//!
//! Files are split into fixed-size chunk rows next to a single metadata row
//! per file, written through [`services::grid_store::GridStore`]. The HTTP
//! layer in [`handlers`] and [`routes`] exposes the same operations over
//! axum.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
