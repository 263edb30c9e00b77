//! Defines routes for all file operations.
//!
//! ## Structure
//! - **File endpoints**
//!   - `PUT    /files/{*id}`: upload (streamed into chunks)
//!   - `GET    /files/{*id}`: download (streamed out of chunks)
//!   - `HEAD   /files/{*id}`: metadata headers only
//!   - `DELETE /files/{*id}`: delete, absent files included
//!
//! - **Store-wide endpoints**
//!   - `POST   /copy/{id}`: copy a stored file chunk by chunk
//!   - `POST   /delete`: delete a list of files
//!   - `DELETE /files?confirm=confirm`: wipe the store
//!
//! The wildcard lets uploads use external ids like `photos/2025/img.jpg`;
//! only the extension of the external id survives into the returned id.

use crate::{
    handlers::{
        file_handlers::{
            clear_files, copy_file, delete_file, delete_files, get_file, head_file, upload_file,
        },
        health_handlers::{healthz, readyz},
    },
    services::grid_store::GridStore,
};
use axum::{
    Router,
    routing::{delete, get, post, put},
};

/// Build and return the router for all file routes.
///
/// The router carries shared state (`GridStore`) to all handlers.
pub fn routes() -> Router<GridStore> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // File-level routes
        .route(
            "/files/{*id}",
            put(upload_file)
                .get(get_file)
                .head(head_file)
                .delete(delete_file),
        )
        // Store-level routes
        .route("/files", delete(clear_files))
        .route("/copy/{id}", post(copy_file))
        .route("/delete", post(delete_files))
}
