//! Defines routes for all entry operations.
//!
//! ## Structure
//! - **Collection endpoints**
//!   - `POST   /files`: create a folder, file or image
//!   - `GET    /files`: list the caller's entries (supports parentId, page)
//!
//! - **Entry endpoints**
//!   - `GET    /files/{id}`          : entry metadata (owner only)
//!   - `PUT    /files/{id}/publish`  : make content readable by anyone
//!   - `PUT    /files/{id}/unpublish`: restrict content to the owner
//!   - `GET    /files/{id}/data`     : content, optionally `?size=500|250|100`

use crate::{
    handlers::{
        file_handlers::{get_file, get_index, get_show, post_upload, put_publish, put_unpublish},
        health_handlers::{healthz, readyz},
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, put},
};

/// Build and return the router for all routes.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Collection routes
        .route("/files", get(get_index).post(post_upload))
        // Entry routes
        .route("/files/{id}", get(get_show))
        .route("/files/{id}/publish", put(put_publish))
        .route("/files/{id}/unpublish", put(put_unpublish))
        .route("/files/{id}/data", get(get_file))
}
