//! File catalog with per-user visibility, local blob storage and an
//! asynchronous thumbnail pipeline.

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

pub use errors::{AppError, FilesError, FilesResult, ValidationError};
pub use state::AppState;
