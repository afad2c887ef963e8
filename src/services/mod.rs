//! Core services. Each holds its collaborators explicitly; nothing here is a
//! process-wide singleton.

pub mod catalog;
pub mod content_store;
pub mod derivation;
pub mod ingest_service;
pub mod queue;
pub mod retrieval_service;
pub mod session;
pub mod thumbnail;
