//! Shared handler state: the services plus the handles readiness checks need.

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::services::{
    catalog::Catalog, content_store::ContentStore, ingest_service::IngestService,
    queue::JobQueue, retrieval_service::RetrievalService, session::SessionValidator,
};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqlitePool>,
    pub store: Arc<dyn ContentStore>,
    pub sessions: Arc<dyn SessionValidator>,
    pub ingest: IngestService,
    pub retrieval: RetrievalService,
}

impl AppState {
    /// Wire the services around explicitly constructed collaborators.
    pub fn new(
        db: Arc<SqlitePool>,
        store: Arc<dyn ContentStore>,
        queue: Arc<dyn JobQueue>,
        sessions: Arc<dyn SessionValidator>,
    ) -> Self {
        let catalog = Catalog::new(db.clone());
        Self {
            ingest: IngestService::new(catalog.clone(), store.clone(), queue),
            retrieval: RetrievalService::new(catalog, store.clone(), sessions.clone()),
            db,
            store,
            sessions,
        }
    }
}
