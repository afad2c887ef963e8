//! Shared fixtures for the integration tests.
//!
//! Every harness owns an in-memory catalog and a content store rooted in a
//! fresh temp directory, so tests never see each other's data.
#![allow(dead_code)]

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use sqlx::SqlitePool;
use std::{io::Cursor, path::Path, sync::Arc, time::Duration};
use tempfile::TempDir;
use uuid::Uuid;

use files_manager::{
    AppState, FilesError, FilesResult, db,
    models::{ContentRef, DerivationJob},
    services::{
        catalog::Catalog,
        content_store::{ContentError, ContentResult, ContentStore, FsContentStore},
        derivation::DerivationWorker,
        ingest_service::{CreateEntry, IngestService},
        queue::{Delivery, JobQueue, QueueConfig, RetryDecision, SqliteJobQueue},
        retrieval_service::RetrievalService,
        session::{DEFAULT_SESSION_TTL, SessionValidator, SqliteSessions},
    },
};

pub struct Harness {
    pub db: Arc<SqlitePool>,
    pub catalog: Catalog,
    pub store: Arc<dyn ContentStore>,
    pub queue: Arc<SqliteJobQueue>,
    pub sessions: Arc<SqliteSessions>,
    pub ingest: IngestService,
    pub retrieval: RetrievalService,
    pub worker: DerivationWorker,
    pub dir: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_queue_config(fast_queue()).await
    }

    pub async fn with_queue_config(config: QueueConfig) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let store: Arc<dyn ContentStore> =
            Arc::new(FsContentStore::new(dir.path()).await.expect("content store"));
        Self::assemble(dir, store, config).await
    }

    /// Harness whose content store is replaced by `store`.
    pub async fn with_store(store: Arc<dyn ContentStore>) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        Self::assemble(dir, store, fast_queue()).await
    }

    async fn assemble(dir: TempDir, store: Arc<dyn ContentStore>, config: QueueConfig) -> Self {
        let db = Arc::new(db::connect_in_memory().await.expect("in-memory db"));
        let catalog = Catalog::new(db.clone());
        let queue = Arc::new(SqliteJobQueue::new(db.clone(), config));
        let sessions = Arc::new(SqliteSessions::new(db.clone()));

        let ingest = IngestService::new(catalog.clone(), store.clone(), queue.clone());
        let retrieval = RetrievalService::new(catalog.clone(), store.clone(), sessions.clone());
        let worker = DerivationWorker::new(catalog.clone(), store.clone());

        Self {
            db,
            catalog,
            store,
            queue,
            sessions,
            ingest,
            retrieval,
            worker,
            dir,
        }
    }

    /// Handler state over the same collaborators.
    pub fn app_state(&self) -> AppState {
        let queue: Arc<dyn JobQueue> = self.queue.clone();
        let sessions: Arc<dyn SessionValidator> = self.sessions.clone();
        AppState::new(self.db.clone(), self.store.clone(), queue, sessions)
    }

    /// A new user with a live session token.
    pub async fn login(&self) -> (Uuid, String) {
        let user = Uuid::new_v4();
        let token = self
            .sessions
            .issue(user, DEFAULT_SESSION_TTL)
            .await
            .expect("issue session");
        (user, token)
    }

    pub async fn entry_rows(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM entries")
            .fetch_one(&*self.db)
            .await
            .expect("count entries")
    }

    /// Lease and process every queued job once.
    pub async fn drain_queue(&self) {
        while let Some(delivery) = self.queue.try_dequeue().await.expect("dequeue") {
            self.worker
                .handle(self.queue.as_ref(), delivery)
                .await
                .expect("settle delivery");
        }
    }
}

/// Queue settings that keep retries and polling fast in tests.
pub fn fast_queue() -> QueueConfig {
    QueueConfig {
        lease: Duration::from_secs(30),
        poll_interval: Duration::from_millis(20),
        max_attempts: 3,
        backoff_base: Duration::ZERO,
        backoff_max: Duration::ZERO,
    }
}

/// Number of files beneath `dir`, at any depth.
pub fn count_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() { count_files(&path) } else { 1 }
        })
        .sum()
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("encode png");
    buf
}

pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn folder(name: &str, parent_id: Option<String>) -> CreateEntry {
    CreateEntry {
        name: Some(name.into()),
        kind: Some("folder".into()),
        parent_id,
        ..CreateEntry::default()
    }
}

pub fn file(name: &str, bytes: &[u8], parent_id: Option<String>) -> CreateEntry {
    CreateEntry {
        name: Some(name.into()),
        kind: Some("file".into()),
        parent_id,
        data: Some(encode(bytes)),
        ..CreateEntry::default()
    }
}

pub fn image(name: &str, bytes: &[u8], parent_id: Option<String>) -> CreateEntry {
    CreateEntry {
        kind: Some("image".into()),
        ..file(name, bytes, parent_id)
    }
}

/// Queue whose backend is always down.
pub struct UnavailableQueue;

#[async_trait]
impl JobQueue for UnavailableQueue {
    async fn enqueue(&self, _job: &DerivationJob) -> FilesResult<i64> {
        Err(FilesError::Upstream("queue unavailable".into()))
    }

    async fn dequeue(&self) -> FilesResult<Delivery> {
        Err(FilesError::Upstream("queue unavailable".into()))
    }

    async fn ack(&self, _id: i64) -> FilesResult<()> {
        Err(FilesError::Upstream("queue unavailable".into()))
    }

    async fn retry(&self, _delivery: &Delivery, _error: &str) -> FilesResult<RetryDecision> {
        Err(FilesError::Upstream("queue unavailable".into()))
    }

    async fn reject(&self, _id: i64, _error: &str) -> FilesResult<()> {
        Err(FilesError::Upstream("queue unavailable".into()))
    }
}

/// Wraps a real store and fails selected writes.
pub struct FlakyStore {
    pub inner: FsContentStore,
    /// Fail writes of canonical blobs.
    pub fail_canonical: bool,
    /// Fail writes of derived variants.
    pub fail_variants: bool,
}

impl FlakyStore {
    pub async fn new(dir: &Path, fail_canonical: bool, fail_variants: bool) -> Self {
        Self {
            inner: FsContentStore::new(dir).await.expect("content store"),
            fail_canonical,
            fail_variants,
        }
    }
}

#[async_trait]
impl ContentStore for FlakyStore {
    async fn write(&self, reference: &ContentRef, data: Bytes) -> ContentResult<()> {
        let is_variant = reference.as_str().contains('_');
        if (is_variant && self.fail_variants) || (!is_variant && self.fail_canonical) {
            return Err(ContentError::Io(std::io::Error::other("disk full")));
        }
        self.inner.write(reference, data).await
    }

    async fn read(&self, reference: &ContentRef) -> ContentResult<Bytes> {
        self.inner.read(reference).await
    }

    async fn exists(&self, reference: &ContentRef) -> ContentResult<bool> {
        self.inner.exists(reference).await
    }

    async fn ready(&self) -> ContentResult<()> {
        self.inner.ready().await
    }
}
