//! src/services/derivation.rs
//!
//! Derivation worker: consumes thumbnail jobs, re-reads the entry from the
//! catalog and writes one resized variant per canonical width next to the
//! canonical blob. Re-running a job overwrites the same references, so
//! redelivery is always safe.

use bytes::Bytes;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    errors::FilesResult,
    models::{ContentRef, DerivationJob, SizeVariant},
    services::{
        catalog::Catalog,
        content_store::{ContentError, ContentStore},
        queue::{Delivery, JobQueue, RetryDecision},
        thumbnail::SourceImage,
    },
};

/// Pause after a queue backend failure before polling again.
const QUEUE_ERROR_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum DerivationError {
    /// The job can never succeed; drop it.
    #[error("{0}")]
    Permanent(String),
    /// A transient failure; every width is redone on the next delivery.
    #[error("{0}")]
    Retryable(String),
}

impl DerivationError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DerivationError::Retryable(_))
    }
}

fn parse_id(raw: Option<&str>, missing: &str) -> Result<Uuid, DerivationError> {
    let raw = raw
        .filter(|v| !v.is_empty())
        .ok_or_else(|| DerivationError::Permanent(missing.to_string()))?;
    Uuid::parse_str(raw).map_err(|_| DerivationError::Permanent(format!("malformed id `{raw}`")))
}

#[derive(Clone)]
pub struct DerivationWorker {
    catalog: Catalog,
    store: Arc<dyn ContentStore>,
}

impl DerivationWorker {
    pub fn new(catalog: Catalog, store: Arc<dyn ContentStore>) -> Self {
        Self { catalog, store }
    }

    /// Regenerate every size variant for the job's entry.
    ///
    /// Any single width failing fails the whole job.
    pub async fn process(&self, job: &DerivationJob) -> Result<(), DerivationError> {
        let entry_id = parse_id(job.entry_id.as_deref(), "Missing fileId")?;
        let owner_id = parse_id(job.owner_id.as_deref(), "Missing userId")?;

        let entry = self
            .catalog
            .find_owned(entry_id, owner_id)
            .await
            .map_err(|err| DerivationError::Retryable(err.to_string()))?
            .ok_or_else(|| DerivationError::Permanent("File not found".into()))?;
        let content_ref = entry
            .content_ref
            .ok_or_else(|| DerivationError::Permanent("entry has no content".into()))?;

        let canonical = self.store.read(&content_ref).await.map_err(|err| match err {
            ContentError::NotFound(_) => DerivationError::Permanent("canonical blob missing".into()),
            other => DerivationError::Retryable(other.to_string()),
        })?;

        let source = tokio::task::spawn_blocking(move || SourceImage::decode(&canonical))
            .await
            .map_err(|err| DerivationError::Retryable(err.to_string()))?
            .map_err(|err| DerivationError::Permanent(format!("not a decodable image: {err}")))?;
        let source = Arc::new(source);

        for size in SizeVariant::ALL {
            self.write_variant(&source, &content_ref, size).await?;
        }

        info!(entry_id = %entry_id, widths = SizeVariant::ALL.len(), "derived variants");
        Ok(())
    }

    async fn write_variant(
        &self,
        source: &Arc<SourceImage>,
        content_ref: &ContentRef,
        size: SizeVariant,
    ) -> Result<(), DerivationError> {
        let width = size.width();
        let renderer = Arc::clone(source);
        let rendered = tokio::task::spawn_blocking(move || renderer.render(width))
            .await
            .map_err(|err| DerivationError::Retryable(err.to_string()))?
            .map_err(|err| DerivationError::Retryable(format!("resize to {width} failed: {err}")))?;

        self.store
            .write(&content_ref.variant(size), Bytes::from(rendered))
            .await
            .map_err(|err| DerivationError::Retryable(format!("storing {width} variant: {err}")))
    }

    /// Process one delivery and settle it with the queue.
    pub async fn handle(&self, queue: &dyn JobQueue, delivery: Delivery) -> FilesResult<()> {
        match self.process(&delivery.job).await {
            Ok(()) => queue.ack(delivery.id).await,
            Err(err) if err.is_retryable() => {
                match queue.retry(&delivery, &err.to_string()).await? {
                    RetryDecision::Retry { attempt, delay } => warn!(
                        job_id = delivery.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying derivation job"
                    ),
                    RetryDecision::DeadLettered { attempts } => error!(
                        job_id = delivery.id,
                        attempts,
                        error = %err,
                        "Max attempts exhausted, dead-lettering job"
                    ),
                }
                Ok(())
            }
            Err(err) => {
                warn!(job_id = delivery.id, error = %err, "Dropping unprocessable job");
                queue.reject(delivery.id, &err.to_string()).await
            }
        }
    }

    /// Consume jobs until `shutdown` fires. A job in flight is finished first.
    pub async fn run(self, queue: Arc<dyn JobQueue>, shutdown: CancellationToken) {
        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = queue.dequeue() => next,
            };

            let outcome = match next {
                Ok(delivery) => self.handle(queue.as_ref(), delivery).await,
                Err(err) => Err(err),
            };

            if let Err(err) = outcome {
                error!(error = %err, "job queue operation failed");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(QUEUE_ERROR_PAUSE) => {}
                }
            }
        }
        info!("derivation worker stopped");
    }
}

/// Start `count` independent consumers sharing one queue.
pub fn spawn_workers(
    worker: DerivationWorker,
    queue: Arc<dyn JobQueue>,
    count: usize,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<()>> {
    (0..count.max(1))
        .map(|_| {
            let worker = worker.clone();
            let queue = Arc::clone(&queue);
            let shutdown = shutdown.clone();
            tokio::spawn(worker.run(queue, shutdown))
        })
        .collect()
}
