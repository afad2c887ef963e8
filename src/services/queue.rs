//! src/services/queue.rs
//!
//! Durable derivation job queue stored in the `derivation_jobs` table.
//!
//! Delivery is at-least-once: `dequeue` leases a job for
//! [`QueueConfig::lease`], and a job that is not acked, retried or rejected
//! before the lease runs out is handed out again. Failed jobs come back after
//! an exponential backoff and are dead-lettered once `max_attempts` is spent.

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use sqlx::SqlitePool;
use std::{sync::Arc, time::Duration};
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::{
    errors::{FilesError, FilesResult},
    models::DerivationJob,
};

/// Queue tunables.
#[derive(Clone, Debug)]
pub struct QueueConfig {
    /// How long a delivery stays invisible to other consumers.
    pub lease: Duration,
    /// Upper bound between polls when no wake-up arrives.
    pub poll_interval: Duration,
    /// Deliveries before a failing job is dead-lettered.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
            max_attempts: 5,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
        }
    }
}

/// A leased job handed to a consumer.
#[derive(Clone, Debug)]
pub struct Delivery {
    pub id: i64,
    pub job: DerivationJob,
    /// 1-based delivery count, including this one.
    pub attempt: u32,
}

/// What happened to a job reported as failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { attempt: u32, delay: Duration },
    DeadLettered { attempts: u32 },
}

/// A job that will never be delivered again.
#[derive(Clone, Debug)]
pub struct DeadLetter {
    pub id: i64,
    pub job: DerivationJob,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// Producer and consumer side of the derivation pipeline.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Durably accept a job. Never waits on consumers.
    async fn enqueue(&self, job: &DerivationJob) -> FilesResult<i64>;

    /// Wait, without timeout, for the next visible job and lease it.
    async fn dequeue(&self) -> FilesResult<Delivery>;

    /// Finished: remove the job.
    async fn ack(&self, id: i64) -> FilesResult<()>;

    /// Failed but worth another try.
    async fn retry(&self, delivery: &Delivery, error: &str) -> FilesResult<RetryDecision>;

    /// Failed for good: dead-letter without further deliveries.
    async fn reject(&self, id: i64, error: &str) -> FilesResult<()>;
}

/// Exponential backoff with 0-25% jitter, capped at `max`.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let base_ms = base.as_millis() as u64;
    let max_ms = max.as_millis() as u64;
    let exp_factor = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exp_factor);

    let jitter = if delay_ms > 0 {
        rand::rng().random_range(0..=delay_ms / 4)
    } else {
        0
    };

    Duration::from_millis(delay_ms.saturating_add(jitter).min(max_ms))
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn decode_job(id: i64, payload: &str) -> DerivationJob {
    serde_json::from_str(payload).unwrap_or_else(|err| {
        warn!(job_id = id, error = %err, "undecodable job payload");
        DerivationJob::default()
    })
}

#[derive(Clone)]
pub struct SqliteJobQueue {
    db: Arc<SqlitePool>,
    config: QueueConfig,
    wake: Arc<Notify>,
}

impl SqliteJobQueue {
    pub fn new(db: Arc<SqlitePool>, config: QueueConfig) -> Self {
        Self {
            db,
            config,
            wake: Arc::new(Notify::new()),
        }
    }

    /// Lease the oldest visible job, if any, in one atomic statement.
    ///
    /// Jobs whose lease ran out on their last allowed delivery are
    /// dead-lettered first instead of being handed out again.
    pub async fn try_dequeue(&self) -> FilesResult<Option<Delivery>> {
        let now = now_millis();
        self.expire_abandoned(now).await?;
        let lease_until = now + self.config.lease.as_millis() as i64;
        let row: Option<(i64, String, i64)> = sqlx::query_as(
            "UPDATE derivation_jobs
             SET leased_until = ?, attempts = attempts + 1
             WHERE id = (
                 SELECT id FROM derivation_jobs
                 WHERE dead = 0 AND available_at <= ?
                   AND (leased_until IS NULL OR leased_until <= ?)
                 ORDER BY id ASC
                 LIMIT 1
             )
             RETURNING id, payload, attempts",
        )
        .bind(lease_until)
        .bind(now)
        .bind(now)
        .fetch_optional(&*self.db)
        .await?;

        Ok(row.map(|(id, payload, attempts)| Delivery {
            id,
            job: decode_job(id, &payload),
            attempt: attempts as u32,
        }))
    }

    /// Jobs still waiting for (or in) delivery.
    pub async fn pending(&self) -> FilesResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM derivation_jobs WHERE dead = 0")
            .fetch_one(&*self.db)
            .await?;
        Ok(count)
    }

    pub async fn dead_letters(&self) -> FilesResult<Vec<DeadLetter>> {
        let rows: Vec<(i64, String, i64, Option<String>)> = sqlx::query_as(
            "SELECT id, payload, attempts, last_error FROM derivation_jobs WHERE dead = 1 ORDER BY id",
        )
        .fetch_all(&*self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, payload, attempts, last_error)| DeadLetter {
                id,
                job: decode_job(id, &payload),
                attempts: attempts as u32,
                last_error,
            })
            .collect())
    }

    /// Dead-letter leased jobs that expired with no attempts left.
    async fn expire_abandoned(&self, now: i64) -> FilesResult<()> {
        let result = sqlx::query(
            "UPDATE derivation_jobs
             SET dead = 1, leased_until = NULL,
                 last_error = 'lease expired after ' || attempts || ' deliveries'
             WHERE dead = 0 AND leased_until IS NOT NULL AND leased_until <= ?
               AND attempts >= ?",
        )
        .bind(now)
        .bind(i64::from(self.config.max_attempts))
        .execute(&*self.db)
        .await?;

        if result.rows_affected() > 0 {
            warn!(
                jobs = result.rows_affected(),
                "dead-lettered jobs abandoned on their last delivery"
            );
        }
        Ok(())
    }

    async fn mark_dead(&self, id: i64, error: &str) -> FilesResult<()> {
        sqlx::query(
            "UPDATE derivation_jobs SET dead = 1, leased_until = NULL, last_error = ? WHERE id = ?",
        )
        .bind(error)
        .bind(id)
        .execute(&*self.db)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    async fn enqueue(&self, job: &DerivationJob) -> FilesResult<i64> {
        let payload = serde_json::to_string(job)
            .map_err(|err| FilesError::Upstream(err.to_string()))?;
        let now = now_millis();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO derivation_jobs (payload, attempts, available_at, enqueued_at)
             VALUES (?, 0, ?, ?) RETURNING id",
        )
        .bind(payload)
        .bind(now)
        .bind(now)
        .fetch_one(&*self.db)
        .await?;

        self.wake.notify_one();
        debug!(job_id = id, "enqueued derivation job");
        Ok(id)
    }

    async fn dequeue(&self) -> FilesResult<Delivery> {
        loop {
            if let Some(delivery) = self.try_dequeue().await? {
                debug!(job_id = delivery.id, attempt = delivery.attempt, "leased job");
                return Ok(delivery);
            }
            tokio::select! {
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    async fn ack(&self, id: i64) -> FilesResult<()> {
        sqlx::query("DELETE FROM derivation_jobs WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    async fn retry(&self, delivery: &Delivery, error: &str) -> FilesResult<RetryDecision> {
        if delivery.attempt >= self.config.max_attempts {
            self.mark_dead(delivery.id, error).await?;
            return Ok(RetryDecision::DeadLettered {
                attempts: delivery.attempt,
            });
        }

        let delay = calculate_backoff(
            delivery.attempt,
            self.config.backoff_base,
            self.config.backoff_max,
        );
        sqlx::query(
            "UPDATE derivation_jobs
             SET leased_until = NULL, available_at = ?, last_error = ?
             WHERE id = ?",
        )
        .bind(now_millis() + delay.as_millis() as i64)
        .bind(error)
        .bind(delivery.id)
        .execute(&*self.db)
        .await?;

        Ok(RetryDecision::Retry {
            attempt: delivery.attempt,
            delay,
        })
    }

    async fn reject(&self, id: i64, error: &str) -> FilesResult<()> {
        self.mark_dead(id, error).await
    }
}
