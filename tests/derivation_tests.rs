mod common;

use std::{sync::Arc, time::Duration};

use common::{FlakyStore, Harness, file, image, png};
use files_manager::{
    models::{ContentRef, DerivationJob, Entry, SizeVariant},
    services::{
        content_store::ContentStore,
        derivation::{DerivationError, DerivationWorker, spawn_workers},
        queue::{JobQueue, QueueConfig},
    },
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

async fn variant_width(store: &dyn ContentStore, reference: &ContentRef) -> (u32, u32) {
    let bytes = store.read(reference).await.expect("variant stored");
    let decoded = image::load_from_memory(&bytes).expect("variant decodes");
    (decoded.width(), decoded.height())
}

fn canonical(entry: &Entry) -> ContentRef {
    entry.content_ref.clone().expect("entry has content")
}

#[tokio::test]
async fn process_writes_every_width() {
    let h = Harness::new().await;
    let (user, _) = h.login().await;
    let entry = h.ingest.create(user, image("wide.png", &png(800, 600), None)).await.unwrap();

    h.worker.process(&DerivationJob::new(user, entry.id)).await.unwrap();

    let reference = canonical(&entry);
    assert_eq!(variant_width(h.store.as_ref(), &reference.variant(SizeVariant::W500)).await, (500, 375));
    assert_eq!(variant_width(h.store.as_ref(), &reference.variant(SizeVariant::W250)).await, (250, 188));
    assert_eq!(variant_width(h.store.as_ref(), &reference.variant(SizeVariant::W100)).await, (100, 75));

    // The canonical blob is untouched.
    assert_eq!(variant_width(h.store.as_ref(), &reference).await, (800, 600));
}

#[tokio::test]
async fn reprocessing_is_idempotent() {
    let h = Harness::new().await;
    let (user, _) = h.login().await;
    let entry = h.ingest.create(user, image("cat.png", &png(320, 200), None)).await.unwrap();
    let job = DerivationJob::new(user, entry.id);
    let small = canonical(&entry).variant(SizeVariant::W100);

    h.worker.process(&job).await.unwrap();
    let first = h.store.read(&small).await.unwrap();
    h.worker.process(&job).await.unwrap();
    let second = h.store.read(&small).await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn jobs_missing_ids_are_permanent_failures() {
    let h = Harness::new().await;
    let user = Uuid::new_v4();

    let no_entry = DerivationJob {
        owner_id: Some(user.to_string()),
        entry_id: None,
    };
    let err = h.worker.process(&no_entry).await.unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(err.to_string(), "Missing fileId");

    let no_owner = DerivationJob {
        owner_id: None,
        entry_id: Some(Uuid::new_v4().to_string()),
    };
    let err = h.worker.process(&no_owner).await.unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(err.to_string(), "Missing userId");

    let malformed = DerivationJob {
        owner_id: Some(user.to_string()),
        entry_id: Some("42".into()),
    };
    assert!(!h.worker.process(&malformed).await.unwrap_err().is_retryable());
}

#[tokio::test]
async fn unknown_or_foreign_entries_are_not_found() {
    let h = Harness::new().await;
    let (owner, _) = h.login().await;
    let (stranger, _) = h.login().await;
    let entry = h.ingest.create(owner, image("a.png", &png(20, 20), None)).await.unwrap();

    let err = h
        .worker
        .process(&DerivationJob::new(owner, Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(&err, DerivationError::Permanent(msg) if msg == "File not found"));

    let err = h
        .worker
        .process(&DerivationJob::new(stranger, entry.id))
        .await
        .unwrap_err();
    assert!(matches!(&err, DerivationError::Permanent(msg) if msg == "File not found"));
    assert!(!h.store.exists(&canonical(&entry).variant(SizeVariant::W100)).await.unwrap());
}

#[tokio::test]
async fn undecodable_content_is_permanent() {
    let h = Harness::new().await;
    let (user, _) = h.login().await;
    let entry = h.ingest.create(user, file("notes.txt", b"plain text", None)).await.unwrap();

    let err = h.worker.process(&DerivationJob::new(user, entry.id)).await.unwrap_err();
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn handle_acks_successful_jobs() {
    let h = Harness::new().await;
    let (user, _) = h.login().await;
    let entry = h.ingest.create(user, image("a.png", &png(120, 80), None)).await.unwrap();

    h.drain_queue().await;

    assert_eq!(h.queue.pending().await.unwrap(), 0);
    assert!(h.queue.dead_letters().await.unwrap().is_empty());
    for size in SizeVariant::ALL {
        assert!(h.store.exists(&canonical(&entry).variant(size)).await.unwrap());
    }
}

#[tokio::test]
async fn handle_dead_letters_permanent_failures() {
    let h = Harness::new().await;
    let (user, _) = h.login().await;
    h.queue.enqueue(&DerivationJob::new(user, Uuid::new_v4())).await.unwrap();

    h.drain_queue().await;

    assert_eq!(h.queue.pending().await.unwrap(), 0);
    let dead = h.queue.dead_letters().await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempts, 1);
    assert_eq!(dead[0].last_error.as_deref(), Some("File not found"));
}

#[tokio::test]
async fn transient_failures_retry_then_dead_letter() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn ContentStore> = Arc::new(FlakyStore::new(dir.path(), false, true).await);
    let h = Harness::with_store(store).await;
    let (user, _) = h.login().await;
    h.ingest.create(user, image("a.png", &png(40, 40), None)).await.unwrap();

    // First delivery fails and is put back for another try.
    let delivery = h.queue.try_dequeue().await.unwrap().expect("job");
    let err = h.worker.process(&delivery.job).await.unwrap_err();
    assert!(err.is_retryable());
    h.worker.handle(h.queue.as_ref(), delivery).await.unwrap();
    assert_eq!(h.queue.pending().await.unwrap(), 1);
    assert!(h.queue.dead_letters().await.unwrap().is_empty());

    // The rest of the attempt budget is spent the same way.
    h.drain_queue().await;
    assert_eq!(h.queue.pending().await.unwrap(), 0);
    let dead = h.queue.dead_letters().await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempts, 3);
}

#[tokio::test]
async fn spawned_workers_derive_enqueued_images() {
    let h = Harness::with_queue_config(QueueConfig {
        poll_interval: Duration::from_millis(10),
        ..common::fast_queue()
    })
    .await;
    let (user, _) = h.login().await;

    let shutdown = CancellationToken::new();
    let queue: Arc<dyn JobQueue> = h.queue.clone();
    let handles = spawn_workers(
        DerivationWorker::new(h.catalog.clone(), h.store.clone()),
        queue,
        2,
        shutdown.clone(),
    );

    let entry = h.ingest.create(user, image("live.png", &png(600, 300), None)).await.unwrap();
    let smallest = canonical(&entry).variant(SizeVariant::W100);

    let derived = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if h.queue.pending().await.unwrap() == 0 && h.store.exists(&smallest).await.unwrap() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(derived.is_ok(), "workers did not derive variants in time");

    shutdown.cancel();
    for handle in handles {
        handle.await.unwrap();
    }
}
