//! src/services/content_store.rs
//!
//! ContentStore: raw blob persistence on local disk. Blobs are addressed by
//! an opaque [`ContentRef`] and sharded beneath
//! `base_path/{shard}/{shard}/{ref}` so no single directory grows unbounded.
//! The store knows nothing about the catalog.

use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

use crate::models::ContentRef;

const MAX_REF_LEN: usize = 256;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("blob `{0}` not found")]
    NotFound(String),
    #[error("invalid content reference")]
    InvalidRef,
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type ContentResult<T> = Result<T, ContentError>;

/// Blob persistence used by ingest, the derivation worker and retrieval.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store `data` under `reference`, replacing any previous blob.
    async fn write(&self, reference: &ContentRef, data: Bytes) -> ContentResult<()>;

    /// Read the whole blob; `ContentError::NotFound` when absent.
    async fn read(&self, reference: &ContentRef) -> ContentResult<Bytes>;

    async fn exists(&self, reference: &ContentRef) -> ContentResult<bool>;

    /// Readiness probe: the backing medium accepts writes and reads them back.
    async fn ready(&self) -> ContentResult<()>;
}

/// Filesystem-backed content store.
#[derive(Clone, Debug)]
pub struct FsContentStore {
    /// Base directory on disk where blobs are stored.
    base_path: PathBuf,
}

impl FsContentStore {
    /// Create a store rooted at `base_path`, creating the directory if needed.
    pub async fn new(base_path: impl Into<PathBuf>) -> ContentResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Reject references that could escape the base directory.
    fn ensure_ref_safe(reference: &ContentRef) -> ContentResult<()> {
        let value = reference.as_str();
        if value.is_empty() || value.len() > MAX_REF_LEN {
            return Err(ContentError::InvalidRef);
        }
        if value.starts_with('.') || value.contains("..") {
            return Err(ContentError::InvalidRef);
        }
        if value
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'/' || b == b'\\')
        {
            return Err(ContentError::InvalidRef);
        }
        Ok(())
    }

    /// Two-level shard identifiers: first two bytes of MD5(ref) as hex.
    fn shards(reference: &ContentRef) -> (String, String) {
        let digest = md5::compute(reference.as_str());
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Fully-qualified blob path; parent directories may not exist yet.
    fn blob_path(&self, reference: &ContentRef) -> PathBuf {
        let (shard_a, shard_b) = Self::shards(reference);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(reference.as_str());
        path
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    /// Writes to a temporary sibling, fsyncs, then renames into place so
    /// readers never observe a half-written blob.
    async fn write(&self, reference: &ContentRef, data: Bytes) -> ContentResult<()> {
        Self::ensure_ref_safe(reference)?;
        let file_path = self.blob_path(reference);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| io::Error::other("blob path missing parent directory"))?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;
        if let Err(err) = file.write_all(&data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ContentError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ContentError::Io(err));
        }
        drop(file);

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(ContentError::Io(err));
            }
        }

        debug!(path = %file_path.display(), bytes = data.len(), "stored blob");
        Ok(())
    }

    async fn read(&self, reference: &ContentRef) -> ContentResult<Bytes> {
        Self::ensure_ref_safe(reference)?;
        match fs::read(self.blob_path(reference)).await {
            Ok(content) => Ok(Bytes::from(content)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(ContentError::NotFound(reference.to_string()))
            }
            Err(err) => Err(ContentError::Io(err)),
        }
    }

    async fn exists(&self, reference: &ContentRef) -> ContentResult<bool> {
        Self::ensure_ref_safe(reference)?;
        Ok(fs::try_exists(self.blob_path(reference)).await?)
    }

    async fn ready(&self) -> ContentResult<()> {
        let tmp_path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"readyz").await?;
        let read_back = fs::read(&tmp_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        if read_back? != b"readyz" {
            return Err(ContentError::Io(io::Error::other("file content mismatch")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> (FsContentStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContentStore::new(dir.path().join("blobs")).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn write_then_read() {
        let (store, _dir) = temp_store().await;
        let reference = ContentRef::generate();
        store
            .write(&reference, Bytes::from_static(b"hello"))
            .await
            .unwrap();
        assert_eq!(&store.read(&reference).await.unwrap()[..], b"hello");
        assert!(store.exists(&reference).await.unwrap());
    }

    #[tokio::test]
    async fn write_overwrites_previous_blob() {
        let (store, _dir) = temp_store().await;
        let reference = ContentRef::generate();
        store.write(&reference, Bytes::from_static(b"v1")).await.unwrap();
        store.write(&reference, Bytes::from_static(b"v2")).await.unwrap();
        assert_eq!(&store.read(&reference).await.unwrap()[..], b"v2");
    }

    #[tokio::test]
    async fn missing_blob_is_not_found() {
        let (store, _dir) = temp_store().await;
        let reference = ContentRef::generate();
        assert!(!store.exists(&reference).await.unwrap());
        assert!(matches!(
            store.read(&reference).await,
            Err(ContentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn traversal_refs_are_rejected() {
        let (store, _dir) = temp_store().await;
        for bad in ["../etc/passwd", "a/b", "", ".hidden"] {
            let reference = ContentRef::from(bad.to_string());
            assert!(matches!(
                store.write(&reference, Bytes::new()).await,
                Err(ContentError::InvalidRef)
            ));
        }
    }

    #[tokio::test]
    async fn blobs_are_sharded_below_base() {
        let (store, _dir) = temp_store().await;
        let reference = ContentRef::generate();
        store.write(&reference, Bytes::from_static(b"x")).await.unwrap();
        let path = store.blob_path(&reference);
        assert!(path.starts_with(store.base_path()));
        assert_eq!(path.components().count(), store.base_path().components().count() + 3);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn ready_probe_leaves_no_files() {
        let (store, _dir) = temp_store().await;
        store.ready().await.unwrap();
        let mut entries = fs::read_dir(store.base_path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }
}
