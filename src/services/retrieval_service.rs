//! src/services/retrieval_service.rs
//!
//! RetrievalService: every read path over the catalog and content store:
//! serving content (canonical or a derived width), listing, single-entry
//! lookup, plus publish/unpublish. Callers that may not see an entry get the
//! same `NotFound` as callers asking for one that does not exist.

use bytes::Bytes;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    errors::{FilesError, FilesResult, ValidationError},
    models::{Entry, EntryKind, ParentRef, SizeVariant},
    services::{catalog::Catalog, content_store::ContentStore, session::SessionValidator},
};

/// Page size used when the caller does not pick one.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

const FALLBACK_MIME: &str = "application/octet-stream";

/// Bytes ready to be served, with the type inferred from the entry name.
#[derive(Debug, Clone)]
pub struct FetchedContent {
    pub bytes: Bytes,
    pub mime_type: String,
}

fn parse_entry_id(raw: &str) -> FilesResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| FilesError::NotFound)
}

/// Mime type from the name's extension, generic binary when unknown.
pub fn mime_for_name(name: &str) -> String {
    mime_guess::from_path(name)
        .first_raw()
        .unwrap_or(FALLBACK_MIME)
        .to_string()
}

#[derive(Clone)]
pub struct RetrievalService {
    catalog: Catalog,
    store: Arc<dyn ContentStore>,
    sessions: Arc<dyn SessionValidator>,
}

impl RetrievalService {
    pub fn new(
        catalog: Catalog,
        store: Arc<dyn ContentStore>,
        sessions: Arc<dyn SessionValidator>,
    ) -> Self {
        Self {
            catalog,
            store,
            sessions,
        }
    }

    /// Resolve and read an entry's content.
    ///
    /// Order: existence, visibility, folder check, size validation, blob
    /// presence. A variant that has not been derived yet reads as not found.
    pub async fn fetch(
        &self,
        token: Option<&str>,
        entry_id: &str,
        width: Option<u32>,
    ) -> FilesResult<FetchedContent> {
        let entry_id = parse_entry_id(entry_id)?;
        let entry = self
            .catalog
            .find_by_id(entry_id)
            .await?
            .ok_or(FilesError::NotFound)?;

        if !entry.is_public {
            let requester = match token {
                Some(token) => self.sessions.validate(token).await.unwrap_or_else(|err| {
                    // An unverifiable caller is anonymous: private entries stay hidden.
                    tracing::warn!(error = %err, "session lookup failed");
                    None
                }),
                None => None,
            };
            if requester != Some(entry.owner_id) {
                return Err(FilesError::NotFound);
            }
        }

        if entry.kind == EntryKind::Folder {
            return Err(ValidationError::FolderHasNoContent.into());
        }

        let canonical = entry.content_ref.as_ref().ok_or_else(|| {
            tracing::error!(entry_id = %entry.id, "content entry without content reference");
            FilesError::NotFound
        })?;
        let reference = match width {
            Some(width) => {
                let size = SizeVariant::from_width(width).ok_or(ValidationError::InvalidSize)?;
                canonical.variant(size)
            }
            None => canonical.clone(),
        };

        if !self.store.exists(&reference).await? {
            return Err(FilesError::NotFound);
        }
        let bytes = self.store.read(&reference).await?;

        Ok(FetchedContent {
            bytes,
            mime_type: mime_for_name(&entry.name),
        })
    }

    /// Owner-scoped lookup of a single entry.
    pub async fn get(&self, owner_id: Uuid, entry_id: &str) -> FilesResult<Entry> {
        let entry_id = parse_entry_id(entry_id)?;
        self.catalog
            .find_owned(entry_id, owner_id)
            .await?
            .ok_or(FilesError::NotFound)
    }

    /// One page of the owner's entries under `parent_id` (`None`/`"0"` = root).
    ///
    /// A malformed parent id matches nothing rather than failing.
    pub async fn list(
        &self,
        owner_id: Uuid,
        parent_id: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> FilesResult<Vec<Entry>> {
        let Some(parent) = ParentRef::parse(parent_id) else {
            return Ok(Vec::new());
        };
        let limit = i64::from(page_size);
        let skip = i64::from(page) * limit;
        self.catalog.list(owner_id, parent, skip, limit).await
    }

    /// Publish or unpublish an entry the caller owns.
    pub async fn set_visibility(
        &self,
        owner_id: Uuid,
        entry_id: &str,
        public: bool,
    ) -> FilesResult<Entry> {
        let entry_id = parse_entry_id(entry_id)?;
        let entry = self
            .catalog
            .set_public(entry_id, owner_id, public)
            .await?
            .ok_or(FilesError::NotFound)?;
        tracing::info!(entry_id = %entry.id, is_public = entry.is_public, "visibility changed");
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_follows_extension() {
        assert_eq!(mime_for_name("photo.png"), "image/png");
        assert_eq!(mime_for_name("notes.txt"), "text/plain");
        assert_eq!(mime_for_name("blob.unknownext"), FALLBACK_MIME);
        assert_eq!(mime_for_name("noext"), FALLBACK_MIME);
    }
}
