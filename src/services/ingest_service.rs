//! src/services/ingest_service.rs
//!
//! IngestService: creates catalog entries. Requests are fully validated
//! before anything is written; content is persisted before the catalog row
//! that points at it, so the catalog never references a missing blob. Image
//! entries additionally get a derivation job, on a best-effort basis.

use base64::{
    Engine as _, alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use bytes::Bytes;
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    errors::{FilesError, FilesResult, ValidationError},
    models::{ContentRef, DerivationJob, Entry, EntryKind, NewEntry, ParentRef},
    services::{catalog::Catalog, content_store::ContentStore, queue::JobQueue},
};

/// Standard alphabet, padding optional. Whitespace is stripped before decoding.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// An entry creation request as received from a caller.
///
/// Fields stay loosely typed so that validation can report exactly which
/// one is missing or wrong, in a fixed order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntry {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Root sentinel (`0` / `"0"`), an entry id, or absent for root.
    #[serde(default, deserialize_with = "string_or_number")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    /// Base64-encoded content; required unless `kind` is `folder`.
    pub data: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    }))
}

#[derive(Clone)]
pub struct IngestService {
    catalog: Catalog,
    store: Arc<dyn ContentStore>,
    queue: Arc<dyn JobQueue>,
}

impl IngestService {
    pub fn new(catalog: Catalog, store: Arc<dyn ContentStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            catalog,
            store,
            queue,
        }
    }

    /// Validate and create an entry owned by `owner_id`.
    ///
    /// Validation order: name, type, data, parent existence, parent kind.
    /// A failed enqueue does not fail the request; the image simply has no
    /// variants until a job for it is processed.
    pub async fn create(&self, owner_id: Uuid, request: CreateEntry) -> FilesResult<Entry> {
        let name = request
            .name
            .filter(|name| !name.trim().is_empty())
            .ok_or(ValidationError::MissingName)?;

        let kind: EntryKind = request
            .kind
            .as_deref()
            .and_then(|kind| kind.parse().ok())
            .ok_or(ValidationError::MissingKind)?;

        let payload = if kind.has_content() {
            let data = request
                .data
                .as_deref()
                .filter(|data| !data.trim().is_empty())
                .ok_or(ValidationError::MissingData)?;
            // Line-wrapped (MIME style) payloads are accepted.
            let compact: String = data.split_ascii_whitespace().collect();
            let decoded = PAYLOAD_ENGINE
                .decode(compact)
                .map_err(|_| ValidationError::InvalidData)?;
            Some(Bytes::from(decoded))
        } else {
            None
        };

        let parent_id = self
            .resolve_parent(owner_id, request.parent_id.as_deref())
            .await?;

        let content_ref = match payload {
            Some(bytes) => {
                let reference = ContentRef::generate();
                self.store.write(&reference, bytes).await.map_err(|err| {
                    error!(owner_id = %owner_id, error = %err, "unable to save content");
                    FilesError::Storage(err)
                })?;
                Some(reference)
            }
            None => None,
        };

        let entry = self
            .catalog
            .insert(NewEntry {
                owner_id,
                name,
                kind,
                is_public: request.is_public,
                parent_id,
                content_ref,
            })
            .await?;

        info!(entry_id = %entry.id, kind = %entry.kind, "created entry");

        if entry.kind == EntryKind::Image {
            let job = DerivationJob::new(owner_id, entry.id);
            if let Err(err) = self.queue.enqueue(&job).await {
                warn!(
                    entry_id = %entry.id,
                    error = %err,
                    "failed to enqueue derivation job; image will have no variants"
                );
            }
        }

        Ok(entry)
    }

    /// Resolve the requested parent to root or one of the owner's folders.
    async fn resolve_parent(&self, owner_id: Uuid, raw: Option<&str>) -> FilesResult<ParentRef> {
        let parent = ParentRef::parse(raw).ok_or(ValidationError::ParentNotFound)?;
        let ParentRef::Folder(parent_id) = parent else {
            return Ok(ParentRef::Root);
        };

        let folder = self
            .catalog
            .find_owned(parent_id, owner_id)
            .await?
            .ok_or(ValidationError::ParentNotFound)?;
        if folder.kind != EntryKind::Folder {
            return Err(ValidationError::ParentNotFolder.into());
        }
        Ok(parent)
    }
}
