//! src/services/catalog.rs
//!
//! Catalog: entry metadata in SQLite. One row per folder, file or image;
//! ids are assigned here on insert. Every operation is a single statement so
//! the catalog never needs multi-row transactions.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    errors::{FilesError, FilesResult},
    models::{ContentRef, Entry, EntryKind, NewEntry, ParentRef},
};

const ENTRY_COLUMNS: &str =
    "id, owner_id, name, kind, is_public, parent_id, content_ref, created_at";

/// Raw `entries` row; ids are stored as hyphenated text.
#[derive(FromRow, Debug)]
struct EntryRow {
    id: String,
    owner_id: String,
    name: String,
    kind: String,
    is_public: bool,
    parent_id: String,
    content_ref: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<EntryRow> for Entry {
    type Error = FilesError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        let corrupt = |field: &str| {
            tracing::error!(entry_id = %row.id, field, "corrupt catalog row");
            FilesError::Upstream(format!("corrupt catalog row ({field})"))
        };
        let id = Uuid::parse_str(&row.id).map_err(|_| corrupt("id"))?;
        let owner_id = Uuid::parse_str(&row.owner_id).map_err(|_| corrupt("owner_id"))?;
        let kind: EntryKind = row.kind.parse().map_err(|_| corrupt("kind"))?;
        let parent_id = ParentRef::parse(Some(&row.parent_id)).ok_or_else(|| corrupt("parent_id"))?;

        Ok(Entry {
            id,
            owner_id,
            name: row.name,
            kind,
            is_public: row.is_public,
            parent_id,
            content_ref: row.content_ref.map(ContentRef::from),
            created_at: row.created_at,
        })
    }
}

#[derive(Clone)]
pub struct Catalog {
    /// Shared SQLite connection pool used for metadata operations.
    db: Arc<SqlitePool>,
}

impl Catalog {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Insert a new entry and return it with its freshly assigned id.
    pub async fn insert(&self, entry: NewEntry) -> FilesResult<Entry> {
        let sql = format!(
            "INSERT INTO entries ({ENTRY_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING {ENTRY_COLUMNS}"
        );
        let row: EntryRow = sqlx::query_as(&sql)
            .bind(Uuid::new_v4().to_string())
            .bind(entry.owner_id.to_string())
            .bind(&entry.name)
            .bind(entry.kind.as_str())
            .bind(entry.is_public)
            .bind(entry.parent_id.to_db())
            .bind(entry.content_ref.as_ref().map(|r| r.as_str().to_string()))
            .bind(Utc::now())
            .fetch_one(&*self.db)
            .await?;
        row.try_into()
    }

    /// Look up an entry regardless of owner.
    pub async fn find_by_id(&self, id: Uuid) -> FilesResult<Option<Entry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?");
        let row: Option<EntryRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&*self.db)
            .await?;
        row.map(Entry::try_from).transpose()
    }

    /// Look up an entry only if `owner_id` owns it.
    pub async fn find_owned(&self, id: Uuid, owner_id: Uuid) -> FilesResult<Option<Entry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ? AND owner_id = ?");
        let row: Option<EntryRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .bind(owner_id.to_string())
            .fetch_optional(&*self.db)
            .await?;
        row.map(Entry::try_from).transpose()
    }

    /// Owner's entries directly under `parent`, in insertion order.
    pub async fn list(
        &self,
        owner_id: Uuid,
        parent: ParentRef,
        skip: i64,
        limit: i64,
    ) -> FilesResult<Vec<Entry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE owner_id = ? AND parent_id = ? \
             ORDER BY rowid ASC LIMIT ? OFFSET ?"
        );
        let rows: Vec<EntryRow> = sqlx::query_as(&sql)
            .bind(owner_id.to_string())
            .bind(parent.to_db())
            .bind(limit)
            .bind(skip)
            .fetch_all(&*self.db)
            .await?;
        rows.into_iter().map(Entry::try_from).collect()
    }

    /// Atomically set `is_public`, returning the updated row when the entry
    /// exists and belongs to `owner_id`.
    pub async fn set_public(
        &self,
        id: Uuid,
        owner_id: Uuid,
        is_public: bool,
    ) -> FilesResult<Option<Entry>> {
        let sql = format!(
            "UPDATE entries SET is_public = ? WHERE id = ? AND owner_id = ? RETURNING {ENTRY_COLUMNS}"
        );
        let row: Option<EntryRow> = sqlx::query_as(&sql)
            .bind(is_public)
            .bind(id.to_string())
            .bind(owner_id.to_string())
            .fetch_optional(&*self.db)
            .await?;
        row.map(Entry::try_from).transpose()
    }
}
