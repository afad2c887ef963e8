//! Represents a catalog entry: a folder, a plain file or an image.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::{fmt, str::FromStr};
use uuid::Uuid;

use super::variant::SizeVariant;

/// Wire and storage value of the root sentinel.
pub const ROOT_PARENT: &str = "0";

/// The three kinds of entries the catalog knows about.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Folder,
    File,
    Image,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Folder => "folder",
            EntryKind::File => "file",
            EntryKind::Image => "image",
        }
    }

    /// Whether entries of this kind carry a canonical blob.
    pub fn has_content(&self) -> bool {
        !matches!(self, EntryKind::Folder)
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "folder" => Ok(EntryKind::Folder),
            "file" => Ok(EntryKind::File),
            "image" => Ok(EntryKind::Image),
            other => Err(format!("unknown entry kind `{other}`")),
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an entry sits in its owner's hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ParentRef {
    /// Top level, stored as [`ROOT_PARENT`].
    #[default]
    Root,
    /// Inside the folder entry with this id.
    Folder(Uuid),
}

impl ParentRef {
    /// Parse a parent filter coming from a caller.
    ///
    /// `None` and `"0"` both mean root. Anything else must be a valid entry
    /// id; `None` is returned for malformed references so callers can
    /// decide whether that is a validation failure or an empty match.
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        match raw.map(str::trim) {
            None | Some("") | Some(ROOT_PARENT) => Some(ParentRef::Root),
            Some(other) => Uuid::parse_str(other).ok().map(ParentRef::Folder),
        }
    }

    /// Column value used by the catalog.
    pub fn to_db(&self) -> String {
        match self {
            ParentRef::Root => ROOT_PARENT.to_string(),
            ParentRef::Folder(id) => id.to_string(),
        }
    }
}

impl fmt::Display for ParentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParentRef::Root => f.write_str(ROOT_PARENT),
            ParentRef::Folder(id) => write!(f, "{id}"),
        }
    }
}

impl Serialize for ParentRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Opaque name of a blob inside the content store.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContentRef(String);

impl ContentRef {
    /// A fresh, never used reference.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Reference of the derived variant at `size`, e.g. `<ref>_250`.
    pub fn variant(&self, size: SizeVariant) -> ContentRef {
        ContentRef(format!("{}_{}", self.0, size.width()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ContentRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single catalog record.
///
/// The struct holds metadata only; the bytes of files and images live in the
/// content store under `content_ref`. Serializes to the public JSON shape
/// (`id`, `userId`, `name`, `type`, `isPublic`, `parentId`), which never
/// exposes the storage reference.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Catalog-assigned identifier.
    pub id: Uuid,

    /// Principal that created the entry.
    #[serde(rename = "userId")]
    pub owner_id: Uuid,

    /// Display name; its extension drives the served mime type.
    pub name: String,

    /// Folder, file or image.
    #[serde(rename = "type")]
    pub kind: EntryKind,

    /// Whether anonymous callers may read the content.
    pub is_public: bool,

    /// Root sentinel or the containing folder.
    pub parent_id: ParentRef,

    /// Canonical blob, absent for folders.
    #[serde(skip)]
    pub content_ref: Option<ContentRef>,

    #[serde(skip)]
    pub created_at: DateTime<Utc>,
}

/// Everything the catalog needs to insert a new entry; the id is assigned on insert.
#[derive(Clone, Debug)]
pub struct NewEntry {
    pub owner_id: Uuid,
    pub name: String,
    pub kind: EntryKind,
    pub is_public: bool,
    pub parent_id: ParentRef,
    pub content_ref: Option<ContentRef>,
}
