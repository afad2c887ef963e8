//! Core data models for the files manager.
//!
//! Entries map to rows of the SQLite catalog and serialize as JSON via
//! `serde`; derivation jobs are the JSON payload of the job queue.

pub mod entry;
pub mod job;
pub mod variant;

pub use entry::{ContentRef, Entry, EntryKind, NewEntry, ParentRef, ROOT_PARENT};
pub use job::DerivationJob;
pub use variant::SizeVariant;
