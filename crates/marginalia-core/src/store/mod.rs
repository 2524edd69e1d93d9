//! Content Store (C2): the relational store of record for `ContentRecord`s,
//! their annotations, and processing runs.

mod migrations;
mod sqlite;

pub use sqlite::{normalize_source_url, ContentStore, Result, SaveOutcome, StorageError};
