//! Storage module for persistent data storage
//!
//! Provides SQLite-based persistence for document versions and both chunk indexes.

mod database;
mod document_store;
mod search_index;
mod sqlite_index;

pub use database::Database;
pub use document_store::DocumentStore;
pub use search_index::{IndexReport, SearchIndex};
pub use sqlite_index::SqliteSearchBackend;
