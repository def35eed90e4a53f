//! SQLite database for document metadata and chunk indexes
//!
//! One connection holds three concerns: the versioned `documents` table, the
//! `chunks` table shared by both logical indexes, and the FTS5 mirror used for
//! lexical ranking.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::{DocumentMetadata, Scope};

/// Shared SQLite handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Create or open the database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::database(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Create an in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::database(format!("Failed to open in-memory database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Run `f` with the locked connection
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        f(&mut conn)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
        "#).map_err(|e| Error::database(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(r#"
            -- One row per upload; rows are never updated
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                file_name TEXT NOT NULL,
                scope_kind TEXT NOT NULL,
                scope_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                upload_timestamp TEXT NOT NULL,
                num_chunks INTEGER NOT NULL,
                storage_locator TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_scope_file
                ON documents(scope_kind, scope_id, file_name);
            CREATE INDEX IF NOT EXISTS idx_documents_locator ON documents(storage_locator);

            -- Chunks of both logical indexes
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT NOT NULL,
                index_kind TEXT NOT NULL,
                document_id TEXT NOT NULL,
                chunk_text TEXT NOT NULL,
                embedding BLOB,
                page_number INTEGER NOT NULL,
                sequence_index INTEGER NOT NULL,
                file_name TEXT NOT NULL,
                user_id TEXT,
                group_id TEXT,
                is_default INTEGER NOT NULL DEFAULT 0,
                version INTEGER NOT NULL,
                upload_timestamp TEXT NOT NULL,
                storage_locator TEXT NOT NULL,
                PRIMARY KEY (index_kind, id)
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(index_kind, document_id);
            CREATE INDEX IF NOT EXISTS idx_chunks_user ON chunks(index_kind, user_id);
            CREATE INDEX IF NOT EXISTS idx_chunks_group ON chunks(index_kind, group_id);

            -- FTS5 mirror for lexical ranking
            CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
                chunk_text,
                file_name,
                content='chunks',
                content_rowid='rowid'
            );

            CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
                INSERT INTO chunks_fts(rowid, chunk_text, file_name)
                VALUES (NEW.rowid, NEW.chunk_text, NEW.file_name);
            END;

            CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
                INSERT INTO chunks_fts(chunks_fts, rowid, chunk_text, file_name)
                VALUES ('delete', OLD.rowid, OLD.chunk_text, OLD.file_name);
            END;

            CREATE TRIGGER IF NOT EXISTS chunks_au AFTER UPDATE ON chunks BEGIN
                INSERT INTO chunks_fts(chunks_fts, rowid, chunk_text, file_name)
                VALUES ('delete', OLD.rowid, OLD.chunk_text, OLD.file_name);
                INSERT INTO chunks_fts(rowid, chunk_text, file_name)
                VALUES (NEW.rowid, NEW.chunk_text, NEW.file_name);
            END;
        "#)
        .map_err(|e| Error::database(format!("Failed to run migrations: {}", e)))?;

        tracing::debug!("Database migrations complete");
        Ok(())
    }

    // ==================== Document Metadata ====================

    /// Highest version recorded for (file_name, scope)
    pub fn max_version(&self, file_name: &str, scope: &Scope) -> Result<Option<u32>> {
        let conn = self.conn.lock();

        let version: Option<i64> = conn.query_row(
            "SELECT MAX(version) FROM documents WHERE scope_kind = ?1 AND scope_id = ?2 AND file_name = ?3",
            params![scope.kind(), scope.owner_id(), file_name],
            |row| row.get(0),
        ).map_err(|e| Error::database(format!("Failed to read latest version: {}", e)))?;

        Ok(version.map(|v| v as u32))
    }

    /// Insert a metadata record
    pub fn insert_document(&self, doc: &DocumentMetadata) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO documents (
                id, file_name, scope_kind, scope_id, version,
                upload_timestamp, num_chunks, storage_locator
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                doc.id,
                doc.file_name,
                doc.scope.kind(),
                doc.scope.owner_id(),
                doc.version as i64,
                doc.upload_timestamp.to_rfc3339(),
                doc.num_chunks as i64,
                doc.storage_locator,
            ],
        ).map_err(|e| Error::database(format!("Failed to insert document: {}", e)))?;

        Ok(())
    }

    /// Get a metadata record by id
    pub fn get_document(&self, id: &str) -> Result<Option<DocumentMetadata>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT id, file_name, scope_kind, scope_id, version, upload_timestamp, num_chunks, storage_locator
             FROM documents WHERE id = ?1"
        ).map_err(|e| Error::database(format!("Failed to prepare query: {}", e)))?;

        let record = stmt.query_row(params![id], row_to_document)
            .optional()
            .map_err(|e| Error::database(format!("Failed to get document: {}", e)))?;

        Ok(record)
    }

    /// All versions of (file_name, scope), newest first
    pub fn list_versions(&self, file_name: &str, scope: &Scope) -> Result<Vec<DocumentMetadata>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT id, file_name, scope_kind, scope_id, version, upload_timestamp, num_chunks, storage_locator
             FROM documents
             WHERE scope_kind = ?1 AND scope_id = ?2 AND file_name = ?3
             ORDER BY version DESC, upload_timestamp DESC"
        ).map_err(|e| Error::database(format!("Failed to prepare query: {}", e)))?;

        let records = stmt
            .query_map(params![scope.kind(), scope.owner_id(), file_name], row_to_document)
            .map_err(|e| Error::database(format!("Failed to list versions: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    /// Every record in a scope
    pub fn list_scope(&self, scope: &Scope) -> Result<Vec<DocumentMetadata>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT id, file_name, scope_kind, scope_id, version, upload_timestamp, num_chunks, storage_locator
             FROM documents
             WHERE scope_kind = ?1 AND scope_id = ?2
             ORDER BY file_name, version DESC"
        ).map_err(|e| Error::database(format!("Failed to prepare query: {}", e)))?;

        let records = stmt
            .query_map(params![scope.kind(), scope.owner_id()], row_to_document)
            .map_err(|e| Error::database(format!("Failed to list documents: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    /// Records of a scope kind whose file name contains `needle` (case-insensitive)
    pub fn find_by_file_name_containing(
        &self,
        scope_kinds: &[&str],
        needle: &str,
    ) -> Result<Vec<DocumentMetadata>> {
        let conn = self.conn.lock();

        let pattern = format!("%{}%", escape_like(&needle.to_lowercase()));
        let mut stmt = conn.prepare(
            "SELECT id, file_name, scope_kind, scope_id, version, upload_timestamp, num_chunks, storage_locator
             FROM documents
             WHERE lower(file_name) LIKE ?1 ESCAPE '\\'
             ORDER BY upload_timestamp DESC"
        ).map_err(|e| Error::database(format!("Failed to prepare query: {}", e)))?;

        let records = stmt
            .query_map(params![pattern], row_to_document)
            .map_err(|e| Error::database(format!("Failed to search documents: {}", e)))?
            .filter_map(|r| match r {
                Ok(doc) => Some(doc),
                Err(e) => {
                    tracing::warn!("Error reading document row: {}", e);
                    None
                }
            })
            .filter(|doc| scope_kinds.contains(&doc.scope.kind()))
            .collect();

        Ok(records)
    }

    /// Records stored under a blob locator, newest first
    pub fn find_by_locator(&self, storage_locator: &str) -> Result<Vec<DocumentMetadata>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT id, file_name, scope_kind, scope_id, version, upload_timestamp, num_chunks, storage_locator
             FROM documents
             WHERE storage_locator = ?1
             ORDER BY upload_timestamp DESC"
        ).map_err(|e| Error::database(format!("Failed to prepare query: {}", e)))?;

        let records = stmt
            .query_map(params![storage_locator], row_to_document)
            .map_err(|e| Error::database(format!("Failed to find documents: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    /// Delete a metadata record
    pub fn delete_document(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();

        let count = conn.execute(
            "DELETE FROM documents WHERE id = ?1",
            params![id],
        ).map_err(|e| Error::database(format!("Failed to delete document: {}", e)))?;

        Ok(count > 0)
    }

    /// How many records still point at a blob
    pub fn count_locator_refs(&self, storage_locator: &str) -> Result<usize> {
        let conn = self.conn.lock();

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE storage_locator = ?1",
            params![storage_locator],
            |row| row.get(0),
        ).map_err(|e| Error::database(format!("Failed to count references: {}", e)))?;

        Ok(count as usize)
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<DocumentMetadata> {
    let kind: String = row.get(2)?;
    let owner: String = row.get(3)?;
    let scope = match kind.as_str() {
        "group" => Scope::Group(owner),
        "default" => Scope::Default,
        _ => Scope::Personal(owner),
    };
    let timestamp: String = row.get(5)?;
    let version: i64 = row.get(4)?;
    let num_chunks: i64 = row.get(6)?;

    Ok(DocumentMetadata {
        id: row.get(0)?,
        file_name: row.get(1)?,
        scope,
        version: version as u32,
        upload_timestamp: parse_timestamp(&timestamp),
        num_chunks: num_chunks as u32,
        storage_locator: row.get(7)?,
    })
}
