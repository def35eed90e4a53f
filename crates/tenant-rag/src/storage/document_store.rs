//! Versioned document records and their cascading deletes
//!
//! A logical document is a (file_name, scope) pair; every upload of it creates a new
//! [`DocumentMetadata`] with the next version number. Deleting a version removes its
//! chunks, its record and, once nothing else references it, its blob.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::providers::BlobStore;
use crate::types::{DocumentMetadata, Scope};

use super::database::Database;
use super::search_index::SearchIndex;

/// Metadata store with blob and index cascades
#[derive(Clone)]
pub struct DocumentStore {
    db: Database,
    blobs: Arc<dyn BlobStore>,
    index: SearchIndex,
}

impl DocumentStore {
    pub fn new(db: Database, blobs: Arc<dyn BlobStore>, index: SearchIndex) -> Self {
        Self { db, blobs, index }
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    /// Version the next upload of (file_name, scope) would get
    pub fn next_version(&self, file_name: &str, scope: &Scope) -> Result<u32> {
        Ok(self.db.max_version(file_name, scope)?.unwrap_or(0) + 1)
    }

    /// Record a new upload as the next version.
    ///
    /// The version is read and then written without isolation, so two concurrent
    /// uploads of the same file can both receive the same number.
    pub fn create_version(
        &self,
        file_name: &str,
        scope: &Scope,
        storage_locator: &str,
        num_chunks: u32,
    ) -> Result<DocumentMetadata> {
        let version = self.next_version(file_name, scope)?;
        self.record_version(file_name, scope, storage_locator, num_chunks, version)
    }

    /// Write half of [`Self::create_version`]
    pub(crate) fn record_version(
        &self,
        file_name: &str,
        scope: &Scope,
        storage_locator: &str,
        num_chunks: u32,
        version: u32,
    ) -> Result<DocumentMetadata> {
        let metadata = DocumentMetadata {
            id: Uuid::new_v4().to_string(),
            file_name: file_name.to_string(),
            scope: scope.clone(),
            version,
            upload_timestamp: Utc::now(),
            num_chunks,
            storage_locator: storage_locator.to_string(),
        };
        self.db.insert_document(&metadata)?;

        tracing::info!(
            "Created {} v{} in {} (id: {})",
            metadata.file_name,
            metadata.version,
            metadata.scope,
            metadata.id
        );
        Ok(metadata)
    }

    pub fn latest_version(&self, file_name: &str, scope: &Scope) -> Result<Option<u32>> {
        self.db.max_version(file_name, scope)
    }

    pub fn get(&self, document_id: &str) -> Result<Option<DocumentMetadata>> {
        self.db.get_document(document_id)
    }

    /// A record, only if it carries the given version
    pub fn get_version(&self, document_id: &str, version: u32) -> Result<Option<DocumentMetadata>> {
        Ok(self
            .db
            .get_document(document_id)?
            .filter(|doc| doc.version == version))
    }

    /// Every version of the logical document behind `document_id`, newest first
    pub fn list_versions(&self, document_id: &str) -> Result<Vec<DocumentMetadata>> {
        match self.db.get_document(document_id)? {
            Some(doc) => self.db.list_versions(&doc.file_name, &doc.scope),
            None => Ok(Vec::new()),
        }
    }

    /// Latest record per file name in a scope
    pub fn list_latest_per_file(&self, scope: &Scope) -> Result<BTreeMap<String, DocumentMetadata>> {
        let mut latest: BTreeMap<String, DocumentMetadata> = BTreeMap::new();
        for doc in self.db.list_scope(scope)? {
            match latest.get(&doc.file_name) {
                Some(current) if current.version >= doc.version => {}
                _ => {
                    latest.insert(doc.file_name.clone(), doc);
                }
            }
        }
        Ok(latest)
    }

    /// Records of the given scope kinds whose file name contains `needle`
    /// Records whose raw bytes live at `storage_locator`
    pub fn find_by_locator(&self, storage_locator: &str) -> Result<Vec<DocumentMetadata>> {
        self.db.find_by_locator(storage_locator)
    }

    pub fn find_by_file_name_containing(
        &self,
        scope_kinds: &[&str],
        needle: &str,
    ) -> Result<Vec<DocumentMetadata>> {
        self.db.find_by_file_name_containing(scope_kinds, needle)
    }

    /// Delete one version with its chunks and, if unreferenced, its blob
    pub async fn delete_version(&self, document_id: &str, version: u32) -> Result<()> {
        let doc = self.get_version(document_id, version)?.ok_or_else(|| {
            Error::DocumentNotFound(format!("{} v{}", document_id, version))
        })?;
        self.delete_record(&doc).await
    }

    /// Delete every version of the logical document behind `document_id`
    pub async fn delete_all_versions(&self, document_id: &str) -> Result<usize> {
        let versions = self.list_versions(document_id)?;
        if versions.is_empty() {
            return Err(Error::DocumentNotFound(document_id.to_string()));
        }

        let count = versions.len();
        for doc in &versions {
            self.delete_record(doc).await?;
        }
        Ok(count)
    }

    async fn delete_record(&self, doc: &DocumentMetadata) -> Result<()> {
        let removed = self
            .index
            .delete_by_document_id(doc.scope.index(), &doc.id, Some(doc.version))
            .await?;

        self.db.delete_document(&doc.id)?;

        if self.db.count_locator_refs(&doc.storage_locator)? == 0 {
            if let Err(e) = self.blobs.delete(&doc.storage_locator).await {
                tracing::warn!("Failed to delete blob {}: {}", doc.storage_locator, e);
            }
        }

        tracing::info!(
            "Deleted {} v{} ({} chunks) from {}",
            doc.file_name,
            doc.version,
            removed,
            doc.scope
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::LocalBlobStore;
    use crate::storage::SqliteSearchBackend;
    use crate::types::{Chunk, IndexKind};
    use bytes::Bytes;
    use tempfile::TempDir;

    struct Fixture {
        store: DocumentStore,
        backend: Arc<SqliteSearchBackend>,
        _dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let db = Database::in_memory().unwrap();
        let backend = Arc::new(SqliteSearchBackend::new(db.clone(), 0.5));
        let index = SearchIndex::new(backend.clone(), 100);
        let blobs = Arc::new(LocalBlobStore::new(dir.path()).await.unwrap());
        Fixture {
            store: DocumentStore::new(db, blobs, index),
            backend,
            _dir: dir,
        }
    }

    async fn upload(f: &Fixture, file_name: &str, scope: &Scope, chunks: u32) -> DocumentMetadata {
        let locator = f
            .store
            .blobs()
            .put(file_name, Bytes::from_static(b"bytes"), "text/plain")
            .await
            .unwrap();
        let meta = f.store.create_version(file_name, scope, &locator, chunks).unwrap();
        let chunks: Vec<Chunk> = (0..chunks)
            .map(|i| Chunk::from_metadata(&meta, i, format!("text {}", i), 1, None))
            .collect();
        f.store.index.index_chunks(&chunks).await;
        meta
    }

    #[tokio::test]
    async fn test_versions_increase_per_scope() {
        let f = fixture().await;
        let alice = Scope::Personal("alice".into());

        let v1 = upload(&f, "a.txt", &alice, 1).await;
        let v2 = upload(&f, "a.txt", &alice, 1).await;
        let other = upload(&f, "a.txt", &Scope::Group("g".into()), 1).await;

        assert_eq!((v1.version, v2.version, other.version), (1, 2, 1));
        assert_ne!(v1.id, v2.id);
        assert_eq!(f.store.latest_version("a.txt", &alice).unwrap(), Some(2));

        let latest = f.store.list_latest_per_file(&alice).unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest["a.txt"].version, 2);

        let history = f.store.list_versions(&v1.id).unwrap();
        assert_eq!(history.iter().map(|d| d.version).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[tokio::test]
    async fn test_concurrent_uploads_can_store_duplicate_versions() {
        let f = fixture().await;
        let scope = Scope::Default;
        f.store.create_version("race.txt", &scope, "local://a/race.txt", 1).unwrap();

        // Both uploads read the version before either writes
        let first = f.store.next_version("race.txt", &scope).unwrap();
        let second = f.store.next_version("race.txt", &scope).unwrap();
        let a = f.store.record_version("race.txt", &scope, "local://b/race.txt", 1, first).unwrap();
        let b = f.store.record_version("race.txt", &scope, "local://c/race.txt", 1, second).unwrap();

        assert_ne!(a.id, b.id);
        let versions: Vec<u32> = f
            .store
            .list_versions(&a.id)
            .unwrap()
            .iter()
            .map(|d| d.version)
            .collect();
        assert_eq!(versions, vec![2, 2, 1]);
        assert_eq!(f.store.latest_version("race.txt", &scope).unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_delete_version_keeps_other_versions() {
        let f = fixture().await;
        let alice = Scope::Personal("alice".into());
        let v1 = upload(&f, "a.txt", &alice, 3).await;
        let v2 = upload(&f, "a.txt", &alice, 2).await;
        assert_eq!(f.backend.count(IndexKind::Personal).unwrap(), 5);

        f.store.delete_version(&v1.id, 1).await.unwrap();

        assert!(f.store.get(&v1.id).unwrap().is_none());
        assert!(f.store.get_version(&v2.id, 2).unwrap().is_some());
        assert_eq!(f.store.latest_version("a.txt", &alice).unwrap(), Some(2));
        assert_eq!(f.backend.count(IndexKind::Personal).unwrap(), 2);
        assert!(f.store.blobs().get(&v1.storage_locator).await.is_err());
        assert!(f.store.blobs().get(&v2.storage_locator).await.is_ok());

        // version mismatch is not found
        assert!(matches!(
            f.store.delete_version(&v2.id, 1).await,
            Err(Error::DocumentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_all_versions() {
        let f = fixture().await;
        let group = Scope::Group("team".into());
        let v1 = upload(&f, "plan.txt", &group, 2).await;
        upload(&f, "plan.txt", &group, 2).await;
        let kept = upload(&f, "other.txt", &group, 1).await;

        assert_eq!(f.store.delete_all_versions(&v1.id).await.unwrap(), 2);
        assert_eq!(f.store.latest_version("plan.txt", &group).unwrap(), None);
        assert_eq!(f.backend.count(IndexKind::Group).unwrap(), 1);
        assert!(f.store.get(&kept.id).unwrap().is_some());
        assert!(f.store.delete_all_versions(&v1.id).await.is_err());
    }
}
