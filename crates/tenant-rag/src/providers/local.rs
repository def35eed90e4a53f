//! Filesystem blob store
//!
//! Each blob lives in its own directory `{root}/{uuid}/` holding the bytes under the
//! original file name plus a small `blob.json` sidecar with the content type.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{Error, Result};

use super::blob_store::{BlobProperties, BlobStore};

const LOCATOR_SCHEME: &str = "local://";
const SIDECAR: &str = "blob.json";

#[derive(Serialize, Deserialize)]
struct Sidecar {
    content_type: String,
    content_hash: String,
}

/// Local blob store using the filesystem
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    /// Create a store rooted at `root`, creating the directory if needed
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            Error::storage(format!("Failed to create blob dir {}: {}", root.display(), e))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a locator to `(blob dir, file path)`
    fn resolve(&self, locator: &str) -> Result<(PathBuf, PathBuf)> {
        let rest = locator
            .strip_prefix(LOCATOR_SCHEME)
            .ok_or_else(|| Error::storage(format!("Not a local locator: {}", locator)))?;
        let (id, name) = rest
            .split_once('/')
            .ok_or_else(|| Error::storage(format!("Malformed locator: {}", locator)))?;
        let id = Uuid::parse_str(id)
            .map_err(|_| Error::storage(format!("Malformed locator: {}", locator)))?;
        if !is_plain_name(name) {
            return Err(Error::storage(format!("Malformed locator: {}", locator)));
        }
        let dir = self.root.join(id.to_string());
        let file = dir.join(name);
        Ok((dir, file))
    }
}

/// A single path component with no traversal
fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\']) && name != SIDECAR
}

/// Keep only the final component of a client-supplied file name
fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if is_plain_name(base) {
        base.to_string()
    } else {
        "upload.bin".to_string()
    }
}

fn hash_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, file_name: &str, data: Bytes, content_type: &str) -> Result<String> {
        let id = Uuid::new_v4();
        let name = sanitize_file_name(file_name);
        let dir = self.root.join(id.to_string());

        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&name), &data).await?;

        let sidecar = Sidecar {
            content_type: content_type.to_string(),
            content_hash: hash_hex(&data),
        };
        tokio::fs::write(dir.join(SIDECAR), serde_json::to_vec(&sidecar)?).await?;

        let locator = format!("{}{}/{}", LOCATOR_SCHEME, id, name);
        tracing::debug!("Stored blob {} ({} bytes)", locator, data.len());
        Ok(locator)
    }

    async fn get(&self, locator: &str) -> Result<Bytes> {
        let (_, file) = self.resolve(locator)?;
        match tokio::fs::read(&file).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::DocumentNotFound(locator.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, locator: &str) -> Result<()> {
        let (dir, _) = self.resolve(locator)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                tracing::debug!("Deleted blob {}", locator);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage(format!("Failed to delete {}: {}", locator, e))),
        }
    }

    async fn properties(&self, locator: &str) -> Result<BlobProperties> {
        let (dir, file) = self.resolve(locator)?;
        let meta = match tokio::fs::metadata(&file).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::DocumentNotFound(locator.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let sidecar: Sidecar = match tokio::fs::read(dir.join(SIDECAR)).await {
            Ok(raw) => serde_json::from_slice(&raw)?,
            Err(_) => {
                let data = tokio::fs::read(&file).await?;
                Sidecar {
                    content_type: crate::types::document::content_type_for(
                        &file.file_name().unwrap_or_default().to_string_lossy(),
                    ),
                    content_hash: hash_hex(&data),
                }
            }
        };

        Ok(BlobProperties {
            locator: locator.to_string(),
            content_type: sidecar.content_type,
            size: meta.len(),
            content_hash: sidecar.content_hash,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(tokio::fs::metadata(&self.root).await.map(|m| m.is_dir()).unwrap_or(false))
    }

    fn name(&self) -> &str {
        "local-fs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_get_properties_delete() {
        let tmp = TempDir::new().unwrap();
        let store = LocalBlobStore::new(tmp.path()).await.unwrap();

        let locator = store
            .put("notes.txt", Bytes::from_static(b"hello"), "text/plain")
            .await
            .unwrap();
        assert!(locator.starts_with("local://"));
        assert!(locator.ends_with("/notes.txt"));

        assert_eq!(store.get(&locator).await.unwrap(), Bytes::from_static(b"hello"));

        let props = store.properties(&locator).await.unwrap();
        assert_eq!(props.content_type, "text/plain");
        assert_eq!(props.size, 5);
        assert_eq!(props.content_hash.len(), 64);

        store.delete(&locator).await.unwrap();
        assert!(matches!(
            store.get(&locator).await,
            Err(Error::DocumentNotFound(_))
        ));
        // Idempotent
        store.delete(&locator).await.unwrap();
    }

    #[tokio::test]
    async fn test_traversal_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = LocalBlobStore::new(tmp.path()).await.unwrap();

        let locator = store
            .put("../../etc/passwd", Bytes::from_static(b"x"), "text/plain")
            .await
            .unwrap();
        assert!(locator.ends_with("/passwd"));

        let bad = format!("local://{}/../x", Uuid::new_v4());
        assert!(store.get(&bad).await.is_err());
        assert!(store.get("s3://bucket/key").await.is_err());
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("a/b/c.pdf"), "c.pdf");
        assert_eq!(sanitize_file_name("C:\\docs\\x.txt"), "x.txt");
        assert_eq!(sanitize_file_name(".."), "upload.bin");
        assert_eq!(sanitize_file_name(""), "upload.bin");
    }
}
