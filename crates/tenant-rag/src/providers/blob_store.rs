//! Blob store provider trait for raw uploaded bytes

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

use crate::error::Result;

/// Properties of a stored blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlobProperties {
    pub locator: String,
    pub content_type: String,
    pub size: u64,
    /// Hex SHA-256 of the content
    pub content_hash: String,
}

/// Trait for raw document storage
///
/// Implementations:
/// - `LocalBlobStore`: Local filesystem
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under a fresh locator and return it
    async fn put(&self, file_name: &str, data: Bytes, content_type: &str) -> Result<String>;

    /// Fetch the bytes behind a locator
    async fn get(&self, locator: &str) -> Result<Bytes>;

    /// Delete a blob; deleting a missing blob is not an error
    async fn delete(&self, locator: &str) -> Result<()>;

    /// Content type and size of a blob
    async fn properties(&self, locator: &str) -> Result<BlobProperties>;

    /// Check if the provider is healthy
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
