mod memory;
mod s3;

pub use memory::{MemoryObjectStore, StoredObject};
pub use s3::S3ObjectStore;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Keyed object storage split into namespaces (buckets)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object's bytes; `ObjectNotFound` when absent
    async fn get_object(&self, namespace: &str, key: &str) -> Result<Bytes>;

    /// Write an object, replacing any existing one
    async fn put_object(
        &self,
        namespace: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<()>;

    /// Remove an object; removing an absent object succeeds
    async fn delete_object(&self, namespace: &str, key: &str) -> Result<()>;

    /// Whether an object currently exists
    async fn object_exists(&self, namespace: &str, key: &str) -> Result<bool>;
}
