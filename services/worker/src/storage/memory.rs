use super::ObjectStore;
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An object held by [`MemoryObjectStore`]
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: String,
}

/// Process-local object store for tests
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<(String, String), StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without going through the async API
    pub fn insert(&self, namespace: &str, key: &str, body: impl Into<Bytes>, content_type: &str) {
        self.objects.write().insert(
            (namespace.to_string(), key.to_string()),
            StoredObject {
                body: body.into(),
                content_type: content_type.to_string(),
            },
        );
    }

    pub fn get(&self, namespace: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .read()
            .get(&(namespace.to_string(), key.to_string()))
            .cloned()
    }

    pub fn contains(&self, namespace: &str, key: &str) -> bool {
        self.get(namespace, key).is_some()
    }

    /// Keys in a namespace under a prefix, in lexical order
    pub fn keys_with_prefix(&self, namespace: &str, prefix: &str) -> Vec<String> {
        self.objects
            .read()
            .keys()
            .filter(|(ns, key)| ns == namespace && key.starts_with(prefix))
            .map(|(_, key)| key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, namespace: &str, key: &str) -> Result<Bytes> {
        self.get(namespace, key)
            .map(|object| object.body)
            .ok_or_else(|| IngestError::ObjectNotFound {
                namespace: namespace.to_string(),
                key: key.to_string(),
            })
    }

    async fn put_object(
        &self,
        namespace: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<()> {
        self.insert(namespace, key, body, content_type);
        Ok(())
    }

    async fn delete_object(&self, namespace: &str, key: &str) -> Result<()> {
        self.objects
            .write()
            .remove(&(namespace.to_string(), key.to_string()));
        Ok(())
    }

    async fn object_exists(&self, namespace: &str, key: &str) -> Result<bool> {
        Ok(self.contains(namespace, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryObjectStore::new();
        store
            .put_object("b", "raw/a.png", Bytes::from_static(b"png"), "image/png")
            .await
            .unwrap();

        assert_eq!(store.get_object("b", "raw/a.png").await.unwrap(), "png");
        assert_eq!(store.get("b", "raw/a.png").unwrap().content_type, "image/png");
        assert!(store.object_exists("b", "raw/a.png").await.unwrap());
        assert!(!store.object_exists("other", "raw/a.png").await.unwrap());

        store.delete_object("b", "raw/a.png").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_missing_object() {
        let store = MemoryObjectStore::new();
        assert!(matches!(
            store.get_object("b", "upload/x.pdf").await,
            Err(IngestError::ObjectNotFound { .. })
        ));
        // Deleting an absent object is not an error
        assert!(store.delete_object("b", "upload/x.pdf").await.is_ok());
    }

    #[test]
    fn test_keys_with_prefix() {
        let store = MemoryObjectStore::new();
        store.insert("b", "raw/b.png", "2", "image/png");
        store.insert("b", "raw/a.png", "1", "image/png");
        store.insert("b", "ingest/a.png", "1", "image/png");
        store.insert("c", "raw/c.png", "3", "image/png");

        assert_eq!(store.keys_with_prefix("b", "raw/"), vec!["raw/a.png", "raw/b.png"]);
        assert_eq!(store.len(), 4);
    }
}
