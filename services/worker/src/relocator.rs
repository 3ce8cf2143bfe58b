use crate::error::{IngestError, Result};
use crate::notification::ObjectReference;
use crate::storage::ObjectStore;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// A move whose destination write has been confirmed
#[derive(Debug)]
#[must_use = "the source is only removed once the move is committed"]
pub struct StagedMove {
    source: ObjectReference,
    destination: ObjectReference,
}

impl StagedMove {
    pub fn destination(&self) -> &ObjectReference {
        &self.destination
    }
}

/// Copies, moves and writes objects through an [`ObjectStore`].
///
/// The store has no rename, so a move is two steps: [`stage_move`](Self::stage_move)
/// writes the destination and confirms it exists, and committing the returned
/// [`StagedMove`] deletes the source.
#[derive(Clone)]
pub struct StorageRelocator {
    store: Arc<dyn ObjectStore>,
}

impl StorageRelocator {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Read the bytes of an object that is about to be moved.
    ///
    /// If the source is gone but the destination exists, an earlier attempt
    /// already completed the move and the destination copy is returned.
    #[instrument(skip_all, fields(source = %source.key, destination = %destination.key))]
    pub async fn read_source(
        &self,
        source: &ObjectReference,
        destination: &ObjectReference,
    ) -> Result<Bytes> {
        match self.store.get_object(&source.namespace, &source.key).await {
            Ok(body) => Ok(body),
            Err(not_found @ IngestError::ObjectNotFound { .. }) => {
                match self
                    .store
                    .get_object(&destination.namespace, &destination.key)
                    .await
                {
                    Ok(body) => {
                        info!("Source already relocated, resuming from destination copy");
                        Ok(body)
                    }
                    Err(IngestError::ObjectNotFound { .. }) => Err(not_found),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Write an object and confirm it is readable back from the store
    #[instrument(skip(self, body), fields(key = %destination.key, size_bytes = body.len()))]
    pub async fn write(
        &self,
        destination: &ObjectReference,
        body: Bytes,
        content_type: &str,
    ) -> Result<()> {
        self.store
            .put_object(&destination.namespace, &destination.key, body, content_type)
            .await?;

        if !self
            .store
            .object_exists(&destination.namespace, &destination.key)
            .await?
        {
            return Err(IngestError::storage(
                "verify",
                &destination.namespace,
                &destination.key,
                "object missing after write",
            ));
        }

        debug!("Write confirmed");
        Ok(())
    }

    /// First half of a move: copy to the destination and confirm it
    pub async fn stage_move(
        &self,
        source: &ObjectReference,
        destination: &ObjectReference,
        body: Bytes,
        content_type: &str,
    ) -> Result<StagedMove> {
        self.write(destination, body, content_type).await?;
        Ok(StagedMove {
            source: source.clone(),
            destination: destination.clone(),
        })
    }

    /// Second half of a move: remove the source
    #[instrument(skip(self, staged), fields(source = %staged.source.key, destination = %staged.destination.key))]
    pub async fn commit(&self, staged: StagedMove) -> Result<ObjectReference> {
        self.store
            .delete_object(&staged.source.namespace, &staged.source.key)
            .await?;

        info!("Moved object");
        Ok(staged.destination)
    }

    /// Copy-then-verify-then-delete in one call
    pub async fn move_object(
        &self,
        source: &ObjectReference,
        destination: &ObjectReference,
        body: Bytes,
        content_type: &str,
    ) -> Result<ObjectReference> {
        let staged = self
            .stage_move(source, destination, body, content_type)
            .await?;
        self.commit(staged).await
    }

    /// Best-effort removal of objects written by an abandoned attempt
    pub async fn discard(&self, objects: &[ObjectReference]) {
        for object in objects {
            if let Err(e) = self
                .store
                .delete_object(&object.namespace, &object.key)
                .await
            {
                warn!(key = %object.key, error = %e, "Failed to discard partial output");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryObjectStore, MockObjectStore};

    fn source() -> ObjectReference {
        ObjectReference::new("b", "upload/scan.png")
    }

    fn destination() -> ObjectReference {
        ObjectReference::new("b", "raw/scan.png")
    }

    #[tokio::test]
    async fn test_move_twice_is_idempotent() {
        let store = Arc::new(MemoryObjectStore::new());
        store.insert("b", "upload/scan.png", "pixels", "image/png");
        let relocator = StorageRelocator::new(store.clone());

        for _ in 0..2 {
            let body = relocator.read_source(&source(), &destination()).await.unwrap();
            let moved = relocator
                .move_object(&source(), &destination(), body, "image/png")
                .await
                .unwrap();
            assert_eq!(moved, destination());
        }

        assert!(!store.contains("b", "upload/scan.png"));
        assert_eq!(store.get("b", "raw/scan.png").unwrap().body, "pixels");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_read_source_missing_everywhere() {
        let relocator = StorageRelocator::new(Arc::new(MemoryObjectStore::new()));
        match relocator.read_source(&source(), &destination()).await {
            Err(IngestError::ObjectNotFound { key, .. }) => assert_eq!(key, "upload/scan.png"),
            other => panic!("Expected ObjectNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_write_never_deletes_source() {
        let mut mock = MockObjectStore::new();
        mock.expect_put_object()
            .returning(|ns, key, _, _| Err(IngestError::storage("put", ns, key, "throttled")));
        mock.expect_delete_object().never();

        let relocator = StorageRelocator::new(Arc::new(mock));
        let result = relocator
            .move_object(&source(), &destination(), Bytes::from_static(b"x"), "image/png")
            .await;
        assert!(matches!(result, Err(IngestError::StorageAccess { .. })));
    }

    #[tokio::test]
    async fn test_unconfirmed_write_never_deletes_source() {
        let mut mock = MockObjectStore::new();
        mock.expect_put_object().returning(|_, _, _, _| Ok(()));
        mock.expect_object_exists().returning(|_, _| Ok(false));
        mock.expect_delete_object().never();

        let relocator = StorageRelocator::new(Arc::new(mock));
        match relocator
            .stage_move(&source(), &destination(), Bytes::from_static(b"x"), "image/png")
            .await
        {
            Err(IngestError::StorageAccess { operation, .. }) => assert_eq!(operation, "verify"),
            other => panic!("Expected verify failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_commit_deletes_source_after_confirmed_write() {
        let mut seq = mockall::Sequence::new();
        let mut mock = MockObjectStore::new();
        mock.expect_put_object()
            .withf(|ns, key, _, ct| ns == "b" && key == "raw/scan.png" && ct == "image/png")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(()));
        mock.expect_object_exists()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(true));
        mock.expect_delete_object()
            .withf(|ns, key| ns == "b" && key == "upload/scan.png")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let relocator = StorageRelocator::new(Arc::new(mock));
        let staged = relocator
            .stage_move(&source(), &destination(), Bytes::from_static(b"x"), "image/png")
            .await
            .unwrap();
        assert_eq!(staged.destination(), &destination());
        relocator.commit(staged).await.unwrap();
    }
}
