use crate::error::{IngestError, Result};
use crate::notification::ObjectReference;
use crate::relocator::StorageRelocator;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

/// Task record for the downstream labeling tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Unique token, also used in the record's key
    pub id: String,
    pub data: TaskData,
    pub meta: TaskMeta,
}

/// Image references the labeling tool renders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskData {
    /// First (or only) image
    pub image: String,
    /// Every image in page order
    pub pages: Vec<String>,
}

/// Where the task came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMeta {
    pub source_bucket: String,
    pub source_key: String,
    pub page_count: usize,
    pub created_at: DateTime<Utc>,
}

impl TaskDescriptor {
    /// Build a descriptor with a fresh time-ordered token.
    ///
    /// Returns `None` when there are no outputs to reference.
    pub fn new(source: &ObjectReference, outputs: &[ObjectReference]) -> Option<Self> {
        let first = outputs.first()?;
        let pages: Vec<String> = outputs.iter().map(ObjectReference::url).collect();

        Some(Self {
            id: Uuid::now_v7().simple().to_string(),
            data: TaskData {
                image: first.url(),
                pages,
            },
            meta: TaskMeta {
                source_bucket: source.namespace.clone(),
                source_key: source.key.clone(),
                page_count: outputs.len(),
                created_at: Utc::now(),
            },
        })
    }

    /// Key of the record under the task prefix: `TASK_<token>.json`
    pub fn key(&self, ingest_prefix: &str) -> String {
        format!("{ingest_prefix}TASK_{}.json", self.id)
    }

    /// Serialized record: a one-element array, the shape the labeling tool imports
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(&[self]).map_err(|e| IngestError::TaskWrite {
            key: format!("TASK_{}.json", self.id),
            message: e.to_string(),
        })
    }
}

/// Writes task records into the task area
pub struct TaskEmitter {
    relocator: StorageRelocator,
    ingest_prefix: String,
}

impl TaskEmitter {
    pub fn new(relocator: StorageRelocator, ingest_prefix: impl Into<String>) -> Self {
        Self {
            relocator,
            ingest_prefix: ingest_prefix.into(),
        }
    }

    /// Write one task for all outputs of a source object
    #[instrument(skip_all, fields(source = %source.key, outputs = outputs.len()))]
    pub async fn emit(
        &self,
        source: &ObjectReference,
        outputs: &[ObjectReference],
    ) -> Result<ObjectReference> {
        let task = TaskDescriptor::new(source, outputs).ok_or_else(|| IngestError::TaskWrite {
            key: source.key.clone(),
            message: "no outputs to reference".to_string(),
        })?;

        let task_ref = source.with_key(task.key(&self.ingest_prefix));
        let body = Bytes::from(task.to_json()?);

        self.relocator
            .write(&task_ref, body, "application/json")
            .await
            .map_err(|e| IngestError::TaskWrite {
                key: task_ref.key.clone(),
                message: e.to_string(),
            })?;

        metrics::counter!("ingest.tasks.emitted").increment(1);
        info!(task_key = %task_ref.key, "Task descriptor written");
        Ok(task_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryObjectStore, MockObjectStore};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn pages(n: u32) -> Vec<ObjectReference> {
        (1..=n)
            .map(|i| ObjectReference::new("b", format!("raw/invoice_{i:04}.png")))
            .collect()
    }

    #[test]
    fn test_descriptor_references_pages_in_order() {
        let source = ObjectReference::new("b", "upload/invoice.pdf");
        let task = TaskDescriptor::new(&source, &pages(3)).unwrap();

        assert_eq!(task.data.image, "s3://b/raw/invoice_0001.png");
        assert_eq!(
            task.data.pages,
            vec![
                "s3://b/raw/invoice_0001.png",
                "s3://b/raw/invoice_0002.png",
                "s3://b/raw/invoice_0003.png",
            ]
        );
        assert_eq!(task.meta.page_count, 3);
        assert_eq!(task.meta.source_key, "upload/invoice.pdf");
        assert!(task.key("ingest/").starts_with("ingest/TASK_"));
        assert!(task.key("ingest/").ends_with(".json"));
    }

    #[test]
    fn test_no_outputs_no_descriptor() {
        let source = ObjectReference::new("b", "upload/invoice.pdf");
        assert!(TaskDescriptor::new(&source, &[]).is_none());
    }

    #[test]
    fn test_tokens_are_unique() {
        let source = ObjectReference::new("b", "upload/scan.png");
        let tokens: HashSet<String> = (0..1000)
            .map(|_| TaskDescriptor::new(&source, &pages(1)).unwrap().id)
            .collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn test_json_shape() {
        let source = ObjectReference::new("b", "upload/scan.png");
        let task = TaskDescriptor::new(&source, &[ObjectReference::new("b", "raw/scan.png")]).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&task.to_json().unwrap()).unwrap();
        let records = value.as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["data"]["image"], "s3://b/raw/scan.png");
        assert_eq!(records[0]["id"], task.id.as_str());
    }

    #[tokio::test]
    async fn test_emit_writes_record() {
        let store = Arc::new(MemoryObjectStore::new());
        let emitter = TaskEmitter::new(StorageRelocator::new(store.clone()), "ingest/");
        let source = ObjectReference::new("b", "upload/invoice.pdf");

        let task_ref = emitter.emit(&source, &pages(2)).await.unwrap();

        let stored = store.get("b", &task_ref.key).unwrap();
        assert_eq!(stored.content_type, "application/json");
        let tasks: Vec<TaskDescriptor> = serde_json::from_slice(&stored.body).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].data.pages.len(), 2);
    }

    #[tokio::test]
    async fn test_emit_failure_is_task_write_error() {
        let mut mock = MockObjectStore::new();
        mock.expect_put_object()
            .returning(|ns, key, _, _| Err(IngestError::storage("put", ns, key, "access denied")));

        let emitter = TaskEmitter::new(StorageRelocator::new(Arc::new(mock)), "ingest/");
        let source = ObjectReference::new("b", "upload/scan.png");

        match emitter.emit(&source, &pages(1)).await {
            Err(IngestError::TaskWrite { key, message }) => {
                assert!(key.starts_with("ingest/TASK_"));
                assert!(message.contains("access denied"));
            }
            other => panic!("Expected TaskWrite, got {:?}", other),
        }
    }
}
