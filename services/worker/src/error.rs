use thiserror::Error;

/// Errors that can end processing of a single batch item
///
/// Every variant is caught at the item boundary by the orchestrator and
/// turned into a failed outcome for that item only.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Malformed notification: {0}")]
    MalformedNotification(String),

    #[error("Object not found: {namespace}/{key}")]
    ObjectNotFound { namespace: String, key: String },

    #[error("Storage {operation} failed for {namespace}/{key}: {message}")]
    StorageAccess {
        operation: &'static str,
        namespace: String,
        key: String,
        message: String,
    },

    #[error("Failed to open document: {0}")]
    DocumentOpen(String),

    #[error("Failed to render page {page}: {reason}")]
    PageRender { page: u32, reason: String },

    #[error("Failed to write task descriptor {key}: {message}")]
    TaskWrite { key: String, message: String },

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),
}

impl IngestError {
    /// Stable identifier used in structured log records
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::MalformedNotification(_) => "malformed_notification",
            IngestError::ObjectNotFound { .. } => "object_not_found",
            IngestError::StorageAccess { .. } => "storage_access_error",
            IngestError::DocumentOpen(_) => "document_open_error",
            IngestError::PageRender { .. } => "page_render_error",
            IngestError::TaskWrite { .. } => "task_write_error",
            IngestError::UnsupportedFileType(_) => "unsupported_file_type",
        }
    }

    /// Whether this error is a no-op success rather than a failure
    pub fn is_benign(&self) -> bool {
        matches!(self, IngestError::UnsupportedFileType(_))
    }

    pub(crate) fn storage(
        operation: &'static str,
        namespace: &str,
        key: &str,
        message: impl Into<String>,
    ) -> Self {
        IngestError::StorageAccess {
            operation,
            namespace: namespace.to_string(),
            key: key.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
