use crate::error::{IngestError, Result};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};

/// Batch of queue messages as delivered by the transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationBatch {
    #[serde(rename = "Records", default)]
    pub records: Vec<QueueMessage>,
}

/// One queue message wrapping a storage event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Transport identifier used for acknowledgement
    #[serde(rename = "messageId")]
    pub message_id: String,
    /// JSON-encoded storage event
    pub body: String,
}

/// Storage event payload carried in a message body
#[derive(Debug, Deserialize)]
struct StorageEvent {
    /// Decoded one by one so a bad record cannot sink its siblings
    #[serde(rename = "Records")]
    records: Option<Vec<serde_json::Value>>,
    /// Present on the test event sent when notifications are first configured
    #[serde(rename = "Event")]
    event: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StorageEventRecord {
    #[serde(rename = "eventName", default)]
    event_name: String,
    s3: S3Entity,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    bucket: BucketEntity,
    object: ObjectEntity,
}

#[derive(Debug, Deserialize)]
struct BucketEntity {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ObjectEntity {
    key: String,
    size: Option<u64>,
}

/// Reference to one stored object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectReference {
    /// Bucket holding the object
    pub namespace: String,
    /// Decoded object key
    pub key: String,
    /// Size reported by the notification, if any
    pub size: Option<u64>,
}

impl ObjectReference {
    pub fn new(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
            size: None,
        }
    }

    /// Same namespace, different key
    pub fn with_key(&self, key: impl Into<String>) -> Self {
        Self::new(self.namespace.clone(), key)
    }

    /// File name after the last `/`
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// File name without its extension
    pub fn base_name(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(idx) if idx > 0 => &name[..idx],
            _ => name,
        }
    }

    /// `s3://` URL handed to the labeling tool
    pub fn url(&self) -> String {
        format!("s3://{}/{}", self.namespace, self.key)
    }
}

/// Kind of storage event a record describes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    ObjectCreated,
    Other(String),
}

impl EventKind {
    fn from_event_name(name: &str) -> Self {
        // Test payloads built by hand often omit the event name
        if name.is_empty() || name.starts_with("ObjectCreated") {
            EventKind::ObjectCreated
        } else {
            EventKind::Other(name.to_string())
        }
    }
}

/// A parsed storage record ready for routing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEvent {
    pub object: ObjectReference,
    pub kind: EventKind,
}

/// Decode every storage record inside one queue message.
///
/// The outer error covers a body that is not a storage event at all. Each
/// record is decoded independently, so one entry may fail while the others
/// parse. Returns an empty list for the storage test event.
pub fn parse_message(message: &QueueMessage) -> Result<Vec<Result<ObjectEvent>>> {
    let event: StorageEvent = serde_json::from_str(&message.body)
        .map_err(|e| IngestError::MalformedNotification(format!("invalid body: {e}")))?;

    let records = match (event.records, event.event) {
        (Some(records), _) => records,
        (None, Some(name)) if name == "s3:TestEvent" => return Ok(Vec::new()),
        (None, _) => {
            return Err(IngestError::MalformedNotification(
                "body has no Records".to_string(),
            ))
        }
    };

    Ok(records.into_iter().map(parse_record).collect())
}

fn parse_record(value: serde_json::Value) -> Result<ObjectEvent> {
    let record: StorageEventRecord = serde_json::from_value(value)
        .map_err(|e| IngestError::MalformedNotification(format!("invalid record: {e}")))?;

    let namespace = record.s3.bucket.name;
    let key = decode_key(&record.s3.object.key)?;
    if namespace.is_empty() || key.is_empty() {
        return Err(IngestError::MalformedNotification(
            "record lacks bucket or key".to_string(),
        ));
    }

    Ok(ObjectEvent {
        object: ObjectReference {
            namespace,
            key,
            size: record.s3.object.size,
        },
        kind: EventKind::from_event_name(&record.event_name),
    })
}

/// Keys in storage notifications are form-url-encoded
fn decode_key(raw: &str) -> Result<String> {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|key| key.into_owned())
        .map_err(|e| IngestError::MalformedNotification(format!("undecodable key {raw:?}: {e}")))
}
