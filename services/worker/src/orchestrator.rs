use crate::config::LayoutConfig;
use crate::error::{IngestError, Result};
use crate::notification::{parse_message, EventKind, NotificationBatch, ObjectEvent, ObjectReference};
use crate::rasterizer::{rasterize, PageRasterizer, RasterPage, PAGE_CONTENT_TYPE};
use crate::relocator::StorageRelocator;
use crate::router::{content_type_for, route, Classification, Disposition};
use crate::storage::ObjectStore;
use crate::tasks::TaskEmitter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Where an item is in its processing.
///
/// ```text
/// RECEIVED -> PARSED -> CLASSIFIED -> CONVERTED | PASSED_THROUGH | SKIPPED
///          -> RELOCATED -> TASK_EMITTED -> SUCCEEDED
/// ```
///
/// Any error moves the item straight to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Received,
    Parsed,
    Classified,
    Converted,
    PassedThrough,
    Skipped,
    Relocated,
    TaskEmitted,
    Succeeded,
    Failed,
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ItemState::Received => "received",
            ItemState::Parsed => "parsed",
            ItemState::Classified => "classified",
            ItemState::Converted => "converted",
            ItemState::PassedThrough => "passed_through",
            ItemState::Skipped => "skipped",
            ItemState::Relocated => "relocated",
            ItemState::TaskEmitted => "task_emitted",
            ItemState::Succeeded => "succeeded",
            ItemState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of processing one storage record
#[derive(Debug)]
pub enum ProcessingOutcome {
    Succeeded {
        outputs: Vec<ObjectReference>,
        task: ObjectReference,
    },
    /// No-op success
    Skipped { reason: String },
    Failed {
        /// Last state reached before the error
        stage: ItemState,
        error: IngestError,
    },
}

impl ProcessingOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ProcessingOutcome::Failed { .. })
    }

    /// Terminal state of the item
    pub fn state(&self) -> ItemState {
        match self {
            ProcessingOutcome::Succeeded { .. } => ItemState::Succeeded,
            ProcessingOutcome::Skipped { .. } => ItemState::Skipped,
            ProcessingOutcome::Failed { .. } => ItemState::Failed,
        }
    }
}

/// Outcome of one storage record within a message
#[derive(Debug)]
pub struct ItemReport {
    pub item_id: String,
    pub object: Option<ObjectReference>,
    pub outcome: ProcessingOutcome,
}

/// Outcomes of every record carried by one queue message
#[derive(Debug)]
pub struct MessageReport {
    pub message_id: String,
    pub items: Vec<ItemReport>,
}

impl MessageReport {
    pub fn succeeded(&self) -> bool {
        !self.items.iter().any(|item| item.outcome.is_failure())
    }
}

/// Outcomes of a whole batch, in delivery order
#[derive(Debug, Default)]
pub struct BatchReport {
    pub messages: Vec<MessageReport>,
}

impl BatchReport {
    /// Messages the transport may delete
    pub fn acknowledged(&self) -> Vec<&str> {
        self.messages
            .iter()
            .filter(|m| m.succeeded())
            .map(|m| m.message_id.as_str())
            .collect()
    }

    /// Messages left for redelivery
    pub fn failed(&self) -> Vec<&str> {
        self.messages
            .iter()
            .filter(|m| !m.succeeded())
            .map(|m| m.message_id.as_str())
            .collect()
    }

    pub fn items(&self) -> impl Iterator<Item = &ItemReport> {
        self.messages.iter().flat_map(|m| m.items.iter())
    }

    /// Partial-batch response understood by the queue transport
    pub fn to_response(&self) -> BatchResponse {
        BatchResponse::from_failures(self.failed())
    }
}

/// `{"batchItemFailures":[{"itemIdentifier":"..."}]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    #[serde(rename = "batchItemFailures")]
    pub batch_item_failures: Vec<BatchItemFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemFailure {
    #[serde(rename = "itemIdentifier")]
    pub item_identifier: String,
}

impl BatchResponse {
    pub fn from_failures<'a>(message_ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            batch_item_failures: message_ids
                .into_iter()
                .map(|id| BatchItemFailure {
                    item_identifier: id.to_string(),
                })
                .collect(),
        }
    }
}

/// Drives every record of a batch through parse, route, convert, relocate, emit.
///
/// Records run one after another; a failed record never stops or undoes the
/// others.
pub struct BatchOrchestrator {
    relocator: StorageRelocator,
    emitter: TaskEmitter,
    rasterizer: Arc<dyn PageRasterizer>,
    layout: LayoutConfig,
    scale: f32,
}

impl BatchOrchestrator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        rasterizer: Arc<dyn PageRasterizer>,
        layout: LayoutConfig,
        scale: f32,
    ) -> Self {
        let relocator = StorageRelocator::new(store);
        let emitter = TaskEmitter::new(relocator.clone(), layout.ingest_prefix.clone());

        Self {
            relocator,
            emitter,
            rasterizer,
            layout,
            scale,
        }
    }

    /// Process every message of a batch in order
    #[instrument(skip_all, fields(messages = batch.records.len()))]
    pub async fn process_batch(&self, batch: &NotificationBatch) -> BatchReport {
        let mut report = BatchReport::default();

        for message in &batch.records {
            let items = match parse_message(message) {
                Ok(records) if records.is_empty() => {
                    debug!(message_id = %message.message_id, "Message carries no storage records");
                    vec![ItemReport {
                        item_id: message.message_id.clone(),
                        object: None,
                        outcome: ProcessingOutcome::Skipped {
                            reason: "no storage records".to_string(),
                        },
                    }]
                }
                Ok(records) => {
                    let single = records.len() == 1;
                    let mut items = Vec::with_capacity(records.len());
                    for (index, record) in records.into_iter().enumerate() {
                        let item_id = if single {
                            message.message_id.clone()
                        } else {
                            format!("{}#{}", message.message_id, index + 1)
                        };
                        let item = match record {
                            Ok(event) => {
                                let outcome = self.process_event(&item_id, &event).await;
                                ItemReport {
                                    item_id,
                                    object: Some(event.object),
                                    outcome,
                                }
                            }
                            Err(error) => ItemReport {
                                item_id,
                                object: None,
                                outcome: ProcessingOutcome::Failed {
                                    stage: ItemState::Received,
                                    error,
                                },
                            },
                        };
                        items.push(item);
                    }
                    items
                }
                Err(error) => vec![ItemReport {
                    item_id: message.message_id.clone(),
                    object: None,
                    outcome: ProcessingOutcome::Failed {
                        stage: ItemState::Received,
                        error,
                    },
                }],
            };

            for item in &items {
                log_outcome(item);
            }

            report.messages.push(MessageReport {
                message_id: message.message_id.clone(),
                items,
            });
        }

        info!(
            acknowledged = report.acknowledged().len(),
            failed = report.failed().len(),
            "Batch processed"
        );
        report
    }

    /// Process a batch under an invocation ceiling.
    ///
    /// When the ceiling is reached every message of the batch is reported as
    /// failed, so the transport redelivers all of it.
    pub async fn process_batch_within(
        &self,
        batch: &NotificationBatch,
        ceiling: Duration,
    ) -> BatchResponse {
        match tokio::time::timeout(ceiling, self.process_batch(batch)).await {
            Ok(report) => report.to_response(),
            Err(_) => {
                warn!(
                    ceiling_secs = ceiling.as_secs(),
                    messages = batch.records.len(),
                    "Invocation ceiling reached, leaving the whole batch for redelivery"
                );
                BatchResponse::from_failures(batch.records.iter().map(|m| m.message_id.as_str()))
            }
        }
    }

    /// Process one storage record, converting any error into an outcome
    #[instrument(skip_all, fields(item_id = %item_id, key = %event.object.key))]
    pub async fn process_event(&self, item_id: &str, event: &ObjectEvent) -> ProcessingOutcome {
        if let EventKind::Other(ref name) = event.kind {
            return ProcessingOutcome::Skipped {
                reason: format!("ignored event {name}"),
            };
        }

        let mut state = ItemState::Parsed;
        match self.run(&event.object, &mut state).await {
            Ok(outcome) => outcome,
            Err(error) if error.is_benign() => ProcessingOutcome::Skipped {
                reason: error.to_string(),
            },
            Err(error) => ProcessingOutcome::Failed {
                stage: state,
                error,
            },
        }
    }

    async fn run(&self, object: &ObjectReference, state: &mut ItemState) -> Result<ProcessingOutcome> {
        let disposition = route(object, &self.layout.upload_prefix)?;
        *state = ItemState::Classified;
        debug!(
            classification = Classification::from_key(&object.key).as_str(),
            "Object classified"
        );

        let outputs = match disposition {
            Disposition::Skip { reason } => {
                *state = ItemState::Skipped;
                return Ok(ProcessingOutcome::Skipped { reason });
            }
            Disposition::RasterizeAndRelocate => self.convert_pdf(object, state).await?,
            Disposition::RelocateOnly => self.pass_through(object, state).await?,
        };

        let task = self.emitter.emit(object, &outputs).await?;
        *state = ItemState::TaskEmitted;

        Ok(ProcessingOutcome::Succeeded { outputs, task })
    }

    /// Render every page into the raw and ingest areas, then move the original
    async fn convert_pdf(
        &self,
        source: &ObjectReference,
        state: &mut ItemState,
    ) -> Result<Vec<ObjectReference>> {
        let raw_original = self.raw_ref(source, source.file_name());
        let pdf = self.relocator.read_source(source, &raw_original).await?;

        let pages = rasterize(self.rasterizer.as_ref(), &pdf, source.base_name(), self.scale)?;
        let mut outputs = Vec::with_capacity(pages.page_count() as usize);
        let mut written = Vec::new();

        for page in pages {
            let stored = match page {
                Ok(page) => self.store_page(source, page, &mut written).await,
                Err(e) => Err(e),
            };
            match stored {
                Ok(raw_page) => outputs.push(raw_page),
                Err(e) => {
                    // No partial page sets survive a failed document
                    self.relocator.discard(&written).await;
                    return Err(e);
                }
            }
        }
        *state = ItemState::Converted;

        self.relocator
            .move_object(source, &raw_original, pdf, content_type_for(&source.key))
            .await?;
        *state = ItemState::Relocated;

        Ok(outputs)
    }

    async fn store_page(
        &self,
        source: &ObjectReference,
        page: RasterPage,
        written: &mut Vec<ObjectReference>,
    ) -> Result<ObjectReference> {
        let raw_page = self.raw_ref(source, &page.file_name);
        let ingest_page = self.ingest_ref(source, &page.file_name);

        for target in [&raw_page, &ingest_page] {
            self.relocator
                .write(target, page.bytes.clone(), PAGE_CONTENT_TYPE)
                .await?;
            written.push(target.clone());
        }

        metrics::counter!("ingest.pages.rendered").increment(1);
        debug!(page = page.ordinal, key = %raw_page.key, "Page stored");
        Ok(raw_page)
    }

    /// Copy the image to the ingest area and move it to the raw area unchanged
    async fn pass_through(
        &self,
        source: &ObjectReference,
        state: &mut ItemState,
    ) -> Result<Vec<ObjectReference>> {
        let raw_image = self.raw_ref(source, source.file_name());
        let ingest_image = self.ingest_ref(source, source.file_name());
        let content_type = content_type_for(&source.key);

        let body = self.relocator.read_source(source, &raw_image).await?;
        *state = ItemState::PassedThrough;

        self.relocator
            .write(&ingest_image, body.clone(), content_type)
            .await?;
        let raw_image = self
            .relocator
            .move_object(source, &raw_image, body, content_type)
            .await?;
        *state = ItemState::Relocated;

        Ok(vec![raw_image])
    }

    fn raw_ref(&self, source: &ObjectReference, file_name: &str) -> ObjectReference {
        source.with_key(format!("{}{}", self.layout.raw_prefix, file_name))
    }

    fn ingest_ref(&self, source: &ObjectReference, file_name: &str) -> ObjectReference {
        source.with_key(format!("{}{}", self.layout.ingest_prefix, file_name))
    }
}

fn log_outcome(item: &ItemReport) {
    let key = item.object.as_ref().map(|o| o.key.as_str()).unwrap_or("");
    match &item.outcome {
        ProcessingOutcome::Succeeded { outputs, task } => {
            metrics::counter!("ingest.items.succeeded").increment(1);
            info!(
                item_id = %item.item_id,
                key = %key,
                outputs = outputs.len(),
                task_key = %task.key,
                "Item processed"
            );
        }
        ProcessingOutcome::Skipped { reason } => {
            metrics::counter!("ingest.items.skipped").increment(1);
            info!(item_id = %item.item_id, key = %key, reason = %reason, "Item skipped");
        }
        ProcessingOutcome::Failed { stage, error } => {
            metrics::counter!("ingest.items.failed").increment(1);
            error!(
                item_id = %item.item_id,
                key = %key,
                stage = %stage,
                error_kind = error.kind(),
                error = %error,
                "Item failed"
            );
        }
    }
}
