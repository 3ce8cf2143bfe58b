//! Docingest Worker
//!
//! Queue-driven ingestion worker for the document labeling pipeline. It
//! consumes batches of storage notifications, renders uploaded PDFs to one PNG
//! per page (already-rasterized images pass through untouched), moves the
//! originals into the raw area, and writes one annotation task per upload for
//! the labeling tool to pick up.
//!
//! ## Architecture
//!
//! ```text
//! Queue batch            Bucket                        Bucket
//! ┌──────────────┐      ┌──────────────┐             ┌──────────────────┐
//! │ Notification │      │ upload/      │             │ raw/             │
//! │ Parser       │      │   x.pdf      │──relocate──▶│   x.pdf          │
//! └──────────────┘      │   y.png      │             │   x_0001.png ... │
//!        │              └──────────────┘             │   y.png          │
//!        ▼                     │                     └──────────────────┘
//! ┌──────────────┐             ▼                     ┌──────────────────┐
//! │ Router       │──pdf──▶ Rasterizer ──pages──────▶ │ ingest/          │
//! │              │──img──▶ Passthrough ─────────────▶│   x_0001.png ... │
//! └──────────────┘                                   │   TASK_<id>.json │
//!                                                    └──────────────────┘
//! ```
//!
//! The worker keeps no state between batches. Failed items are reported back to
//! the transport, which redelivers them; every storage effect is safe to repeat.

pub mod config;
pub mod error;
pub mod notification;
pub mod orchestrator;
pub mod rasterizer;
pub mod relocator;
pub mod router;
pub mod storage;
pub mod tasks;

pub use config::Config;
pub use error::IngestError;
pub use notification::{NotificationBatch, ObjectReference, QueueMessage};
pub use orchestrator::{BatchOrchestrator, BatchReport, BatchResponse, ItemState, ProcessingOutcome};
pub use rasterizer::{PageRasterizer, PdfiumRasterizer, RasterDocument, RasterPage};
pub use relocator::StorageRelocator;
pub use router::{Classification, Disposition};
pub use storage::{MemoryObjectStore, ObjectStore, S3ObjectStore};
pub use tasks::{TaskDescriptor, TaskEmitter};
