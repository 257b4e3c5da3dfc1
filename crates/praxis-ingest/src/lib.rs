//! Praxis ingest - chunked document upload and progress reconciliation
//!
//! This crate feeds the Praxis knowledge base: it takes user-selected
//! files, validates them, splits large payloads into bounded chunks,
//! transfers them to the storage backend, and keeps an optimistic local
//! view of progress consistent with the backend's slow, asynchronous
//! processing pipeline.
//!
//! # Architecture
//!
//! ```text
//! add_files()
//!     │ validate + plan chunks
//!     ▼
//! BatchController ──── upload_all(), one task at a time ────┐
//!     │                                                     │
//!     ▼                                                     ▼
//! UploadTask (state machine)                       Uploader (orchestrator)
//!     ▲                                                     │
//!     │ phase / progress entry points      prepare → transfer → finalize
//!     └─────────────────────────────────────────────────────┤
//!                                                           │ handoff
//!                                                           ▼
//!                                           ProgressMonitor (poll loop per
//!                                           document until terminal state)
//! ```
//!
//! Every transition is emitted as an [`events::UploadEvent`] through a
//! single dispatch point; UI hosts drain the receiver returned by
//! [`batch::BatchController::new`]. The upload call succeeding and the
//! backend finishing its processing are deliberately decoupled: a task is
//! `Success` once the handoff lands, while the parallel
//! [`reconcile::DocumentProgress`] record follows processing to its
//! terminal state.

pub mod backend;
pub mod batch;
pub mod chunk;
pub mod config;
pub mod error;
pub mod events;
pub mod reconcile;
pub mod task;
pub mod uploader;
pub mod validate;

#[cfg(test)]
mod test_support;

pub use backend::{
    Container, DocumentDescriptor, Handoff, HttpBackend, RemoteProcessingStatus, RemoteStatus,
    RemoteUploadStatus, StorageBackend, TransferReceipt,
};
pub use batch::{BatchController, BatchOutcome, BatchStep, IncomingFile, MetadataUpdate, Rejection};
pub use chunk::ChunkPlan;
pub use config::IngestConfig;
pub use error::IngestError;
pub use events::{ChannelEmitter, NoOpEmitter, ProgressEmitter, UploadEvent};
pub use reconcile::{DocumentProgress, DocumentStatus, ProgressMonitor, ProgressPatch};
pub use task::{ChunkProgress, TaskStatus, UploadPhase, UploadTask};
pub use uploader::Uploader;
