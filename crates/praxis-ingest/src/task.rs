//! Per-file upload state.
//!
//! An [`UploadTask`] is created once a file passes validation and lives
//! until the user removes it or the batch is torn down; it is never
//! persisted. Tasks are owned exclusively by the batch controller and
//! mutated only through the entry points here, which preserve the
//! progress-monotonicity and retry invariants.

use std::path::Path;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::backend::DocumentDescriptor;
use crate::chunk::ChunkPlan;
use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::validate::{sanitize_tags, sanitize_text};

/// Coarse task state as seen by the batch controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Uploading,
    Success,
    Error,
}

/// Fine-grained lifecycle phase while a task is uploading.
///
/// `Chunking` and `Reassembling` only occur on the chunked path. `Success`
/// at the coarse level pairs with `Processing` here: the backend keeps
/// working after the handoff, and that tail is reconciled separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadPhase {
    Preparing,
    Chunking,
    Uploading,
    Reassembling,
    Processing,
    Complete,
    Error,
}

/// Chunk-level progress, present only for chunked tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkProgress {
    /// Chunks fully transferred so far (1-based for display).
    pub current_chunk: u32,
    pub total_chunks: u32,
    /// Percent of the current chunk transferred.
    pub chunk_progress: u8,
}

/// State for one file moving through the upload pipeline.
#[derive(Debug, Clone)]
pub struct UploadTask {
    id: String,
    payload: Bytes,
    file_name: String,
    mime_type: String,
    title: String,
    description: String,
    tags: Vec<String>,
    category: String,
    is_chunked: bool,
    total_chunks: u32,
    chunk_progress: Option<ChunkProgress>,
    upload_progress: u8,
    phase: UploadPhase,
    status: TaskStatus,
    retry_count: u32,
    max_retries: u32,
    document_id: Option<String>,
    error: Option<String>,
}

impl UploadTask {
    /// Create a task for a validated file. The chunking decision is fixed
    /// here and never revised.
    pub fn new(file_name: &str, mime_type: &str, payload: Bytes, config: &IngestConfig) -> Self {
        let plan = ChunkPlan::plan(payload.len() as u64, config);
        let default_title = Path::new(file_name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| file_name.to_string());

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            title: sanitize_text(&default_title, config.title_max_chars),
            description: String::new(),
            tags: Vec::new(),
            category: String::new(),
            is_chunked: plan.is_chunked,
            total_chunks: plan.total_chunks,
            chunk_progress: None,
            upload_progress: 0,
            phase: UploadPhase::Preparing,
            status: TaskStatus::Pending,
            retry_count: 0,
            max_retries: config.max_retries,
            document_id: None,
            error: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn is_chunked(&self) -> bool {
        self.is_chunked
    }

    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    pub fn chunk_progress(&self) -> Option<ChunkProgress> {
        self.chunk_progress
    }

    pub fn upload_progress(&self) -> u8 {
        self.upload_progress
    }

    pub fn phase(&self) -> UploadPhase {
        self.phase
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn document_id(&self) -> Option<&str> {
        self.document_id.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Cheap handle to the payload bytes; slices share the same buffer.
    pub fn payload(&self) -> Bytes {
        self.payload.clone()
    }

    pub fn set_title(&mut self, title: &str, config: &IngestConfig) {
        self.title = sanitize_text(title, config.title_max_chars);
    }

    pub fn set_description(&mut self, description: &str, config: &IngestConfig) {
        self.description = sanitize_text(description, config.description_max_chars);
    }

    pub fn set_tags(&mut self, tags: &[String], config: &IngestConfig) {
        self.tags = sanitize_tags(tags, config);
    }

    pub fn set_category(&mut self, category: &str, config: &IngestConfig) {
        self.category = sanitize_text(category, config.category_max_chars);
    }

    /// Metadata snapshot sent alongside transfers.
    pub fn descriptor(&self) -> DocumentDescriptor {
        DocumentDescriptor {
            file_name: self.file_name.clone(),
            mime_type: self.mime_type.clone(),
            size: self.payload.len() as u64,
            title: self.title.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            category: self.category.clone(),
        }
    }

    /// Enter the uploading state at the start of an attempt.
    pub(crate) fn begin(&mut self) {
        self.status = TaskStatus::Uploading;
        self.phase = UploadPhase::Preparing;
        self.upload_progress = 0;
        self.chunk_progress = None;
    }

    pub(crate) fn enter_phase(&mut self, phase: UploadPhase) {
        self.phase = phase;
    }

    /// Raise progress to `progress`, never lowering it within an attempt.
    /// Returns the effective value.
    pub(crate) fn advance_progress(&mut self, progress: u8) -> u8 {
        self.upload_progress = self.upload_progress.max(progress.min(100));
        self.upload_progress
    }

    /// Record a fully transferred chunk.
    pub(crate) fn record_chunk(&mut self, chunk_index: u32, overall_progress: u8) {
        self.chunk_progress = Some(ChunkProgress {
            current_chunk: chunk_index + 1,
            total_chunks: self.total_chunks,
            chunk_progress: 100,
        });
        self.advance_progress(overall_progress);
    }

    /// The handoff succeeded: the upload call is done even though backend
    /// processing continues (reconciled separately).
    pub(crate) fn mark_success(&mut self, document_id: String) {
        self.document_id = Some(document_id);
        self.upload_progress = 100;
        self.status = TaskStatus::Success;
        self.phase = UploadPhase::Processing;
        self.error = None;
    }

    /// Record a failure. Progress resets to 0 rather than staying at an
    /// intermediate value: a partial position would imply resumability the
    /// transfer does not have.
    pub(crate) fn fail(&mut self, message: String) {
        self.status = TaskStatus::Error;
        self.phase = UploadPhase::Error;
        self.upload_progress = 0;
        self.chunk_progress = None;
        self.error = Some(message);
        self.retry_count = (self.retry_count + 1).min(self.max_retries);
    }

    /// Reset a failed task so it can run again from the preparing phase.
    pub(crate) fn begin_retry(&mut self) -> Result<(), IngestError> {
        if self.status != TaskStatus::Error {
            return Err(IngestError::InvalidState(format!(
                "task {} is not in a failed state",
                self.id
            )));
        }
        if !self.can_retry() {
            return Err(IngestError::RetriesExhausted);
        }
        self.status = TaskStatus::Pending;
        self.phase = UploadPhase::Preparing;
        self.upload_progress = 0;
        self.chunk_progress = None;
        self.document_id = None;
        self.error = None;
        Ok(())
    }
}
