//! Batch upload controller.
//!
//! Owns the upload tasks and drives the four-step lifecycle
//! (select → configure → upload → complete). Tasks are uploaded one at a
//! time in submission order: the backend's ingestion path is
//! rate-sensitive, and a single active transfer keeps progress legible.
//! One task's failure never aborts the batch: the queue always drains and
//! per-task outcomes are reported.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::backend::StorageBackend;
use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::events::{ChannelEmitter, ProgressEmitter, UploadEvent};
use crate::reconcile::{DocumentStatus, ProgressMonitor, ProgressPatch};
use crate::task::{TaskStatus, UploadTask};
use crate::uploader::Uploader;
use crate::validate::validate_file;

/// UI-facing step of the batch lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStep {
    Select,
    Configure,
    Upload,
    Complete,
}

/// Aggregate result of draining a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub succeeded: usize,
    pub failed: usize,
}

/// A candidate file handed in by the host.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub file_name: String,
    pub mime_type: String,
    pub payload: Bytes,
}

impl IncomingFile {
    /// Read a file from disk into an incoming payload.
    pub async fn from_path(path: &Path, mime_type: &str) -> std::io::Result<Self> {
        let payload = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Self {
            file_name,
            mime_type: mime_type.to_string(),
            payload: Bytes::from(payload),
        })
    }
}

/// A file that failed validation and never became a task.
#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    pub file_name: String,
    pub reason: String,
}

/// Partial metadata edit for a task in the configure step.
#[derive(Debug, Clone, Default)]
pub struct MetadataUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub category: Option<String>,
}

/// Runs the upload pipeline over a set of pending files.
pub struct BatchController {
    config: IngestConfig,
    user_id: String,
    uploader: Uploader,
    monitor: ProgressMonitor,
    tasks: Vec<UploadTask>,
    rejections: Vec<Rejection>,
    step: BatchStep,
}

impl BatchController {
    /// Create a controller with its own event channel and its own tracking
    /// registry. Returns the receiver the host UI should drain.
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        config: IngestConfig,
        user_id: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<UploadEvent>) {
        let (emitter, events) = ChannelEmitter::new();
        let emitter: Arc<dyn ProgressEmitter> = Arc::new(emitter);

        let uploader = Uploader::new(backend.clone(), emitter.clone(), config.clone());
        let monitor = ProgressMonitor::new(backend, emitter, config.clone());

        (
            Self {
                config,
                user_id: user_id.into(),
                uploader,
                monitor,
                tasks: Vec::new(),
                rejections: Vec::new(),
                step: BatchStep::Select,
            },
            events,
        )
    }

    pub fn step(&self) -> BatchStep {
        self.step
    }

    pub fn tasks(&self) -> &[UploadTask] {
        &self.tasks
    }

    pub fn task(&self, task_id: &str) -> Option<&UploadTask> {
        self.tasks.iter().find(|t| t.id() == task_id)
    }

    pub fn rejections(&self) -> &[Rejection] {
        &self.rejections
    }

    /// The tracking registry for this batch.
    pub fn monitor(&self) -> &ProgressMonitor {
        &self.monitor
    }

    /// Validate candidate files and create tasks for the ones that pass.
    /// Returns the number accepted; rejected files become batch-level
    /// messages and do not affect their siblings.
    pub fn add_files(&mut self, files: Vec<IncomingFile>) -> usize {
        let mut accepted = 0;
        for file in files {
            match validate_file(
                &file.file_name,
                &file.mime_type,
                file.payload.len() as u64,
                &self.config,
            ) {
                Ok(()) => {
                    let task =
                        UploadTask::new(&file.file_name, &file.mime_type, file.payload, &self.config);
                    tracing::debug!(
                        task_id = %task.id(),
                        file = %file.file_name,
                        chunked = task.is_chunked(),
                        "Task created"
                    );
                    self.tasks.push(task);
                    accepted += 1;
                }
                Err(e) => {
                    tracing::warn!(file = %file.file_name, error = %e, "File rejected");
                    self.rejections.push(Rejection {
                        file_name: file.file_name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if !self.tasks.is_empty() && self.step == BatchStep::Select {
            self.step = BatchStep::Configure;
        }
        accepted
    }

    /// Apply a metadata edit; every field passes through sanitization.
    pub fn update_metadata(
        &mut self,
        task_id: &str,
        update: MetadataUpdate,
    ) -> Result<(), IngestError> {
        let index = self
            .tasks
            .iter()
            .position(|t| t.id() == task_id)
            .ok_or_else(|| IngestError::TaskNotFound(task_id.to_string()))?;
        let task = &mut self.tasks[index];

        if let Some(title) = update.title {
            task.set_title(&title, &self.config);
        }
        if let Some(description) = update.description {
            task.set_description(&description, &self.config);
        }
        if let Some(tags) = update.tags {
            task.set_tags(&tags, &self.config);
        }
        if let Some(category) = update.category {
            task.set_category(&category, &self.config);
        }
        Ok(())
    }

    /// Remove a task from the batch, stopping reconciliation if the task
    /// had already been handed off.
    pub async fn remove_task(&mut self, task_id: &str) -> bool {
        let Some(index) = self.tasks.iter().position(|t| t.id() == task_id) else {
            return false;
        };
        let task = self.tasks.remove(index);
        if let Some(document_id) = task.document_id() {
            self.monitor.stop_tracking(document_id).await;
        }
        true
    }

    /// Upload every pending task, one at a time in submission order.
    /// `on_success` fires per completed task so consumers can refresh
    /// incrementally rather than waiting for the whole batch.
    pub async fn upload_all<F>(&mut self, mut on_success: F) -> BatchOutcome
    where
        F: FnMut(&UploadTask),
    {
        self.step = BatchStep::Upload;
        let user_id = self.user_id.clone();
        let mut outcome = BatchOutcome::default();

        for index in 0..self.tasks.len() {
            if self.tasks[index].status() != TaskStatus::Pending {
                continue;
            }

            match self.uploader.upload(&mut self.tasks[index], &user_id).await {
                Ok(handoff) => {
                    outcome.succeeded += 1;
                    self.track_handoff(&handoff.document_id).await;
                    on_success(&self.tasks[index]);
                }
                Err(_) => {
                    // Already recorded on the task and emitted; the batch
                    // keeps draining.
                    outcome.failed += 1;
                }
            }
        }

        self.step = BatchStep::Complete;
        tracing::info!(
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            "Batch drained"
        );
        outcome
    }

    /// Re-run a failed task from the preparing phase. Refuses once the
    /// retry budget is spent.
    pub async fn retry(&mut self, task_id: &str) -> Result<(), IngestError> {
        let index = self
            .tasks
            .iter()
            .position(|t| t.id() == task_id)
            .ok_or_else(|| IngestError::TaskNotFound(task_id.to_string()))?;

        self.tasks[index].begin_retry()?;
        let user_id = self.user_id.clone();
        let handoff = self.uploader.upload(&mut self.tasks[index], &user_id).await?;
        self.track_handoff(&handoff.document_id).await;
        Ok(())
    }

    /// Cancel all reconciliation loops (the batch is being torn down).
    pub fn shutdown(&self) {
        self.monitor.shutdown();
    }

    async fn track_handoff(&self, document_id: &str) {
        self.monitor
            .start_tracking(
                document_id,
                ProgressPatch {
                    upload_progress: Some(100),
                    status: Some(DocumentStatus::Processing),
                    processing_stage: Some("Queued for processing".to_string()),
                    ..Default::default()
                },
            )
            .await;
    }
}

impl Drop for BatchController {
    fn drop(&mut self) {
        self.monitor.shutdown();
    }
}
