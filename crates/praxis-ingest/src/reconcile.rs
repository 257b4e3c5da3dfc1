//! Progress reconciliation against the backend's processing pipeline.
//!
//! After a transfer is handed off, the backend keeps reassembling and
//! indexing on its own schedule, and the client owns no persistent
//! connection to it. The [`ProgressMonitor`] keeps an owned
//! registry of tracked documents and reconciles each one by polling the
//! authoritative status until a terminal state or the tracking timeout.
//!
//! One registry exists per batch controller, never process-wide. Each
//! tracked document is served by exactly one spawned loop that owns both
//! its poll interval and its timeout deadline behind a single cancellation
//! token, so stopping tracking clears both together.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::backend::{RemoteProcessingStatus, RemoteStatus, RemoteUploadStatus, StorageBackend};
use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::events::{ProgressEmitter, UploadEvent};

/// Unified five-state view of a tracked document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Uploading,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl DocumentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Reconciled progress for one tracked document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentProgress {
    pub document_id: String,
    pub upload_progress: u8,
    /// Human-readable stage label for the UI.
    pub processing_stage: String,
    pub status: DocumentStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl DocumentProgress {
    fn new(document_id: &str) -> Self {
        Self {
            document_id: document_id.to_string(),
            upload_progress: 0,
            processing_stage: "Uploading".to_string(),
            status: DocumentStatus::Uploading,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    fn apply(&mut self, patch: ProgressPatch) {
        if let Some(progress) = patch.upload_progress {
            self.upload_progress = progress;
        }
        if let Some(stage) = patch.processing_stage {
            self.processing_stage = stage;
        }
        if let Some(error) = patch.error {
            self.error = Some(error);
        }
        if let Some(status) = patch.status {
            self.status = status;
            if status.is_terminal() && self.completed_at.is_none() {
                self.completed_at = Some(Utc::now());
            }
        }
    }
}

/// Partial update merged into a [`DocumentProgress`] record.
#[derive(Debug, Clone, Default)]
pub struct ProgressPatch {
    pub upload_progress: Option<u8>,
    pub processing_stage: Option<String>,
    pub status: Option<DocumentStatus>,
    pub error: Option<String>,
}

/// Map the backend's two independent status axes onto the unified model.
///
/// Precedence: an unfinished upload axis wins, then active processing,
/// then completion, then failure on either axis. An uploaded document
/// whose processing has not started yet counts as processing (queued).
pub(crate) fn unify(remote: &RemoteStatus) -> (DocumentStatus, &'static str) {
    use RemoteProcessingStatus as P;
    use RemoteUploadStatus as U;

    match (remote.upload_status, remote.processing_status) {
        (U::Pending | U::Uploading, _) => (DocumentStatus::Uploading, "Uploading"),
        (_, P::Processing) => (DocumentStatus::Processing, "Extracting and indexing"),
        (_, P::Completed) => (DocumentStatus::Completed, "Ready"),
        (U::Failed, _) | (_, P::Failed) => (DocumentStatus::Failed, "Failed"),
        (U::Uploaded, P::Pending) => (DocumentStatus::Processing, "Queued for processing"),
    }
}

struct Tracked {
    progress: DocumentProgress,
    cancel: CancellationToken,
}

/// Owned registry of documents being reconciled.
#[derive(Clone)]
pub struct ProgressMonitor {
    backend: Arc<dyn StorageBackend>,
    emitter: Arc<dyn ProgressEmitter>,
    config: IngestConfig,
    tracked: Arc<RwLock<HashMap<String, Tracked>>>,
    /// Master token; every per-document loop runs under a child of it.
    cancel: CancellationToken,
}

impl ProgressMonitor {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        emitter: Arc<dyn ProgressEmitter>,
        config: IngestConfig,
    ) -> Self {
        Self {
            backend,
            emitter,
            config,
            tracked: Arc::new(RwLock::new(HashMap::new())),
            cancel: CancellationToken::new(),
        }
    }

    /// Begin reconciling a document. A second call for an id already being
    /// tracked is a no-op.
    pub async fn start_tracking(&self, document_id: &str, initial: ProgressPatch) {
        let mut tracked = self.tracked.write().await;
        if tracked.contains_key(document_id) {
            tracing::debug!(document_id = %document_id, "Already tracking");
            return;
        }

        let mut progress = DocumentProgress::new(document_id);
        progress.apply(initial);

        let cancel = self.cancel.child_token();
        tracked.insert(
            document_id.to_string(),
            Tracked {
                progress: progress.clone(),
                cancel: cancel.clone(),
            },
        );
        drop(tracked);

        self.emitter.emit(UploadEvent::Document { progress });
        tracing::info!(document_id = %document_id, "Tracking started");

        let monitor = self.clone();
        let document_id = document_id.to_string();
        tokio::spawn(async move {
            monitor.run_poll_loop(document_id, cancel).await;
        });
    }

    /// Stop reconciling a document. Clears the poll interval and the
    /// timeout together; idempotent, a second call is a no-op. Stopping
    /// does not abort anything server-side; it only ends local tracking.
    pub async fn stop_tracking(&self, document_id: &str) {
        let removed = self.tracked.write().await.remove(document_id);
        let Some(tracked) = removed else {
            return;
        };

        tracked.cancel.cancel();
        if !tracked.progress.status.is_terminal() {
            let mut progress = tracked.progress;
            progress.status = DocumentStatus::Cancelled;
            progress.completed_at = Some(Utc::now());
            self.emitter.emit(UploadEvent::Document { progress });
        }
        tracing::info!(document_id = %document_id, "Tracking stopped");
    }

    /// Merge an optimistic local update into a tracked record.
    pub async fn update_progress(&self, document_id: &str, patch: ProgressPatch) {
        let mut tracked = self.tracked.write().await;
        if let Some(t) = tracked.get_mut(document_id) {
            t.progress.apply(patch);
            self.emitter.emit(UploadEvent::Document {
                progress: t.progress.clone(),
            });
        }
    }

    /// Current reconciled progress for a document, if tracked.
    pub async fn get(&self, document_id: &str) -> Option<DocumentProgress> {
        self.tracked
            .read()
            .await
            .get(document_id)
            .map(|t| t.progress.clone())
    }

    pub async fn tracked_count(&self) -> usize {
        self.tracked.read().await.len()
    }

    /// Cancel every tracking loop. Records are left for inspection.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn run_poll_loop(self, document_id: String, cancel: CancellationToken) {
        let deadline = tokio::time::Instant::now() + self.config.poll_timeout();
        let mut interval = tokio::time::interval(self.config.poll_interval());
        // A slow fetch must not cause a burst of catch-up polls; ticks are
        // also inherently non-overlapping because the fetch is awaited
        // inside the tick arm.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::debug!(document_id = %document_id, "Poll loop cancelled");
                    return;
                }

                _ = tokio::time::sleep_until(deadline) => {
                    let timeout_secs = self.config.poll_timeout().as_secs();
                    tracing::warn!(document_id = %document_id, timeout_secs, "Tracking timed out");
                    self.apply_patch(&document_id, ProgressPatch {
                        status: Some(DocumentStatus::Failed),
                        processing_stage: Some("Timed out".to_string()),
                        error: Some(IngestError::Timeout(timeout_secs).to_string()),
                        ..Default::default()
                    })
                    .await;
                    return;
                }

                _ = interval.tick() => {
                    let remote = match self.backend.fetch_status(&document_id).await {
                        Ok(remote) => remote,
                        Err(e) => {
                            // Transient fault: a single failed poll must not
                            // abort tracking. The timeout bounds the total wait.
                            tracing::warn!(document_id = %document_id, error = %e, "Status poll failed, will retry");
                            continue;
                        }
                    };

                    let (status, stage) = unify(&remote);
                    match status {
                        DocumentStatus::Completed => {
                            self.apply_patch(&document_id, ProgressPatch {
                                upload_progress: Some(100),
                                processing_stage: Some(stage.to_string()),
                                status: Some(DocumentStatus::Completed),
                                ..Default::default()
                            })
                            .await;
                            tracing::info!(document_id = %document_id, "Document processing completed");
                            self.schedule_removal(document_id.clone(), cancel.clone());
                            return;
                        }
                        DocumentStatus::Failed => {
                            let error = remote.error_message.unwrap_or_else(|| {
                                "document processing failed".to_string()
                            });
                            tracing::error!(document_id = %document_id, error = %error, "Document processing failed");
                            self.apply_patch(&document_id, ProgressPatch {
                                processing_stage: Some(stage.to_string()),
                                status: Some(DocumentStatus::Failed),
                                error: Some(error),
                                ..Default::default()
                            })
                            .await;
                            // Record retained so the UI can keep showing the
                            // error; polling stops here.
                            return;
                        }
                        _ => {
                            self.apply_patch(&document_id, ProgressPatch {
                                status: Some(status),
                                processing_stage: Some(stage.to_string()),
                                ..Default::default()
                            })
                            .await;
                        }
                    }
                }
            }
        }
    }

    /// Keep a completed record visible for a short grace period before
    /// removing it, so the UI can paint the final state.
    fn schedule_removal(&self, document_id: String, cancel: CancellationToken) {
        let monitor = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(monitor.config.completed_linger()) => {}
            }
            monitor.tracked.write().await.remove(&document_id);
        });
    }

    async fn apply_patch(&self, document_id: &str, patch: ProgressPatch) {
        let mut tracked = self.tracked.write().await;
        if let Some(t) = tracked.get_mut(document_id) {
            t.progress.apply(patch);
            self.emitter.emit(UploadEvent::Document {
                progress: t.progress.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CollectingEmitter, MockBackend};
    use std::time::Duration;

    fn remote(upload: RemoteUploadStatus, processing: RemoteProcessingStatus) -> RemoteStatus {
        RemoteStatus {
            upload_status: upload,
            processing_status: processing,
            error_message: None,
        }
    }

    fn monitor_with(backend: Arc<MockBackend>) -> (ProgressMonitor, Arc<CollectingEmitter>) {
        let emitter = Arc::new(CollectingEmitter::default());
        let monitor = ProgressMonitor::new(backend, emitter.clone(), IngestConfig::default());
        (monitor, emitter)
    }

    #[test]
    fn test_unify_precedence() {
        use DocumentStatus as D;
        use RemoteProcessingStatus as P;
        use RemoteUploadStatus as U;

        assert_eq!(unify(&remote(U::Pending, P::Pending)).0, D::Uploading);
        assert_eq!(unify(&remote(U::Uploading, P::Processing)).0, D::Uploading);
        assert_eq!(unify(&remote(U::Uploaded, P::Processing)).0, D::Processing);
        assert_eq!(unify(&remote(U::Uploaded, P::Completed)).0, D::Completed);
        assert_eq!(unify(&remote(U::Uploaded, P::Failed)).0, D::Failed);
        assert_eq!(unify(&remote(U::Failed, P::Pending)).0, D::Failed);
        // Uploaded but not yet picked up counts as queued processing.
        assert_eq!(unify(&remote(U::Uploaded, P::Pending)).0, D::Processing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_document_stops_polling_and_lingers() {
        let backend = Arc::new(MockBackend::new());
        backend.set_status_script(vec![
            remote(RemoteUploadStatus::Uploaded, RemoteProcessingStatus::Processing),
            remote(RemoteUploadStatus::Uploaded, RemoteProcessingStatus::Completed),
        ]);
        let (monitor, emitter) = monitor_with(backend.clone());

        monitor.start_tracking("doc-1", ProgressPatch::default()).await;

        // Two poll ticks reach the terminal state.
        tokio::time::sleep(Duration::from_secs(3)).await;
        let progress = monitor.get("doc-1").await.unwrap();
        assert_eq!(progress.status, DocumentStatus::Completed);
        assert!(progress.completed_at.is_some());
        assert_eq!(progress.upload_progress, 100);

        // Polling stopped at the terminal state.
        let calls = backend.status_calls();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(backend.status_calls(), calls);

        // The record was removed after the grace period.
        assert!(monitor.get("doc-1").await.is_none());

        let statuses = emitter.document_statuses();
        assert_eq!(*statuses.last().unwrap(), DocumentStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_document_stops_polling_and_retains_error() {
        let backend = Arc::new(MockBackend::new());
        backend.set_status_script(vec![RemoteStatus {
            upload_status: RemoteUploadStatus::Uploaded,
            processing_status: RemoteProcessingStatus::Failed,
            error_message: Some("embedding pipeline crashed".to_string()),
        }]);
        let (monitor, _emitter) = monitor_with(backend.clone());

        monitor.start_tracking("doc-2", ProgressPatch::default()).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        let progress = monitor.get("doc-2").await.unwrap();
        assert_eq!(progress.status, DocumentStatus::Failed);
        assert_eq!(progress.error.as_deref(), Some("embedding pipeline crashed"));
        assert!(progress.completed_at.is_some());

        // No further polls; the failed record stays for inspection.
        let calls = backend.status_calls();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(backend.status_calls(), calls);
        assert!(monitor.get("doc-2").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracking_times_out_when_no_terminal_state_arrives() {
        let backend = Arc::new(MockBackend::new());
        backend.set_status_script(vec![remote(
            RemoteUploadStatus::Uploaded,
            RemoteProcessingStatus::Processing,
        )]);
        let (monitor, _emitter) = monitor_with(backend.clone());

        monitor.start_tracking("doc-3", ProgressPatch::default()).await;

        // Just before the window the document is still processing.
        tokio::time::sleep(Duration::from_secs(295)).await;
        assert_eq!(
            monitor.get("doc-3").await.unwrap().status,
            DocumentStatus::Processing
        );

        // Crossing the window forces a distinguishable failure.
        tokio::time::sleep(Duration::from_secs(10)).await;
        let progress = monitor.get("doc-3").await.unwrap();
        assert_eq!(progress.status, DocumentStatus::Failed);
        assert!(progress.error.as_deref().unwrap().contains("timed out"));

        // Both timers are gone: no more polls accumulate.
        let calls = backend.status_calls();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(backend.status_calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_poll_failures_do_not_abort_tracking() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_next_status_fetches(2);
        backend.set_status_script(vec![remote(
            RemoteUploadStatus::Uploaded,
            RemoteProcessingStatus::Completed,
        )]);
        let (monitor, _emitter) = monitor_with(backend.clone());

        monitor.start_tracking("doc-4", ProgressPatch::default()).await;
        tokio::time::sleep(Duration::from_secs(7)).await;

        let progress = monitor.get("doc-4").await.unwrap();
        assert_eq!(progress.status, DocumentStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_tracking_is_idempotent() {
        let backend = Arc::new(MockBackend::new());
        backend.set_status_script(vec![remote(
            RemoteUploadStatus::Uploaded,
            RemoteProcessingStatus::Processing,
        )]);
        let (monitor, emitter) = monitor_with(backend.clone());

        monitor.start_tracking("doc-5", ProgressPatch::default()).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        monitor.stop_tracking("doc-5").await;
        monitor.stop_tracking("doc-5").await;

        assert!(monitor.get("doc-5").await.is_none());

        // No timers survive: the poll count stays frozen.
        let calls = backend.status_calls();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(backend.status_calls(), calls);

        // Exactly one cancellation event was emitted.
        let cancelled = emitter
            .document_statuses()
            .into_iter()
            .filter(|s| *s == DocumentStatus::Cancelled)
            .count();
        assert_eq!(cancelled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_tracking_twice_is_a_no_op() {
        let backend = Arc::new(MockBackend::new());
        backend.set_status_script(vec![remote(
            RemoteUploadStatus::Uploaded,
            RemoteProcessingStatus::Processing,
        )]);
        let (monitor, _emitter) = monitor_with(backend.clone());

        monitor.start_tracking("doc-6", ProgressPatch::default()).await;
        monitor.start_tracking("doc-6", ProgressPatch::default()).await;
        assert_eq!(monitor.tracked_count().await, 1);

        // A single poll loop produces one fetch per interval, not two.
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(backend.status_calls() <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_progress_merges_optimistic_patch() {
        let backend = Arc::new(MockBackend::new());
        backend.set_status_script(vec![remote(
            RemoteUploadStatus::Uploaded,
            RemoteProcessingStatus::Processing,
        )]);
        let (monitor, _emitter) = monitor_with(backend.clone());

        monitor
            .start_tracking(
                "doc-7",
                ProgressPatch {
                    upload_progress: Some(100),
                    status: Some(DocumentStatus::Processing),
                    ..Default::default()
                },
            )
            .await;

        let progress = monitor.get("doc-7").await.unwrap();
        assert_eq!(progress.upload_progress, 100);
        assert_eq!(progress.status, DocumentStatus::Processing);

        monitor
            .update_progress(
                "doc-7",
                ProgressPatch {
                    processing_stage: Some("Optimizing".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(monitor.get("doc-7").await.unwrap().processing_stage, "Optimizing");
    }
}
