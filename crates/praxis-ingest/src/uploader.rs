//! Upload orchestration: prepare → transfer → finalize.
//!
//! One task at a time moves through three suspension points. Chunked
//! payloads are sliced and sent strictly in index order (the backend
//! reassembles by index), with real byte-derived progress after each
//! chunk. Whole-file transfers expose no byte telemetry, so coarse
//! simulated increments are emitted while the call is in flight (a
//! degraded mode, capped below the transfer ceiling).
//!
//! Progress is capped at the transfer ceiling until finalize confirms the
//! handoff; the jump to 100 happens only once a document id exists.

use std::sync::Arc;

use anyhow::anyhow;
use rand::Rng;
use tokio::time::Duration;

use crate::backend::{Handoff, StorageBackend, TransferReceipt};
use crate::chunk::byte_ranges;
use crate::config::IngestConfig;
use crate::error::{IngestError, UploadStep};
use crate::events::{ProgressEmitter, UploadEvent};
use crate::task::{TaskStatus, UploadPhase, UploadTask};

/// Cadence of simulated increments in the degraded whole-file mode.
const SIMULATED_TICK: Duration = Duration::from_millis(400);

/// Drives a single task through the upload pipeline.
pub struct Uploader {
    backend: Arc<dyn StorageBackend>,
    emitter: Arc<dyn ProgressEmitter>,
    config: IngestConfig,
}

impl Uploader {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        emitter: Arc<dyn ProgressEmitter>,
        config: IngestConfig,
    ) -> Self {
        Self {
            backend,
            emitter,
            config,
        }
    }

    /// Upload one task. On success the task is marked `Success` with
    /// progress 100 and the handoff is returned for reconciliation
    /// tracking. On failure the task is marked `Error` with progress
    /// reset to 0; retries re-run every step from scratch.
    pub async fn upload(
        &self,
        task: &mut UploadTask,
        user_id: &str,
    ) -> Result<Handoff, IngestError> {
        debug_assert_eq!(task.status(), TaskStatus::Pending);

        task.begin();
        self.emit_phase(task);
        tracing::info!(
            task_id = %task.id(),
            file = %task.file_name(),
            chunked = task.is_chunked(),
            backend = self.backend.backend_name(),
            "Upload started"
        );

        // Prepare: resolve the destination container. Idempotent on the
        // backend side, so retries may repeat it freely.
        let container = match self.backend.ensure_container(user_id).await {
            Ok(container) => container,
            Err(source) => return Err(self.fail_task(task, UploadStep::Prepare, source)),
        };

        // Transfer.
        let transfer = if task.is_chunked() {
            self.transfer_chunked(task, &container.container_id).await
        } else {
            self.transfer_whole(task, &container.container_id).await
        };
        if let Err(source) = transfer {
            return Err(self.fail_task(task, UploadStep::Transfer, source));
        }

        // Finalize: convert the accepted transfer into a tracked document.
        let handoff = match self
            .backend
            .finalize(&container.container_id, &task.descriptor())
            .await
        {
            Ok(handoff) => handoff,
            Err(source) => return Err(self.fail_task(task, UploadStep::Finalize, source)),
        };

        task.mark_success(handoff.document_id.clone());
        self.emit_phase(task);
        self.emitter.emit(UploadEvent::Overall {
            task_id: task.id().to_string(),
            overall_progress: 100,
        });
        self.emitter.emit(UploadEvent::TaskSucceeded {
            task_id: task.id().to_string(),
            document_id: handoff.document_id.clone(),
        });
        tracing::info!(
            task_id = %task.id(),
            document_id = %handoff.document_id,
            "Upload handed off"
        );

        Ok(handoff)
    }

    /// Slice the payload and send chunks sequentially in index order.
    /// Chunk k+1 is not started until chunk k's receipt has arrived.
    async fn transfer_chunked(
        &self,
        task: &mut UploadTask,
        container_id: &str,
    ) -> anyhow::Result<()> {
        task.enter_phase(UploadPhase::Chunking);
        self.emit_phase(task);

        let payload = task.payload();
        let descriptor = task.descriptor();
        let total = task.total_chunks();

        task.enter_phase(UploadPhase::Uploading);
        self.emit_phase(task);

        for (index, range) in byte_ranges(payload.len() as u64, self.config.chunk_size).enumerate()
        {
            let index = index as u32;
            let piece = payload.slice(range);
            let receipt = self
                .backend
                .transfer_chunk(container_id, index, total, piece, &descriptor)
                .await?;
            ensure_accepted(receipt)?;

            // Real byte-derived progress, scaled into the pre-finalize band.
            let overall =
                ((u64::from(index) + 1) * u64::from(self.config.transfer_ceiling) / u64::from(total)) as u8;
            task.record_chunk(index, overall);
            self.emitter.emit(UploadEvent::Chunk {
                task_id: task.id().to_string(),
                chunk_index: index,
                total_chunks: total,
                overall_progress: task.upload_progress(),
            });
            tracing::debug!(
                task_id = %task.id(),
                chunk = index,
                total,
                "Chunk transferred"
            );
        }

        task.enter_phase(UploadPhase::Reassembling);
        self.emit_phase(task);
        Ok(())
    }

    /// Send the payload in one call, emitting simulated increments while
    /// the request is in flight. The real signal arrives only as the
    /// receipt, so the ceiling for simulated values sits below the
    /// transfer ceiling and the task itself is only advanced on receipt.
    async fn transfer_whole(
        &self,
        task: &mut UploadTask,
        container_id: &str,
    ) -> anyhow::Result<()> {
        task.enter_phase(UploadPhase::Uploading);
        self.emit_phase(task);

        let descriptor = task.descriptor();
        let transfer = self
            .backend
            .transfer_whole(container_id, task.payload(), &descriptor);
        tokio::pin!(transfer);

        let mut ticker = tokio::time::interval(SIMULATED_TICK);
        let mut simulated = task.upload_progress();

        let receipt = loop {
            tokio::select! {
                result = &mut transfer => break result?,

                _ = ticker.tick() => {
                    let step = rand::rng().random_range(3..=9);
                    simulated = simulated
                        .saturating_add(step)
                        .min(self.config.simulated_ceiling);
                    self.emitter.emit(UploadEvent::Overall {
                        task_id: task.id().to_string(),
                        overall_progress: simulated,
                    });
                }
            }
        };
        ensure_accepted(receipt)?;

        task.advance_progress(self.config.transfer_ceiling);
        self.emitter.emit(UploadEvent::Overall {
            task_id: task.id().to_string(),
            overall_progress: task.upload_progress(),
        });
        Ok(())
    }

    /// Mark the task failed and wrap the cause. Other tasks in the batch
    /// are unaffected.
    fn fail_task(
        &self,
        task: &mut UploadTask,
        step: UploadStep,
        source: anyhow::Error,
    ) -> IngestError {
        let message = format!("{step} step failed: {source}");
        task.fail(message.clone());
        self.emit_phase(task);
        self.emitter.emit(UploadEvent::TaskFailed {
            task_id: task.id().to_string(),
            error: message,
            can_retry: task.can_retry(),
        });
        tracing::error!(
            task_id = %task.id(),
            %step,
            error = %source,
            retry_count = task.retry_count(),
            "Upload failed"
        );
        IngestError::transfer(step, source)
    }

    fn emit_phase(&self, task: &UploadTask) {
        self.emitter.emit(UploadEvent::Phase {
            task_id: task.id().to_string(),
            phase: task.phase(),
        });
    }
}

fn ensure_accepted(receipt: TransferReceipt) -> anyhow::Result<()> {
    if receipt.accepted {
        Ok(())
    } else {
        Err(anyhow!("backend did not accept the transfer"))
    }
}
