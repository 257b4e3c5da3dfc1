//! Progress event surface.
//!
//! Every state transition in the engine flows through a single dispatch
//! point ([`ProgressEmitter::emit`]) as a typed event, so transitions stay
//! traceable and testable without touching any rendering layer. UI hosts
//! consume the receiver side of a [`ChannelEmitter`].

use serde::Serialize;
use tokio::sync::mpsc;

use crate::reconcile::DocumentProgress;
use crate::task::UploadPhase;

/// Events emitted while a batch is uploading and reconciling.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UploadEvent {
    /// A task entered a new lifecycle phase.
    Phase { task_id: String, phase: UploadPhase },
    /// A chunk finished transferring.
    Chunk {
        task_id: String,
        chunk_index: u32,
        total_chunks: u32,
        overall_progress: u8,
    },
    /// Coarse overall progress for a task.
    Overall {
        task_id: String,
        overall_progress: u8,
    },
    /// Transfer handoff succeeded; the document is now tracked by id.
    TaskSucceeded {
        task_id: String,
        document_id: String,
    },
    /// The task failed; `can_retry` reflects the remaining retry budget.
    TaskFailed {
        task_id: String,
        error: String,
        can_retry: bool,
    },
    /// Reconciled authoritative progress for a tracked document.
    Document { progress: DocumentProgress },
}

/// Sink for engine events.
///
/// Implement this to receive progress notifications; the engine never
/// blocks on a slow consumer.
pub trait ProgressEmitter: Send + Sync {
    fn emit(&self, event: UploadEvent);
}

/// No-op implementation for testing.
pub struct NoOpEmitter;

impl ProgressEmitter for NoOpEmitter {
    fn emit(&self, _event: UploadEvent) {}
}

/// Emitter backed by an unbounded channel.
///
/// Unbounded so producers inside transfer and poll loops never stall on a
/// congested UI; event volume is bounded by chunk counts and poll ticks.
pub struct ChannelEmitter {
    tx: mpsc::UnboundedSender<UploadEvent>,
}

impl ChannelEmitter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UploadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressEmitter for ChannelEmitter {
    fn emit(&self, event: UploadEvent) {
        // A closed receiver just means no one is listening anymore.
        let _ = self.tx.send(event);
    }
}
