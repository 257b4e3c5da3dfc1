//! Shared fixtures for engine tests: a scriptable in-memory backend and a
//! collecting event sink.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;

use crate::backend::{
    Container, DocumentDescriptor, Handoff, RemoteProcessingStatus, RemoteStatus,
    RemoteUploadStatus, StorageBackend, TransferReceipt,
};
use crate::events::{ProgressEmitter, UploadEvent};

/// In-memory backend whose failures and status reports are scripted per
/// test. All counters are interior-mutable so tests can share it behind an
/// `Arc`.
pub(crate) struct MockBackend {
    prepare_failures: AtomicUsize,
    chunk_failures: AtomicUsize,
    finalize_failures: AtomicUsize,
    status_failures: AtomicUsize,
    reject_transfers: AtomicBool,
    chunk_log: Mutex<Vec<u32>>,
    whole_calls: AtomicUsize,
    finalize_calls: AtomicUsize,
    status_calls: AtomicUsize,
    /// Successive `fetch_status` responses; the last entry repeats once the
    /// script is exhausted.
    status_script: Mutex<Vec<RemoteStatus>>,
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self {
            prepare_failures: AtomicUsize::new(0),
            chunk_failures: AtomicUsize::new(0),
            finalize_failures: AtomicUsize::new(0),
            status_failures: AtomicUsize::new(0),
            reject_transfers: AtomicBool::new(false),
            chunk_log: Mutex::new(Vec::new()),
            whole_calls: AtomicUsize::new(0),
            finalize_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            status_script: Mutex::new(vec![RemoteStatus {
                upload_status: RemoteUploadStatus::Uploaded,
                processing_status: RemoteProcessingStatus::Completed,
                error_message: None,
            }]),
        }
    }

    pub(crate) fn fail_next_prepares(&self, count: usize) {
        self.prepare_failures.store(count, Ordering::SeqCst);
    }

    pub(crate) fn fail_next_chunks(&self, count: usize) {
        self.chunk_failures.store(count, Ordering::SeqCst);
    }

    pub(crate) fn fail_next_finalizes(&self, count: usize) {
        self.finalize_failures.store(count, Ordering::SeqCst);
    }

    pub(crate) fn fail_next_status_fetches(&self, count: usize) {
        self.status_failures.store(count, Ordering::SeqCst);
    }

    pub(crate) fn reject_transfers(&self, reject: bool) {
        self.reject_transfers.store(reject, Ordering::SeqCst);
    }

    /// Script the sequence of status responses; the last one repeats.
    pub(crate) fn set_status_script(&self, script: Vec<RemoteStatus>) {
        *self.status_script.lock().unwrap() = script;
    }

    pub(crate) fn chunk_indices(&self) -> Vec<u32> {
        self.chunk_log.lock().unwrap().clone()
    }

    pub(crate) fn whole_calls(&self) -> usize {
        self.whole_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    async fn ensure_container(&self, user_id: &str) -> Result<Container> {
        if Self::take_failure(&self.prepare_failures) {
            return Err(anyhow!("mock: container unavailable"));
        }
        Ok(Container {
            container_id: format!("container-{user_id}"),
        })
    }

    async fn transfer_chunk(
        &self,
        _container_id: &str,
        chunk_index: u32,
        _total_chunks: u32,
        _bytes: Bytes,
        _descriptor: &DocumentDescriptor,
    ) -> Result<TransferReceipt> {
        if Self::take_failure(&self.chunk_failures) {
            return Err(anyhow!("mock: chunk {chunk_index} dropped"));
        }
        self.chunk_log.lock().unwrap().push(chunk_index);
        Ok(TransferReceipt {
            accepted: !self.reject_transfers.load(Ordering::SeqCst),
        })
    }

    async fn transfer_whole(
        &self,
        _container_id: &str,
        _bytes: Bytes,
        _descriptor: &DocumentDescriptor,
    ) -> Result<TransferReceipt> {
        self.whole_calls.fetch_add(1, Ordering::SeqCst);
        Ok(TransferReceipt {
            accepted: !self.reject_transfers.load(Ordering::SeqCst),
        })
    }

    async fn finalize(
        &self,
        _container_id: &str,
        descriptor: &DocumentDescriptor,
    ) -> Result<Handoff> {
        if Self::take_failure(&self.finalize_failures) {
            return Err(anyhow!("mock: finalize rejected"));
        }
        let n = self.finalize_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Handoff {
            document_id: format!("doc-{n}"),
            backend_file_ref: format!("ref-{}", descriptor.file_name),
        })
    }

    async fn fetch_status(&self, _document_id: &str) -> Result<RemoteStatus> {
        if Self::take_failure(&self.status_failures) {
            return Err(anyhow!("mock: status endpoint unavailable"));
        }
        let call = self.status_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.status_script.lock().unwrap();
        let index = call.min(script.len().saturating_sub(1));
        Ok(script[index].clone())
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}

/// Event sink that records everything for assertions.
#[derive(Default)]
pub(crate) struct CollectingEmitter {
    events: Mutex<Vec<UploadEvent>>,
}

impl CollectingEmitter {
    pub(crate) fn events(&self) -> Vec<UploadEvent> {
        self.events.lock().unwrap().clone()
    }

    /// `(chunk_index, total_chunks, overall_progress)` per chunk event.
    pub(crate) fn chunk_events(&self) -> Vec<(u32, u32, u8)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                UploadEvent::Chunk {
                    chunk_index,
                    total_chunks,
                    overall_progress,
                    ..
                } => Some((chunk_index, total_chunks, overall_progress)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn overall_progress_values(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                UploadEvent::Overall {
                    overall_progress, ..
                } => Some(overall_progress),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn document_statuses(&self) -> Vec<crate::reconcile::DocumentStatus> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                UploadEvent::Document { progress } => Some(progress.status),
                _ => None,
            })
            .collect()
    }
}

impl ProgressEmitter for CollectingEmitter {
    fn emit(&self, event: UploadEvent) {
        self.events.lock().unwrap().push(event);
    }
}
