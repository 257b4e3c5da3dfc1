//! Storage backend abstraction.
//!
//! The object-storage and processing pipeline behind the knowledge base is
//! an external collaborator: it reassembles chunks, extracts text and
//! indexes documents on its own schedule. This module pins down the
//! contract the engine depends on; [`http::HttpBackend`] is the production
//! implementation.

pub mod http;

pub use http::HttpBackend;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Destination container for a user's documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    pub container_id: String,
}

/// Metadata accompanying a transfer. Already sanitized by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentDescriptor {
    pub file_name: String,
    pub mime_type: String,
    pub size: u64,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category: String,
}

/// Backend acknowledgement of a transfer call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub accepted: bool,
}

/// Result of a confirmed handoff: the transfer became a tracked document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handoff {
    pub document_id: String,
    pub backend_file_ref: String,
}

/// Upload-acceptance axis of the backend's status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteUploadStatus {
    Pending,
    Uploading,
    Uploaded,
    Failed,
}

/// Content-processing axis of the backend's status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Authoritative status for a document, reported on two independent axes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteStatus {
    pub upload_status: RemoteUploadStatus,
    pub processing_status: RemoteProcessingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Unified interface to the external storage and processing pipeline.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Resolve or create the destination container for a user.
    /// Idempotent; safe to call once per task.
    async fn ensure_container(&self, user_id: &str) -> Result<Container>;

    /// Transfer one chunk of a split payload. Chunks must arrive in index
    /// order because the backend reassembles by index.
    async fn transfer_chunk(
        &self,
        container_id: &str,
        chunk_index: u32,
        total_chunks: u32,
        bytes: Bytes,
        descriptor: &DocumentDescriptor,
    ) -> Result<TransferReceipt>;

    /// Transfer an unsplit payload in a single call.
    async fn transfer_whole(
        &self,
        container_id: &str,
        bytes: Bytes,
        descriptor: &DocumentDescriptor,
    ) -> Result<TransferReceipt>;

    /// Confirm the transfer, converting it into a tracked document.
    async fn finalize(&self, container_id: &str, descriptor: &DocumentDescriptor)
        -> Result<Handoff>;

    /// Fetch authoritative status for a document.
    async fn fetch_status(&self, document_id: &str) -> Result<RemoteStatus>;

    /// Backend name for logging (e.g., "http").
    fn backend_name(&self) -> &'static str;
}
