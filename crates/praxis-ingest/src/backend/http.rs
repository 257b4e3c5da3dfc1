//! HTTP implementation of the storage backend.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;

use super::{
    Container, DocumentDescriptor, Handoff, RemoteStatus, StorageBackend, TransferReceipt,
};

/// Talks to the ingest API over HTTPS with bearer-token auth.
pub struct HttpBackend {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl StorageBackend for HttpBackend {
    async fn ensure_container(&self, user_id: &str) -> Result<Container> {
        let resp = self
            .client
            .post(self.url("/containers"))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "user_id": user_id }))
            .send()
            .await
            .context("container request failed")?
            .error_for_status()
            .context("container request rejected")?;

        resp.json().await.context("invalid container response")
    }

    async fn transfer_chunk(
        &self,
        container_id: &str,
        chunk_index: u32,
        total_chunks: u32,
        bytes: Bytes,
        descriptor: &DocumentDescriptor,
    ) -> Result<TransferReceipt> {
        let resp = self
            .client
            .post(self.url(&format!("/containers/{container_id}/chunks")))
            .bearer_auth(&self.api_key)
            .header("x-chunk-index", chunk_index)
            .header("x-total-chunks", total_chunks)
            .header("x-file-name", &descriptor.file_name)
            .header("content-type", "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .with_context(|| format!("chunk {chunk_index} transfer failed"))?
            .error_for_status()
            .with_context(|| format!("chunk {chunk_index} rejected"))?;

        resp.json().await.context("invalid chunk receipt")
    }

    async fn transfer_whole(
        &self,
        container_id: &str,
        bytes: Bytes,
        descriptor: &DocumentDescriptor,
    ) -> Result<TransferReceipt> {
        let resp = self
            .client
            .post(self.url(&format!("/containers/{container_id}/content")))
            .bearer_auth(&self.api_key)
            .header("x-file-name", &descriptor.file_name)
            .header("content-type", "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .context("transfer failed")?
            .error_for_status()
            .context("transfer rejected")?;

        resp.json().await.context("invalid transfer receipt")
    }

    async fn finalize(
        &self,
        container_id: &str,
        descriptor: &DocumentDescriptor,
    ) -> Result<Handoff> {
        let resp = self
            .client
            .post(self.url(&format!("/containers/{container_id}/finalize")))
            .bearer_auth(&self.api_key)
            .json(descriptor)
            .send()
            .await
            .context("finalize request failed")?
            .error_for_status()
            .context("finalize rejected")?;

        resp.json().await.context("invalid finalize response")
    }

    async fn fetch_status(&self, document_id: &str) -> Result<RemoteStatus> {
        let resp = self
            .client
            .get(self.url(&format!("/documents/{document_id}/status")))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("status request failed")?
            .error_for_status()
            .context("status request rejected")?;

        resp.json().await.context("invalid status response")
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}
