//! Engine configuration.
//!
//! All tunables live here with defaults matching production behavior.
//! Hosts may override them by deserializing a JSON settings file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const MIB: u64 = 1024 * 1024;

/// Files larger than this are split into chunks before transfer.
const CHUNK_THRESHOLD: u64 = 45 * MIB;

/// Upper bound on a single chunk's size.
const CHUNK_SIZE: u64 = 40 * MIB;

/// Transfer progress is capped here until the finalize call confirms the
/// handoff; the remaining tail belongs to finalization.
const TRANSFER_CEILING: u8 = 85;

/// Ceiling for simulated increments while a whole-file transfer is in
/// flight (the transport exposes no byte telemetry for that path).
const SIMULATED_CEILING: u8 = 80;

const POLL_INTERVAL_MS: u64 = 2_000;
const POLL_TIMEOUT_MS: u64 = 5 * 60 * 1_000;

/// How long a completed document stays in the tracking registry so the UI
/// can paint the final state before it disappears.
const COMPLETED_LINGER_MS: u64 = 3_000;

const MAX_RETRIES: u32 = 3;

const MAX_PDF_BYTES: u64 = 500 * MIB;
const MAX_DOCUMENT_BYTES: u64 = 25 * MIB;

const TITLE_MAX_CHARS: usize = 200;
const DESCRIPTION_MAX_CHARS: usize = 2_000;
const CATEGORY_MAX_CHARS: usize = 100;
const TAG_MAX_CHARS: usize = 50;
const MAX_TAGS: usize = 20;

/// Runtime configuration for the ingest engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Byte size above which a payload is chunked.
    pub chunk_threshold: u64,
    /// Maximum bytes per chunk.
    pub chunk_size: u64,
    /// Progress ceiling before finalize confirms the handoff.
    pub transfer_ceiling: u8,
    /// Progress ceiling for the simulated whole-file mode.
    pub simulated_ceiling: u8,
    /// Milliseconds between reconciliation polls.
    pub poll_interval_ms: u64,
    /// Milliseconds before tracking is forced to failed.
    pub poll_timeout_ms: u64,
    /// Milliseconds a completed document lingers before removal.
    pub completed_linger_ms: u64,
    /// Failures after which a task can no longer be retried.
    pub max_retries: u32,
    /// Size cap for PDF payloads.
    pub max_pdf_bytes: u64,
    /// Size cap for every other accepted document type.
    pub max_document_bytes: u64,
    pub title_max_chars: usize,
    pub description_max_chars: usize,
    pub category_max_chars: usize,
    pub tag_max_chars: usize,
    pub max_tags: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_threshold: CHUNK_THRESHOLD,
            chunk_size: CHUNK_SIZE,
            transfer_ceiling: TRANSFER_CEILING,
            simulated_ceiling: SIMULATED_CEILING,
            poll_interval_ms: POLL_INTERVAL_MS,
            poll_timeout_ms: POLL_TIMEOUT_MS,
            completed_linger_ms: COMPLETED_LINGER_MS,
            max_retries: MAX_RETRIES,
            max_pdf_bytes: MAX_PDF_BYTES,
            max_document_bytes: MAX_DOCUMENT_BYTES,
            title_max_chars: TITLE_MAX_CHARS,
            description_max_chars: DESCRIPTION_MAX_CHARS,
            category_max_chars: CATEGORY_MAX_CHARS,
            tag_max_chars: TAG_MAX_CHARS,
            max_tags: MAX_TAGS,
        }
    }
}

impl IngestConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn completed_linger(&self) -> Duration {
        Duration::from_millis(self.completed_linger_ms)
    }

    /// Load configuration from a JSON file, falling back to defaults when
    /// the file is missing or malformed.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Invalid ingest config, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}
