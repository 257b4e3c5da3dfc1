//! Chunk planning for outgoing payloads.
//!
//! The backend reassembles chunks by index, so the plan computed here is
//! fixed at task creation and never revised mid-transfer.

use std::ops::Range;

use serde::Serialize;

use crate::config::IngestConfig;

/// Chunking decision for a single payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkPlan {
    pub is_chunked: bool,
    pub total_chunks: u32,
}

impl ChunkPlan {
    /// Decide whether a payload of `size` bytes needs chunking.
    ///
    /// Payloads above the threshold are split into ceil(size / chunk_size)
    /// pieces; everything else transfers as a single unit.
    pub fn plan(size: u64, config: &IngestConfig) -> Self {
        if size > config.chunk_threshold {
            Self {
                is_chunked: true,
                total_chunks: size.div_ceil(config.chunk_size) as u32,
            }
        } else {
            Self {
                is_chunked: false,
                total_chunks: 1,
            }
        }
    }
}

/// Byte ranges covering `size` bytes in `chunk_size` steps, in index order.
///
/// The final range may be shorter; every other range is exactly
/// `chunk_size` long.
pub fn byte_ranges(size: u64, chunk_size: u64) -> impl Iterator<Item = Range<usize>> {
    let chunk_size = chunk_size.max(1);
    (0..size.div_ceil(chunk_size)).map(move |i| {
        let start = i * chunk_size;
        let end = (start + chunk_size).min(size);
        start as usize..end as usize
    })
}
