// /////////////////////////////////////////////////////////////////////////////
// Staged Event Buffer
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Staged Event Buffer
//!
//! A chunked staging-and-queueing buffer that decouples event producers from
//! downstream outputs in a log/event forwarding agent. Producers deliver
//! batches of [`Record`]s keyed by a [`Metadata`] descriptor; the buffer
//! groups records into size-bounded chunks, enqueues them when full or on
//! demand, lets a consumer dequeue chunks for transmission, and handles retry
//! (take-back) and final purge.
//!
//! ## Architecture
//!
//! The crate follows the project's layered architecture:
//!
//! ```text
//! staged_buffer/
//! ├── application/
//! │   └── services/        # StagedBuffer engine: stage/queue bookkeeping,
//! │                        #   lifecycle, and the transactional write
//! │                        #   coordinator
//! └── infrastructure/
//!     ├── adapters/        # MemoryChunkStore: in-memory chunk backend
//!     └── config/          # [buffer] TOML configuration loading
//! ```
//!
//! Domain types (chunk contract, metadata, limits, errors) live in the
//! `staged_buffer_domain` crate and are re-exported here for convenience.
//!
//! ## Chunk Lifecycle
//!
//! Each metadata has at most one *staged* chunk accumulating records. When a
//! chunk reaches the configured fraction of its size limit (or on demand) it
//! moves to a FIFO *queue*; a consumer *dequeues* chunks for transmission and
//! either *purges* them on success or *takes them back* to the head of the
//! queue for retry, giving at-least-once delivery.
//!
//! ## Usage Example
//!
//! ```
//! use staged_buffer::application::services::StagedBuffer;
//! use staged_buffer::infrastructure::adapters::MemoryChunkStore;
//! use staged_buffer::{BufferLimits, Record, WriteOptions};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), staged_buffer::BufferError> {
//! let buffer = StagedBuffer::new(Arc::new(MemoryChunkStore::new()), BufferLimits::default());
//! buffer.start()?;
//!
//! let metadata = buffer.metadata(None, Some("app.access"), None);
//! let records = vec![Record::new(b"event payload".to_vec())];
//! buffer.write(&[(metadata, records)], &WriteOptions::default())?;
//!
//! buffer.enqueue_all()?;
//! if let Some(chunk) = buffer.dequeue_chunk() {
//!     let _payload = chunk.read()?;
//!     buffer.purge_chunk(chunk.unique_id());
//! }
//! buffer.close()?;
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod infrastructure;

// Re-export commonly used types for a clean API surface
pub use application::services::{ChunkHandle, StagedBuffer, WriteOptions};
pub use infrastructure::adapters::MemoryChunkStore;
pub use infrastructure::config::BufferConfig;
pub use staged_buffer_domain::{BufferError, BufferLimits, Chunk, ChunkId, ChunkState, ChunkStore, Metadata, Record};
