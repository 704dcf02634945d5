// /////////////////////////////////////////////////////////////////////////////
// Staged Event Buffer
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # In-Memory Chunk Store
//!
//! The memory-resident chunk backend: fastest option, no durability. Chunk
//! content lives in a plain byte vector; the commit/rollback snapshot is a
//! pair of high-water marks (committed byte length and committed record
//! count), so rollback is a truncate.
//!
//! Because nothing survives the process, `resume` always reports an empty
//! stage and queue.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use staged_buffer_domain::{BufferError, Chunk, ChunkId, ChunkState, ChunkStore, Metadata, Record};

/// Memory-resident chunk with truncate-based rollback.
///
/// Not internally synchronized: the buffer engine serializes access behind
/// the per-chunk lock. Appends accumulate after the committed high-water
/// marks; `commit` advances the marks, `rollback` truncates back to them.
pub struct MemoryChunk {
    id: ChunkId,
    metadata: Arc<Metadata>,
    state: ChunkState,
    buffer: Vec<u8>,
    record_count: usize,
    committed_bytes: usize,
    committed_records: usize,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

impl MemoryChunk {
    /// Creates an empty unstaged chunk for the given metadata
    pub fn new(metadata: Arc<Metadata>) -> Self {
        let now = Utc::now();
        MemoryChunk {
            id: ChunkId::new(),
            metadata,
            state: ChunkState::Unstaged,
            buffer: Vec::new(),
            record_count: 0,
            committed_bytes: 0,
            committed_records: 0,
            created_at: now,
            modified_at: now,
        }
    }

    /// Gets the creation time
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Gets the last append/commit time
    pub fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    fn ensure_writable(&self) -> Result<(), BufferError> {
        if self.is_writable() {
            Ok(())
        } else {
            Err(BufferError::invalid_chunk_state(format!(
                "chunk {} is not writable in state '{}'",
                self.id, self.state
            )))
        }
    }
}

impl Chunk for MemoryChunk {
    fn unique_id(&self) -> ChunkId {
        self.id
    }

    fn metadata(&self) -> &Arc<Metadata> {
        &self.metadata
    }

    fn state(&self) -> ChunkState {
        self.state
    }

    fn mark_staged(&mut self) {
        self.state = ChunkState::Staged;
    }

    fn mark_queued(&mut self) {
        self.state = ChunkState::Queued;
    }

    fn bytesize(&self) -> u64 {
        self.buffer.len() as u64
    }

    fn record_count(&self) -> usize {
        self.record_count
    }

    fn append(&mut self, records: &[Record]) -> Result<(), BufferError> {
        self.ensure_writable()?;
        for record in records {
            self.buffer.extend_from_slice(record.payload());
        }
        self.record_count += records.len();
        self.modified_at = Utc::now();
        Ok(())
    }

    fn concat(&mut self, payload: &[u8], record_count: usize) -> Result<(), BufferError> {
        self.ensure_writable()?;
        self.buffer.extend_from_slice(payload);
        self.record_count += record_count;
        self.modified_at = Utc::now();
        Ok(())
    }

    fn commit(&mut self) -> Result<(), BufferError> {
        self.committed_bytes = self.buffer.len();
        self.committed_records = self.record_count;
        self.modified_at = Utc::now();
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), BufferError> {
        self.buffer.truncate(self.committed_bytes);
        self.record_count = self.committed_records;
        Ok(())
    }

    fn purge(&mut self) -> Result<(), BufferError> {
        self.buffer = Vec::new();
        self.record_count = 0;
        self.committed_bytes = 0;
        self.committed_records = 0;
        self.state = ChunkState::Closed;
        Ok(())
    }

    fn close(&mut self) -> Result<(), BufferError> {
        self.buffer = Vec::new();
        self.record_count = 0;
        self.committed_bytes = 0;
        self.committed_records = 0;
        self.state = ChunkState::Closed;
        Ok(())
    }

    fn read(&self) -> Result<Vec<u8>, BufferError> {
        Ok(self.buffer[..self.committed_bytes].to_vec())
    }
}

/// Non-durable [`ChunkStore`] minting [`MemoryChunk`]s.
#[derive(Debug, Default)]
pub struct MemoryChunkStore;

impl MemoryChunkStore {
    /// Creates a memory-resident store
    pub fn new() -> Self {
        MemoryChunkStore
    }
}

impl ChunkStore for MemoryChunkStore {
    fn generate_chunk(&self, metadata: Arc<Metadata>) -> Result<Box<dyn Chunk>, BufferError> {
        Ok(Box::new(MemoryChunk::new(metadata)))
    }

    fn resume(&self) -> Result<(HashMap<Arc<Metadata>, Box<dyn Chunk>>, Vec<Box<dyn Chunk>>), BufferError> {
        // Memory content does not survive a restart.
        Ok((HashMap::new(), Vec::new()))
    }
}
