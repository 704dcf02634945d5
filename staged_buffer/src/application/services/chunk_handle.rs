// /////////////////////////////////////////////////////////////////////////////
// Staged Event Buffer
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Chunk Handle
//!
//! Shareable wrapper around a backend chunk, pairing it with its per-chunk
//! reentrant lock. All concurrent access to a chunk goes through a handle;
//! the raw `Box<dyn Chunk>` never escapes it.
//!
//! ## Why a Reentrant Lock
//!
//! During a transactional write the coordinator holds a chunk's lock while
//! invoking callbacks that themselves lock the same chunk to inspect or
//! mutate it. A reentrant mutex makes those nested acquisitions by the same
//! thread cheap and deadlock-free, and lets the coordinator keep one logical
//! "hold" per registered operation — exactly one release per acquisition, so
//! a chunk registered twice by a retried write is unlocked the right number
//! of times.
//!
//! Reentrant locks hand out shared references, so the chunk sits in a
//! `RefCell` for interior mutability. The lock guarantees only one thread is
//! inside at a time; `RefCell` merely enforces the usual borrow discipline
//! within that thread.
//!
//! ## Identity Reads
//!
//! `unique_id` and `metadata` are immutable for a chunk's whole life, so the
//! handle caches them outside the lock. Queue bookkeeping can read identity
//! without touching the chunk lock.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use parking_lot::lock_api::ArcReentrantMutexGuard;
use parking_lot::{RawMutex, RawThreadId, ReentrantMutex, ReentrantMutexGuard};

use staged_buffer_domain::{BufferError, Chunk, ChunkId, ChunkState, Metadata};

/// Cell type protected by the per-chunk lock.
pub(crate) type ChunkCell = RefCell<Box<dyn Chunk>>;

/// Owned (lifetime-free) guard over a chunk's lock.
///
/// The write coordinator collects these while it operates on several chunks
/// and releases them explicitly after the commit phase, before re-acquiring
/// the buffer-global lock.
pub(crate) type OwnedChunkGuard = ArcReentrantMutexGuard<RawMutex, RawThreadId, ChunkCell>;

/// Shareable, lockable reference to one buffered chunk.
///
/// Cloning a handle is cheap (two `Arc` bumps) and never clones chunk data.
/// Identity accessors ([`unique_id`](ChunkHandle::unique_id),
/// [`metadata`](ChunkHandle::metadata)) are lock-free; everything else
/// acquires the per-chunk reentrant lock for the duration of the call.
#[derive(Clone)]
pub struct ChunkHandle {
    id: ChunkId,
    metadata: Arc<Metadata>,
    cell: Arc<ReentrantMutex<ChunkCell>>,
}

impl ChunkHandle {
    /// Wraps a backend chunk behind its per-chunk lock.
    pub(crate) fn new(chunk: Box<dyn Chunk>) -> Self {
        let id = chunk.unique_id();
        let metadata = Arc::clone(chunk.metadata());
        ChunkHandle {
            id,
            metadata,
            cell: Arc::new(ReentrantMutex::new(RefCell::new(chunk))),
        }
    }

    /// Gets the chunk's stable identity (lock-free)
    pub fn unique_id(&self) -> ChunkId {
        self.id
    }

    /// Gets the chunk's metadata (lock-free)
    pub fn metadata(&self) -> &Arc<Metadata> {
        &self.metadata
    }

    /// Acquires the per-chunk lock for the guard's lifetime
    pub(crate) fn lock(&self) -> ReentrantMutexGuard<'_, ChunkCell> {
        self.cell.lock()
    }

    /// Acquires the per-chunk lock as an owned guard that can outlive this
    /// borrow of the handle
    pub(crate) fn lock_arc(&self) -> OwnedChunkGuard {
        self.cell.lock_arc()
    }

    /// Runs a closure with shared access to the chunk
    pub fn with_chunk<R>(&self, f: impl FnOnce(&dyn Chunk) -> R) -> R {
        let guard = self.cell.lock();
        let chunk = guard.borrow();
        f(&**chunk)
    }

    /// Runs a closure with exclusive access to the chunk
    pub(crate) fn with_chunk_mut<R>(&self, f: impl FnOnce(&mut dyn Chunk) -> R) -> R {
        let guard = self.cell.lock();
        let mut chunk = guard.borrow_mut();
        f(&mut **chunk)
    }

    /// Gets the chunk's current lifecycle state
    pub fn state(&self) -> ChunkState {
        self.with_chunk(|c| c.state())
    }

    /// Gets the chunk's current serialized byte length
    pub fn bytesize(&self) -> u64 {
        self.with_chunk(|c| c.bytesize())
    }

    /// Gets the chunk's current record count
    pub fn record_count(&self) -> usize {
        self.with_chunk(|c| c.record_count())
    }

    /// Returns true when the chunk holds no records
    pub fn is_empty(&self) -> bool {
        self.with_chunk(|c| c.is_empty())
    }

    /// Reads the committed content back for transmission
    pub fn read(&self) -> Result<Vec<u8>, BufferError> {
        self.with_chunk(|c| c.read())
    }
}

impl fmt::Debug for ChunkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkHandle")
            .field("id", &self.id)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}
