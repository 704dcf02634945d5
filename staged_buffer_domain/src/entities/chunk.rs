// /////////////////////////////////////////////////////////////////////////////
// Staged Event Buffer
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Chunk Entity Contract
//!
//! This module defines the contract every chunk implementation must satisfy:
//! an append-only record container with transactional commit/rollback
//! semantics and a small monotonic state machine. The buffer engine never
//! constructs chunks itself; it obtains them from a
//! [`ChunkStore`](crate::ChunkStore) backend and drives them exclusively
//! through this trait.
//!
//! ## Lifecycle
//!
//! ```text
//!   unstaged ──────────────┐
//!      │                   ▼
//!   staged ───────────► queued ───► closed
//!      │                              ▲
//!      └──────────────────────────────┘   (empty-enqueue shortcut)
//! ```
//!
//! - **Unstaged**: constructed but never inserted into the stage map; used as
//!   overflow while a write is being split across chunks
//! - **Staged**: the active accumulation chunk for its metadata
//! - **Queued**: placed on the delivery queue (also while dequeued by a
//!   consumer and awaiting acknowledgment)
//! - **Closed**: destroyed; terminal
//!
//! Transitions are monotonic: a chunk never returns to an earlier state.
//!
//! ## Transactional Semantics
//!
//! `append` and `concat` build up an uncommitted batch. Until `commit` is
//! called, `rollback` must restore `bytesize`, `record_count`, and content to
//! the last committed snapshot. After `commit`, subsequent appends form a new
//! reversible batch. This is what allows the buffer's write coordinator to
//! tentatively fill a chunk, observe that it went over its size limit, and
//! cleanly take the append back.

use std::sync::Arc;

use crate::error::BufferError;
use crate::value_objects::{ChunkId, Metadata, Record};

/// Lifecycle state of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkState {
    /// Constructed but never inserted into the stage map
    Unstaged,
    /// Active accumulation chunk for its metadata
    Staged,
    /// On the delivery queue (or dequeued, awaiting acknowledgment)
    Queued,
    /// Destroyed
    Closed,
}

impl std::fmt::Display for ChunkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChunkState::Unstaged => "unstaged",
            ChunkState::Staged => "staged",
            ChunkState::Queued => "queued",
            ChunkState::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// Contract for backend-provided chunk implementations.
///
/// Implementations own the actual record storage (memory, files, ...) and the
/// commit/rollback snapshots. Thread safety is *not* part of this contract:
/// the buffer engine serializes all access to a chunk behind a per-chunk
/// reentrant lock, so implementations are written as plain single-threaded
/// state machines (`Send` is required to move chunks between threads).
///
/// # State Discipline
///
/// `mark_staged` and `mark_queued` are driven only by the buffer engine,
/// which upholds the monotonic transition order documented on
/// [`ChunkState`]. `purge` is only invoked on unstaged or dequeued chunks;
/// `close` may be invoked in any state and must be idempotent.
pub trait Chunk: Send {
    /// Gets the chunk's stable identity
    fn unique_id(&self) -> ChunkId;

    /// Gets the metadata this chunk accumulates records for
    fn metadata(&self) -> &Arc<Metadata>;

    /// Gets the current lifecycle state
    fn state(&self) -> ChunkState;

    /// Transitions unstaged → staged (insertion into the stage map)
    fn mark_staged(&mut self);

    /// Transitions staged/unstaged → queued (insertion into the delivery
    /// queue). Backends may use this hook to seal their storage.
    fn mark_queued(&mut self);

    /// Gets the current serialized byte length (committed + uncommitted)
    fn bytesize(&self) -> u64;

    /// Gets the current record count (committed + uncommitted)
    fn record_count(&self) -> usize;

    /// Appends records to the uncommitted batch.
    ///
    /// Reversible via [`rollback`](Chunk::rollback) until
    /// [`commit`](Chunk::commit) is called.
    fn append(&mut self, records: &[Record]) -> Result<(), BufferError>;

    /// Appends an already-serialized batch of `record_count` records.
    ///
    /// Used when the producer supplies a batch formatter; reversible like
    /// [`append`](Chunk::append).
    fn concat(&mut self, payload: &[u8], record_count: usize) -> Result<(), BufferError>;

    /// Finalizes the uncommitted batch; later appends start a new batch
    fn commit(&mut self) -> Result<(), BufferError>;

    /// Restores `bytesize`, `record_count`, and content to the last
    /// committed snapshot
    fn rollback(&mut self) -> Result<(), BufferError>;

    /// Releases persistent backend state. Legal only on unstaged or dequeued
    /// chunks; the chunk is closed afterwards.
    fn purge(&mut self) -> Result<(), BufferError>;

    /// Releases in-memory state. Legal in any state; idempotent.
    fn close(&mut self) -> Result<(), BufferError>;

    /// Reads the committed content back for transmission
    fn read(&self) -> Result<Vec<u8>, BufferError>;

    /// Returns true when the chunk holds no records
    fn is_empty(&self) -> bool {
        self.record_count() == 0
    }

    /// Returns true while the chunk is the active accumulation chunk
    fn is_staged(&self) -> bool {
        self.state() == ChunkState::Staged
    }

    /// Returns true while the chunk was constructed but never staged
    fn is_unstaged(&self) -> bool {
        self.state() == ChunkState::Unstaged
    }

    /// Returns true once the chunk is on (or taken from) the delivery queue
    fn is_queued(&self) -> bool {
        self.state() == ChunkState::Queued
    }

    /// Returns true while the chunk accepts appends (staged or unstaged,
    /// never queued or closed)
    fn is_writable(&self) -> bool {
        matches!(self.state(), ChunkState::Staged | ChunkState::Unstaged)
    }
}
