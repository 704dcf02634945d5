// /////////////////////////////////////////////////////////////////////////////
// Staged Event Buffer
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Chunk Store Port
//!
//! The storage-backend abstraction behind the buffer engine. A store does two
//! things: mint fresh chunks on demand and, at startup, hand back whatever
//! stage and queue content survived from a previous run.
//!
//! Backend operations are synchronous by contract; file-backed stores may
//! block on disk and callers tolerate this.

use std::collections::HashMap;
use std::sync::Arc;

use crate::entities::Chunk;
use crate::error::BufferError;
use crate::value_objects::Metadata;

/// Interface for chunk storage backends.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: `generate_chunk` is called
/// concurrently from writer threads. Chunks returned from this trait are not
/// yet shared — the engine wraps each one behind its own lock before any
/// concurrent access happens.
pub trait ChunkStore: Send + Sync {
    /// Creates a fresh chunk in the *unstaged* state for the given metadata,
    /// with a new unique id.
    fn generate_chunk(&self, metadata: Arc<Metadata>) -> Result<Box<dyn Chunk>, BufferError>;

    /// Recovers persisted content once during buffer startup.
    ///
    /// Chunks in the returned stage map must be in the *staged* state; chunks
    /// in the returned queue must be *queued*, ordered oldest first.
    /// Non-durable backends return empty collections.
    #[allow(clippy::type_complexity)]
    fn resume(&self) -> Result<(HashMap<Arc<Metadata>, Box<dyn Chunk>>, Vec<Box<dyn Chunk>>), BufferError>;
}
