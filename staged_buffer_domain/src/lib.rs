// /////////////////////////////////////////////////////////////////////////////
// Staged Event Buffer
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Buffer Domain
//!
//! The buffer domain represents the core business logic and rules of the
//! staged event buffer: the vocabulary an event forwarding agent uses to talk
//! about buffered data. It implements Domain-Driven Design (DDD) patterns and
//! is completely independent of external concerns like storage backends, file
//! systems, or the agent runtime that hosts the buffer.
//!
//! ## Module Structure
//!
//! - [`value_objects`]: Immutable domain values — [`Metadata`] descriptors,
//!   [`ChunkId`] identities, [`Record`] payloads, and the [`BufferLimits`]
//!   sizing policy.
//! - [`entities`]: The [`Chunk`] contract — an append-only record container
//!   with a small state machine and transactional commit/rollback semantics.
//! - [`repositories`]: Ports the buffer engine needs from a storage backend
//!   ([`ChunkStore`]).
//! - [`error`]: The [`BufferError`] taxonomy shared by every layer.
//!
//! ## Domain Concepts
//!
//! ### Value Objects
//! Compared by value, immutable after construction, self-validating:
//!
//! - `Metadata`: `(timekey, tag, variables)` triple grouping records that
//!   share a routing destination or time window
//! - `Record`: a timestamped, opaque event payload
//! - `ChunkId`: time-sortable unique identity of a chunk
//! - `BufferLimits`: validated sizing policy (chunk limit, total limit,
//!   record limit, full threshold)
//!
//! ### Entities
//! Objects with identity whose state changes over time:
//!
//! - `Chunk` (trait): append-only container moving through
//!   unstaged/staged → queued → closed
//!
//! ### Repositories
//! Abstractions over chunk persistence:
//!
//! - `ChunkStore`: creates fresh chunks and resumes previously persisted
//!   stage/queue content on startup
//!
//! ## Business Rules and Invariants
//!
//! - Appends to a chunk are reversible until `commit`; `rollback` restores
//!   the last committed observable state
//! - Chunk state transitions are monotonic: staged→queued→closed,
//!   unstaged→queued→closed, or staged→closed (empty-enqueue shortcut)
//! - A chunk above `chunk_limit_size` (or `chunk_records_limit`) is *over*
//!   and its last append must be rolled back; a chunk at or beyond the
//!   configured fraction of a limit is *full* and should be enqueued

pub mod entities;
pub mod error;
pub mod repositories;
pub mod value_objects;

// Re-export commonly used types for convenient access
// These exports provide a clean API surface for consumers of the domain layer
pub use entities::{Chunk, ChunkState};
pub use error::BufferError;
pub use repositories::ChunkStore;
pub use value_objects::{BufferLimits, ChunkId, Metadata, Record};
