// /////////////////////////////////////////////////////////////////////////////
// Staged Event Buffer
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Chunk Identifier Value Object
//!
//! Type-safe, time-sortable identity for buffer chunks.
//!
//! A chunk keeps the same `ChunkId` for its whole life: through staging,
//! enqueueing, dequeueing, take-back, and final purge. Consumers acknowledge
//! chunks by id, so the id must be stable, unique, and cheap to copy.
//!
//! ## Key Features
//!
//! - **Type Safety**: a `ChunkId` cannot be confused with other identifiers
//! - **Temporal Ordering**: ULID-based ids sort by creation time, which makes
//!   buffer directories and logs naturally chronological
//! - **Serialization**: stable string form for logs and acknowledgment
//!   protocols
//!
//! ## Usage Examples
//!
//! ```
//! use staged_buffer_domain::ChunkId;
//!
//! let a = ChunkId::new();
//! let b = ChunkId::new();
//! assert_ne!(a, b);
//!
//! let parsed: ChunkId = a.to_string().parse().unwrap();
//! assert_eq!(a, parsed);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;
use ulid::Ulid;

use crate::BufferError;

/// Unique, time-sortable identifier of a chunk.
///
/// Copy-able newtype over a ULID. Equality and ordering delegate to the
/// underlying ULID, so ids created later compare greater (within ULID's
/// millisecond resolution).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkId(Ulid);

impl ChunkId {
    /// Creates a fresh id for a newly generated chunk
    pub fn new() -> Self {
        ChunkId(Ulid::new())
    }

    /// Wraps an existing ULID (e.g. recovered from a persisted chunk)
    pub fn from_ulid(ulid: Ulid) -> Self {
        ChunkId(ulid)
    }

    /// Gets the underlying ULID
    pub fn as_ulid(&self) -> Ulid {
        self.0
    }

    /// Gets the creation timestamp encoded in the id, in Unix milliseconds
    pub fn timestamp_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }
}

impl Default for ChunkId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChunkId {
    type Err = BufferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s)
            .map(ChunkId)
            .map_err(|e| BufferError::invalid_config(format!("Invalid chunk id '{}': {}", s, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests uniqueness of freshly generated ids.
    #[test]
    fn test_chunk_id_uniqueness() {
        let ids: Vec<ChunkId> = (0..100).map(|_| ChunkId::new()).collect();
        for (i, a) in ids.iter().enumerate() {
            for b in ids.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    /// Tests the string round trip used by acknowledgment protocols.
    #[test]
    fn test_chunk_id_string_round_trip() {
        let id = ChunkId::new();
        let parsed: ChunkId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    /// Tests that malformed id strings are rejected with a configuration
    /// error rather than a panic.
    #[test]
    fn test_chunk_id_rejects_garbage() {
        let err = "not-a-ulid".parse::<ChunkId>().unwrap_err();
        assert_eq!(err.category(), "configuration");
    }
}
