// /////////////////////////////////////////////////////////////////////////////
// Staged Event Buffer
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Buffer Limits Value Object
//!
//! This module provides the validated sizing policy for the staged event
//! buffer. It bundles the chunk size limit, the buffer-wide total limit, the
//! optional per-chunk record count limit, and the "full" threshold fraction,
//! together with the three predicates the buffer engine asks of them.
//!
//! ## Overview
//!
//! The limits drive three distinct decisions:
//!
//! - **Admission** (`storable`): is there room in the buffer for any new
//!   write at all? Failing this raises a buffer overflow to the producer.
//! - **Over** (`chunk_size_over`): did the last append push a chunk *past*
//!   its limit? An over chunk must have that append rolled back.
//! - **Full** (`chunk_size_full`): has a chunk reached the configured
//!   fraction of a limit? A full chunk should be enqueued for delivery.
//!
//! The gap between *full* and *over* is what lets the buffer enqueue chunks
//! slightly before they are at capacity instead of bouncing on the limit.
//!
//! ## Limit Constraints
//!
//! ### Chunk limit (default 8 MiB)
//! Upper bound on a single chunk's serialized byte size. Downstream outputs
//! size their requests around this value.
//!
//! ### Total limit (default 512 MiB)
//! Upper bound on staged plus queued bytes. This is the buffer's only flow
//! control: when reached, writes are rejected until a consumer drains.
//!
//! ### Full threshold (default 0.95, valid in (0, 1])
//! Fraction of a limit at which a chunk counts as full.
//!
//! ## Usage Examples
//!
//! ```
//! use staged_buffer_domain::BufferLimits;
//!
//! let limits = BufferLimits::new(100, 200, None, 0.95).unwrap();
//!
//! assert!(limits.storable(90, 100));      // 190 < 200
//! assert!(!limits.storable(100, 100));    // at the limit: reject
//! assert!(limits.chunk_size_full(95, 1)); // 95 >= 100 * 0.95
//! assert!(!limits.chunk_size_over(100, 1));
//! assert!(limits.chunk_size_over(101, 1));
//! ```

use serde::{Deserialize, Serialize};

use crate::BufferError;

/// Validated sizing policy for the buffer.
///
/// Value Object: immutable after construction, compared by value, and
/// self-validating. Invalid combinations (zero limits, thresholds outside
/// `(0, 1]`) are rejected at construction time so the engine never has to
/// re-check them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferLimits {
    chunk_limit_size: u64,
    total_limit_size: u64,
    chunk_records_limit: Option<usize>,
    chunk_full_threshold: f64,
}

impl BufferLimits {
    /// Default maximum serialized byte size of a single chunk (8 MiB)
    pub const DEFAULT_CHUNK_LIMIT_SIZE: u64 = 8 * 1024 * 1024;

    /// Default maximum for staged plus queued bytes (512 MiB)
    pub const DEFAULT_TOTAL_LIMIT_SIZE: u64 = 512 * 1024 * 1024;

    /// Default fraction of a limit at which a chunk counts as full
    pub const DEFAULT_CHUNK_FULL_THRESHOLD: f64 = 0.95;

    /// Creates a validated limits policy.
    ///
    /// # Arguments
    /// * `chunk_limit_size` - Maximum serialized bytes per chunk (must be > 0)
    /// * `total_limit_size` - Maximum staged + queued bytes (must be > 0)
    /// * `chunk_records_limit` - Optional per-chunk record cap (must be > 0 if
    ///   set)
    /// * `chunk_full_threshold` - Full fraction, in `(0, 1]`
    ///
    /// # Errors
    /// Returns `BufferError::InvalidConfiguration` for any out-of-range
    /// value.
    pub fn new(
        chunk_limit_size: u64,
        total_limit_size: u64,
        chunk_records_limit: Option<usize>,
        chunk_full_threshold: f64,
    ) -> Result<Self, BufferError> {
        if chunk_limit_size == 0 {
            return Err(BufferError::invalid_config("chunk_limit_size must be greater than zero"));
        }
        if total_limit_size == 0 {
            return Err(BufferError::invalid_config("total_limit_size must be greater than zero"));
        }
        if let Some(records) = chunk_records_limit {
            if records == 0 {
                return Err(BufferError::invalid_config(
                    "chunk_records_limit must be greater than zero when set",
                ));
            }
        }
        if !(chunk_full_threshold > 0.0 && chunk_full_threshold <= 1.0) {
            return Err(BufferError::invalid_config(format!(
                "chunk_full_threshold must be within (0, 1], got {}",
                chunk_full_threshold
            )));
        }

        Ok(BufferLimits {
            chunk_limit_size,
            total_limit_size,
            chunk_records_limit,
            chunk_full_threshold,
        })
    }

    /// Gets the per-chunk byte limit
    pub fn chunk_limit_size(&self) -> u64 {
        self.chunk_limit_size
    }

    /// Gets the buffer-wide byte limit
    pub fn total_limit_size(&self) -> u64 {
        self.total_limit_size
    }

    /// Gets the optional per-chunk record count limit
    pub fn chunk_records_limit(&self) -> Option<usize> {
        self.chunk_records_limit
    }

    /// Gets the full-threshold fraction
    pub fn chunk_full_threshold(&self) -> f64 {
        self.chunk_full_threshold
    }

    /// Returns true while the buffer can admit more data.
    ///
    /// Admission requires strict headroom: a buffer exactly at its total
    /// limit is not storable.
    pub fn storable(&self, stage_size: u64, queue_size: u64) -> bool {
        self.total_limit_size > stage_size + queue_size
    }

    /// Returns true when a chunk has been pushed *past* a limit and the last
    /// append must be rolled back.
    pub fn chunk_size_over(&self, bytesize: u64, record_count: usize) -> bool {
        if bytesize > self.chunk_limit_size {
            return true;
        }
        match self.chunk_records_limit {
            Some(limit) => record_count > limit,
            None => false,
        }
    }

    /// Returns true when a chunk has reached the configured fraction of a
    /// limit and should be enqueued for delivery.
    pub fn chunk_size_full(&self, bytesize: u64, record_count: usize) -> bool {
        if bytesize as f64 >= self.chunk_limit_size as f64 * self.chunk_full_threshold {
            return true;
        }
        match self.chunk_records_limit {
            Some(limit) => record_count as f64 >= limit as f64 * self.chunk_full_threshold,
            None => false,
        }
    }
}

impl Default for BufferLimits {
    fn default() -> Self {
        BufferLimits {
            chunk_limit_size: Self::DEFAULT_CHUNK_LIMIT_SIZE,
            total_limit_size: Self::DEFAULT_TOTAL_LIMIT_SIZE,
            chunk_records_limit: None,
            chunk_full_threshold: Self::DEFAULT_CHUNK_FULL_THRESHOLD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Tests constructor validation for each field.
    ///
    /// Validates that:
    /// - Zero byte limits are rejected
    /// - A zero record limit is rejected while `None` is accepted
    /// - Thresholds outside (0, 1] are rejected, 1.0 is accepted
    #[test]
    fn test_limits_validation() {
        assert!(BufferLimits::new(0, 100, None, 0.95).is_err());
        assert!(BufferLimits::new(100, 0, None, 0.95).is_err());
        assert!(BufferLimits::new(100, 200, Some(0), 0.95).is_err());
        assert!(BufferLimits::new(100, 200, None, 0.0).is_err());
        assert!(BufferLimits::new(100, 200, None, 1.01).is_err());
        assert!(BufferLimits::new(100, 200, None, 1.0).is_ok());
        assert!(BufferLimits::new(100, 200, Some(5), 0.95).is_ok());
    }

    /// Tests the defaults mirror the documented constants.
    #[test]
    fn test_limits_defaults() {
        let limits = BufferLimits::default();
        assert_eq!(limits.chunk_limit_size(), 8 * 1024 * 1024);
        assert_eq!(limits.total_limit_size(), 512 * 1024 * 1024);
        assert_eq!(limits.chunk_records_limit(), None);
        assert!((limits.chunk_full_threshold() - 0.95).abs() < f64::EPSILON);
    }

    /// Tests admission headroom semantics.
    ///
    /// Validates that:
    /// - Strictly below the total limit is storable
    /// - Exactly at the limit is not (overflow boundary)
    #[test]
    fn test_storable_boundary() {
        let limits = BufferLimits::new(100, 200, None, 0.95).unwrap();
        assert!(limits.storable(99, 100));
        assert!(!limits.storable(100, 100));
        assert!(!limits.storable(150, 100));
    }

    /// Tests the over predicate on both byte and record dimensions.
    #[test]
    fn test_chunk_size_over() {
        let limits = BufferLimits::new(100, 200, Some(10), 0.95).unwrap();
        assert!(!limits.chunk_size_over(100, 1));
        assert!(limits.chunk_size_over(101, 1));
        assert!(!limits.chunk_size_over(10, 10));
        assert!(limits.chunk_size_over(10, 11));
    }

    /// Tests the full predicate at the threshold boundary.
    #[test]
    fn test_chunk_size_full_threshold() {
        let limits = BufferLimits::new(100, 200, Some(10), 0.95).unwrap();
        assert!(!limits.chunk_size_full(94, 1));
        assert!(limits.chunk_size_full(95, 1));
        // record threshold is 9.5, so 10 is the first full count
        assert!(!limits.chunk_size_full(10, 9));
        assert!(limits.chunk_size_full(10, 10));
    }

    proptest! {
        /// An over chunk is always also full: the threshold is at most 1.0,
        /// so exceeding a limit implies reaching its configured fraction.
        #[test]
        fn prop_over_implies_full(
            chunk_limit in 1u64..1_000_000,
            records_limit in proptest::option::of(1usize..100_000),
            threshold in 0.05f64..=1.0,
            bytesize in 0u64..2_000_000,
            record_count in 0usize..200_000,
        ) {
            let limits = BufferLimits::new(chunk_limit, u64::MAX, records_limit, threshold).unwrap();
            if limits.chunk_size_over(bytesize, record_count) {
                prop_assert!(limits.chunk_size_full(bytesize, record_count));
            }
        }
    }
}
