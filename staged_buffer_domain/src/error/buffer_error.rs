// /////////////////////////////////////////////////////////////////////////////
// Staged Event Buffer
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! This module provides the hierarchical error system for the staged event
//! buffer. It categorizes failures, provides actionable error messages, and
//! supports both automated error recovery and human-readable diagnostics.
//!
//! ## Error Architecture
//!
//! ### Error Categories
//!
//! #### Admission Errors
//! - **Overflow**: the buffer's total size limit is reached; the write is
//!   rejected until a consumer drains the queue
//! - **ChunkOverflow**: a single record is larger than the chunk size limit
//!   and can never be buffered; the caller typically drops it
//!
//! #### Configuration Errors
//! - **InvalidConfiguration**: malformed or out-of-range buffer settings
//!
//! #### Backend Errors
//! - **InvalidChunkState**: an operation was attempted on a chunk whose
//!   lifecycle state forbids it (e.g. appending to a closed chunk)
//! - **IoError**: storage backend I/O failures
//! - **SerializationError**: record formatting/serialization failures
//!
//! #### System Errors
//! - **InternalError**: unexpected failures that indicate a bug
//!
//! ## Error Recovery Strategies
//!
//! **Overflow** is recoverable from the producer's point of view: retrying
//! after the consumer drains the queue will eventually succeed.
//! **ChunkOverflow** is permanent for the offending record.
//! **InvalidConfiguration** requires operator intervention.

use thiserror::Error;

/// Domain-specific errors for the staged event buffer.
///
/// Each variant carries a descriptive message and is designed to tell the
/// caller what went wrong and whether retrying can help.
///
/// ## Design Principles
///
/// - **Specific**: each error type represents a specific failure mode
/// - **Actionable**: error messages provide enough context for debugging
/// - **Categorized**: errors are grouped by type for systematic handling
/// - **Recoverable**: some errors indicate retry-able conditions
#[derive(Error, Debug, Clone)]
pub enum BufferError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Buffer overflow: {0}")]
    Overflow(String),

    #[error("Buffer chunk overflow: {0}")]
    ChunkOverflow(String),

    #[error("Invalid chunk state: {0}")]
    InvalidChunkState(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl BufferError {
    /// Creates a new configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Creates a new total-limit overflow error
    pub fn overflow(msg: impl Into<String>) -> Self {
        Self::Overflow(msg.into())
    }

    /// Creates a new single-record chunk overflow error
    pub fn chunk_overflow(msg: impl Into<String>) -> Self {
        Self::ChunkOverflow(msg.into())
    }

    /// Creates a new invalid chunk state error
    pub fn invalid_chunk_state(msg: impl Into<String>) -> Self {
        Self::InvalidChunkState(msg.into())
    }

    /// Creates a new IO error
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::IoError(msg.into())
    }

    /// Creates a new internal error
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Checks if the error is recoverable by retrying later
    ///
    /// `Overflow` clears once a consumer drains the queue, and backend IO
    /// failures are often transient. The other variants are permanent for
    /// the data that triggered them.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BufferError::Overflow(_) | BufferError::IoError(_))
    }

    /// Gets the error category
    pub fn category(&self) -> &'static str {
        match self {
            BufferError::InvalidConfiguration(_) => "configuration",
            BufferError::Overflow(_) => "overflow",
            BufferError::ChunkOverflow(_) => "overflow",
            BufferError::InvalidChunkState(_) => "chunk",
            BufferError::IoError(_) => "io",
            BufferError::SerializationError(_) => "serialization",
            BufferError::InternalError(_) => "internal",
        }
    }
}

// Implement conversion from standard library errors
impl From<std::io::Error> for BufferError {
    fn from(err: std::io::Error) -> Self {
        BufferError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for BufferError {
    fn from(err: serde_json::Error) -> Self {
        BufferError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests error categorization for every variant.
    ///
    /// Validates that:
    /// - Both overflow variants report the "overflow" category
    /// - Categories are stable strings usable as metric labels
    #[test]
    fn test_error_categories() {
        assert_eq!(BufferError::overflow("full").category(), "overflow");
        assert_eq!(BufferError::chunk_overflow("big").category(), "overflow");
        assert_eq!(BufferError::invalid_config("bad").category(), "configuration");
        assert_eq!(BufferError::invalid_chunk_state("closed").category(), "chunk");
        assert_eq!(BufferError::io_error("disk").category(), "io");
        assert_eq!(BufferError::internal_error("bug").category(), "internal");
    }

    /// Tests the recoverability classification.
    ///
    /// Validates that:
    /// - Total-limit overflow is recoverable (consumer drains the queue)
    /// - Single-record chunk overflow is permanent
    /// - Configuration errors are permanent
    #[test]
    fn test_error_recoverability() {
        assert!(BufferError::overflow("full").is_recoverable());
        assert!(BufferError::io_error("transient").is_recoverable());
        assert!(!BufferError::chunk_overflow("big").is_recoverable());
        assert!(!BufferError::invalid_config("bad").is_recoverable());
    }

    /// Tests Display formatting carries the variant prefix and message.
    #[test]
    fn test_error_display() {
        let err = BufferError::chunk_overflow("a 150 bytes record is larger than chunk limit size (100)");
        assert_eq!(
            err.to_string(),
            "Buffer chunk overflow: a 150 bytes record is larger than chunk limit size (100)"
        );
    }

    /// Tests conversion from std::io::Error.
    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: BufferError = io_err.into();
        assert_eq!(err.category(), "io");
    }
}
