// /////////////////////////////////////////////////////////////////////////////
// Staged Event Buffer
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Buffer Configuration
//!
//! Reads the `[buffer]` table of the agent's TOML configuration and turns it
//! into the validated [`BufferLimits`] sizing policy.
//!
//! ## Configuration Structure
//!
//! ```toml
//! [buffer]
//! chunk_limit_size = 8388608       # bytes per chunk (default 8 MiB)
//! total_limit_size = 536870912     # staged + queued bytes (default 512 MiB)
//! queue_length_limit = 256         # optional; overrides total_limit_size
//! chunk_records_limit = 5000       # optional records-per-chunk cap
//! chunk_full_threshold = 0.95      # full fraction, in (0, 1]
//! ```
//!
//! Every key is optional; omitted keys take the documented defaults. When
//! `queue_length_limit` is set, the total limit derives from it:
//! `total_limit_size = chunk_limit_size * queue_length_limit`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use staged_buffer_domain::{BufferError, BufferLimits};

fn default_chunk_limit_size() -> u64 {
    BufferLimits::DEFAULT_CHUNK_LIMIT_SIZE
}

fn default_total_limit_size() -> u64 {
    BufferLimits::DEFAULT_TOTAL_LIMIT_SIZE
}

fn default_chunk_full_threshold() -> f64 {
    BufferLimits::DEFAULT_CHUNK_FULL_THRESHOLD
}

/// The `[buffer]` configuration table.
///
/// Raw, not yet validated: call
/// [`into_limits`](BufferConfig::into_limits) to obtain the checked
/// [`BufferLimits`] value object the engine accepts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BufferConfig {
    /// Maximum serialized bytes per chunk
    #[serde(default = "default_chunk_limit_size")]
    pub chunk_limit_size: u64,

    /// Maximum staged + queued bytes
    #[serde(default = "default_total_limit_size")]
    pub total_limit_size: u64,

    /// Optional queue length cap; when set, the total limit becomes
    /// `chunk_limit_size * queue_length_limit`
    #[serde(default)]
    pub queue_length_limit: Option<usize>,

    /// Optional records-per-chunk cap
    #[serde(default)]
    pub chunk_records_limit: Option<usize>,

    /// Fraction of a limit at which a chunk counts as full
    #[serde(default = "default_chunk_full_threshold")]
    pub chunk_full_threshold: f64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        BufferConfig {
            chunk_limit_size: default_chunk_limit_size(),
            total_limit_size: default_total_limit_size(),
            queue_length_limit: None,
            chunk_records_limit: None,
            chunk_full_threshold: default_chunk_full_threshold(),
        }
    }
}

/// Top-level configuration document; only the `[buffer]` table is read here.
#[derive(Debug, Default, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    buffer: Option<BufferConfig>,
}

impl BufferConfig {
    /// Parses the `[buffer]` table from a TOML document.
    ///
    /// A document without a `[buffer]` table yields the defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, BufferError> {
        let document: ConfigDocument = toml::from_str(content)
            .map_err(|e| BufferError::invalid_config(format!("Failed to parse buffer configuration: {}", e)))?;
        Ok(document.buffer.unwrap_or_default())
    }

    /// Loads the `[buffer]` table from a TOML file.
    pub fn load_from_path(path: &Path) -> Result<Self, BufferError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BufferError::io_error(format!("Failed to read buffer configuration {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), "loaded buffer configuration");
        Ok(config)
    }

    /// Validates the configuration into the engine's sizing policy.
    ///
    /// Applies the `queue_length_limit` derivation and warns when the
    /// resulting total limit cannot hold even one full chunk.
    pub fn into_limits(self) -> Result<BufferLimits, BufferError> {
        let total_limit_size = match self.queue_length_limit {
            Some(queue_length) => self.chunk_limit_size.saturating_mul(queue_length as u64),
            None => self.total_limit_size,
        };
        if total_limit_size < self.chunk_limit_size {
            warn!(
                chunk_limit_size = self.chunk_limit_size,
                total_limit_size, "total_limit_size is smaller than a single chunk"
            );
        }
        BufferLimits::new(
            self.chunk_limit_size,
            total_limit_size,
            self.chunk_records_limit,
            self.chunk_full_threshold,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests that an empty document and a missing table both yield defaults.
    #[test]
    fn test_defaults_without_buffer_table() {
        let config = BufferConfig::from_toml_str("").unwrap();
        assert_eq!(config, BufferConfig::default());
        assert_eq!(config.chunk_limit_size, 8 * 1024 * 1024);
        assert_eq!(config.total_limit_size, 512 * 1024 * 1024);
    }

    /// Tests parsing a fully specified [buffer] table.
    #[test]
    fn test_parse_full_table() {
        let config = BufferConfig::from_toml_str(
            r#"
            [buffer]
            chunk_limit_size = 100
            total_limit_size = 200
            chunk_records_limit = 10
            chunk_full_threshold = 0.9
            "#,
        )
        .unwrap();
        assert_eq!(config.chunk_limit_size, 100);
        assert_eq!(config.total_limit_size, 200);
        assert_eq!(config.chunk_records_limit, Some(10));
        assert!((config.chunk_full_threshold - 0.9).abs() < f64::EPSILON);

        let limits = config.into_limits().unwrap();
        assert_eq!(limits.chunk_limit_size(), 100);
        assert_eq!(limits.total_limit_size(), 200);
    }

    /// Tests the queue_length_limit derivation of the total limit.
    #[test]
    fn test_queue_length_limit_overrides_total() {
        let config = BufferConfig::from_toml_str(
            r#"
            [buffer]
            chunk_limit_size = 1024
            total_limit_size = 999999
            queue_length_limit = 8
            "#,
        )
        .unwrap();
        let limits = config.into_limits().unwrap();
        assert_eq!(limits.total_limit_size(), 8 * 1024);
    }

    /// Tests that invalid settings are rejected during validation, not at
    /// parse time.
    #[test]
    fn test_invalid_threshold_rejected() {
        let config = BufferConfig::from_toml_str(
            r#"
            [buffer]
            chunk_full_threshold = 1.5
            "#,
        )
        .unwrap();
        let err = config.into_limits().unwrap_err();
        assert_eq!(err.category(), "configuration");
    }

    /// Tests loading from a file on disk.
    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(&path, "[buffer]\nchunk_limit_size = 4096\n").unwrap();

        let config = BufferConfig::load_from_path(&path).unwrap();
        assert_eq!(config.chunk_limit_size, 4096);

        let missing = BufferConfig::load_from_path(&dir.path().join("nope.toml"));
        assert!(matches!(missing.unwrap_err(), BufferError::IoError(_)));
    }
}
