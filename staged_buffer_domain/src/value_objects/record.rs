// /////////////////////////////////////////////////////////////////////////////
// Staged Event Buffer
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Record Value Object
//!
//! The unit of data the buffer accumulates: a timestamped, opaque payload.
//!
//! The buffer never inspects payload bytes. Producers serialize their events
//! before handing them over (or supply a batch formatter at write time), and
//! consumers read chunk content back as raw bytes for transmission. The only
//! thing the buffer cares about is the payload's byte length, which drives
//! all size accounting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable, timestamped event payload.
///
/// Value Object: records are compared by content, never mutated, and carry no
/// identity. The timestamp is the event time assigned by the producer, not
/// the time the record entered the buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    timestamp: DateTime<Utc>,
    payload: Vec<u8>,
}

impl Record {
    /// Creates a record stamped with the current time
    pub fn new(payload: Vec<u8>) -> Self {
        Record {
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Creates a record with an explicit event time
    pub fn with_timestamp(timestamp: DateTime<Utc>, payload: Vec<u8>) -> Self {
        Record { timestamp, payload }
    }

    /// Gets the event time
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Gets the serialized payload
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Gets the payload's byte length, the record's contribution to chunk
    /// size accounting
    pub fn bytesize(&self) -> u64 {
        self.payload.len() as u64
    }
}
