// /////////////////////////////////////////////////////////////////////////////
// Staged Event Buffer
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Infrastructure Adapters
//!
//! Concrete [`ChunkStore`](staged_buffer_domain::ChunkStore) backends.

pub mod memory_store;

pub use memory_store::{MemoryChunk, MemoryChunkStore};
