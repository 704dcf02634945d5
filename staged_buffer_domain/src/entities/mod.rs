// /////////////////////////////////////////////////////////////////////////////
// Staged Event Buffer
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Entities
//!
//! Objects with identity whose state changes over time. The buffer domain has
//! a single entity: the [`Chunk`], an append-only record container that moves
//! through a small lifecycle state machine while keeping its [`ChunkId`]
//! stable.
//!
//! [`ChunkId`]: crate::ChunkId

pub mod chunk;

pub use chunk::{Chunk, ChunkState};
