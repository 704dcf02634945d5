// /////////////////////////////////////////////////////////////////////////////
// Staged Event Buffer
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Repository Ports
//!
//! Abstractions the buffer engine needs from a chunk storage backend. The
//! domain defines the contract; infrastructure adapters (in-memory,
//! file-backed, ...) provide the implementations.

pub mod chunk_store;

pub use chunk_store::ChunkStore;
