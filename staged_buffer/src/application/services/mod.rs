// /////////////////////////////////////////////////////////////////////////////
// Staged Event Buffer
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Application Services
//!
//! - [`buffer_service`]: the [`StagedBuffer`] engine — metadata registry,
//!   stage/queue/dequeued bookkeeping, lifecycle, and the public façade
//! - [`write_coordinator`]: the transactional write path (`write`,
//!   `write_once`, `write_step_by_step`)
//! - [`chunk_handle`]: the shared, reentrantly lockable wrapper around a
//!   backend chunk

pub mod buffer_service;
pub mod chunk_handle;
pub mod write_coordinator;

pub use buffer_service::StagedBuffer;
pub use chunk_handle::ChunkHandle;
pub use write_coordinator::WriteOptions;
