// /////////////////////////////////////////////////////////////////////////////
// Staged Event Buffer
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error Module
//!
//! Error types for the buffer domain. See [`BufferError`] for the taxonomy
//! and the propagation policy each variant participates in.

pub mod buffer_error;

pub use buffer_error::BufferError;
