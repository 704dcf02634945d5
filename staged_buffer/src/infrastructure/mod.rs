// /////////////////////////////////////////////////////////////////////////////
// Staged Event Buffer
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Infrastructure Layer
//!
//! Concrete implementations of the domain ports plus configuration loading:
//!
//! - [`adapters`]: chunk storage backends (in-memory)
//! - [`config`]: `[buffer]` TOML configuration parsing and validation

pub mod adapters;
pub mod config;
