// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # pinoo-observability
//!
//! Consistent logging setup across the pinoo crates with per-crate debug
//! flag support (`--debug-pinoo-peripheral`, `PINOO_DEBUG=all`, ...).

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod init;

pub use cli::*;
pub use init::*;

/// Known pinoo crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "pinoo",
    "pinoo-config",
    "pinoo-link",
    "pinoo-peripheral",
];
