// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # pinoo-peripheral
//!
//! Session driver for a pinoo board on a wireless link.
//!
//! ## Components
//!
//! - [`session`]: connection lifecycle, single-flight busy discipline,
//!   link watchdog
//! - [`telemetry`]: 10-byte telemetry frame decoding and sensor snapshot
//! - [`command`]: legacy binary and structured command encoding
//! - [`program`]: program graphs for upload
//! - [`board`]: typed consumer API
//!
//! ## Example
//!
//! ```rust,no_run
//! use pinoo_config::PinooConfig;
//! use pinoo_peripheral::{Board, PinLevel, SessionSettings};
//! use pinoo_link::SimulatorSettings;
//!
//! # async fn demo() -> pinoo_peripheral::Result<()> {
//! let settings = SessionSettings::from_config(&PinooConfig::default())?;
//! let board = Board::simulated(settings, SimulatorSettings::default());
//! board.connect_first().await?;
//!
//! board.digital_write(13, PinLevel::High).await?;
//! board.display_text("HI").await?;
//! println!("tilt x = {}", board.tilt_x());
//! # Ok(())
//! # }
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod board;
pub mod command;
pub mod error;
pub mod program;
pub mod session;
pub mod telemetry;
mod watchdog;

pub use board::Board;
pub use command::{Command, Opcode, Payload, PinLevel, PinMode, StructuredCommand, PIN_COUNT};
pub use error::{Result, SessionError};
pub use program::{ProgramBlock, ProgramGraph, UploadMode};
pub use session::{LinkLossReason, PeripheralSession, SessionEvent, SessionSettings};
pub use telemetry::{
    Button, DecodeError, Gesture, SensorSnapshot, TelemetryFrame, TiltDirection,
    TELEMETRY_FRAME_LEN, TILT_THRESHOLD,
};
