// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # pinoo
//!
//! Driver layer for pinoo microcontroller boards reached over a wireless
//! link: one logical session per board, typed commands out, decoded
//! telemetry in.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! pinoo = "0.1"  # Default: simulator + observability
//! ```
//!
//! ```rust,no_run
//! use pinoo::prelude::*;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let mut config = load_config_or_default(None, None)?;
//! config.peripheral.kind = PeripheralKind::Simulator;
//!
//! let board = Board::from_config(&config, None)?;
//! board.connect_first().await?;
//! board.display_text("HI").await?;
//!
//! if board.digital_read(7, PinLevel::High).await? {
//!     println!("pin 7 is high");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - **`simulator`** (default): in-process simulated board
//! - **`observability`** (default): console logging setup
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Board API: pinoo-peripheral::board                     │
//! │  (typed commands, sensor accessors)                     │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Session: pinoo-peripheral::session                     │
//! │  (busy discipline, watchdog, telemetry decoding)        │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Transport: pinoo-link                                  │
//! │  (LinkConnector / PeripheralLink, simulated board)      │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## License
//!
//! Apache-2.0

// Re-export foundation
pub use pinoo_config as config;

#[cfg(feature = "observability")]
pub use pinoo_observability as observability;

// Re-export transport and session layers
pub use pinoo_link as link;
pub use pinoo_peripheral as peripheral;

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use crate::config::{load_config_or_default, PeripheralKind, PinooConfig};

    pub use crate::link::{
        DiscoveryFilter, Encoding, GattProfile, LinkConnector, LinkEvent, PeripheralId,
        PeripheralInfo, PeripheralLink,
    };

    #[cfg(feature = "simulator")]
    pub use crate::link::{SimulatedBoard, SimulatorSettings};

    pub use crate::peripheral::{
        Board, Button, Command, Gesture, LinkLossReason, PeripheralSession, PinLevel, PinMode,
        ProgramBlock, ProgramGraph, SensorSnapshot, SessionError, SessionEvent, SessionSettings,
        TiltDirection, UploadMode,
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_facade_imports() {
        use crate::prelude::*;
        let settings = SessionSettings::default();
        assert_eq!(settings.profile, GattProfile::default());
        assert_eq!(PeripheralKind::Simulator.extension_id(), "pinoosimulator");
    }
}
