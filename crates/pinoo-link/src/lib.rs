// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # pinoo-link
//!
//! The wireless transport capability a pinoo session is built on.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Peripheral session (pinoo-peripheral)        │
//! └─────────────────┬────────────────────────────┘
//!                   │ uses
//! ┌─────────────────▼────────────────────────────┐
//! │ LinkConnector / PeripheralLink (THIS CRATE)  │
//! │ - open() -> discovery + LinkEvent stream     │
//! │ - connect() / disconnect() / is_connected()  │
//! │ - write(service, characteristic, payload)    │
//! └─────────────────┬────────────────────────────┘
//!                   │ implements
//! ┌─────────────────▼────────────────────────────┐
//! │ Link implementation                          │
//! │ - SimulatorConnector (in-process board)      │
//! │ - host BLE bridge (supplied by the embedder) │
//! └──────────────────────────────────────────────┘
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod error;
pub mod gatt;
pub mod link;
#[cfg(feature = "simulator")]
pub mod simulator;

pub use error::{LinkError, LinkResult};
pub use gatt::{Encoding, GattProfile, NOTIFY_CHARACTERISTIC, SERVICE_ID, WRITE_CHARACTERISTIC};
pub use link::{
    link_event_channel, DiscoveryFilter, LinkConnector, LinkEvent, LinkEventReceiver,
    LinkEventSender, LinkStatus, PeripheralId, PeripheralInfo, PeripheralLink,
};

#[cfg(feature = "simulator")]
pub use simulator::{SimulatedBoard, SimulatedLink, SimulatorConnector, SimulatorSettings};

/// Re-export so implementors can use the same attribute macro version
pub use async_trait::async_trait;
