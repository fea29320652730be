// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections in
//! `pinoo_configuration.toml`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PinooConfig {
    pub peripheral: PeripheralConfig,
    pub link: LinkConfig,
    pub timing: TimingConfig,
    pub simulator: SimulatorConfig,
    pub logging: LoggingConfig,
}

/// Which transport wiring backs the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeripheralKind {
    /// Real board reached through a caller-supplied link connector
    #[default]
    Board,
    /// In-process simulated board
    Simulator,
}

impl PeripheralKind {
    /// Identifier the peripheral extension registers under
    pub fn extension_id(&self) -> &'static str {
        match self {
            PeripheralKind::Board => "pinoo",
            PeripheralKind::Simulator => "pinoosimulator",
        }
    }
}

impl FromStr for PeripheralKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "board" | "hardware" | "pinoo" => Ok(PeripheralKind::Board),
            "simulator" | "sim" | "pinoosimulator" => Ok(PeripheralKind::Simulator),
            other => Err(format!("unknown peripheral kind '{}'", other)),
        }
    }
}

impl fmt::Display for PeripheralKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeripheralKind::Board => write!(f, "board"),
            PeripheralKind::Simulator => write!(f, "simulator"),
        }
    }
}

/// Peripheral selection and discovery
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PeripheralConfig {
    pub kind: PeripheralKind,
    /// Advertised-name prefix used as the discovery filter
    pub name_prefix: String,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            kind: PeripheralKind::Board,
            name_prefix: "w".to_string(),
        }
    }
}

/// Payload framing requested from the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WireEncoding {
    Raw,
    #[default]
    Base64,
}

impl FromStr for WireEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "raw" => Ok(WireEncoding::Raw),
            "base64" => Ok(WireEncoding::Base64),
            other => Err(format!("unknown wire encoding '{}'", other)),
        }
    }
}

/// GATT identifiers and framing
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LinkConfig {
    pub service_id: u16,
    pub write_characteristic: String,
    pub notify_characteristic: String,
    pub encoding: WireEncoding,
    /// Prepend the legacy opcode byte to binary command frames.
    /// Off by default: the firmware takes the bare payload.
    pub prefix_legacy_opcode: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            service_id: 0xf005,
            write_characteristic: "5261da02-fa7e-42ab-850b-7c80220097cc".to_string(),
            notify_characteristic: "5261da01-fa7e-42ab-850b-7c80220097cc".to_string(),
            encoding: WireEncoding::Base64,
            prefix_legacy_opcode: false,
        }
    }
}

/// Session timing policy (all values in milliseconds)
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Silence after the last telemetry frame before the link is declared stale
    pub watchdog_interval_ms: u64,
    /// How long a command may stay unacknowledged before `busy` is released
    pub busy_grace_period_ms: u64,
    /// Advisory pacing between repeated commands (not enforced by the session)
    pub send_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            watchdog_interval_ms: 4500,
            busy_grace_period_ms: 5000,
            send_interval_ms: 100,
        }
    }
}

impl TimingConfig {
    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }

    pub fn busy_grace_period(&self) -> Duration {
        Duration::from_millis(self.busy_grace_period_ms)
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }
}

/// Simulated board behavior
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub peripheral_name: String,
    pub telemetry_interval_ms: u64,
    pub ack_latency_ms: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            peripheral_name: "wPinoo-sim".to_string(),
            telemetry_interval_ms: 100,
            ack_latency_ms: 10,
        }
    }
}

impl SimulatorConfig {
    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry_interval_ms)
    }

    pub fn ack_latency(&self) -> Duration {
        Duration::from_millis(self.ack_latency_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (trace, debug, info, warn, error)
    pub level: String,
    /// Output format: "text" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}
