// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Outbound command encoding
//!
//! Two command families share the write characteristic:
//! - legacy binary commands, identified by a one-byte opcode
//!   (`0x80` pin config, `0x81` display text, `0x82` display LED)
//! - structured commands, JSON objects tagged by a `"command"` string
//!
//! Builders validate their arguments; [`Command::to_frame`] produces the
//! bytes handed to the link.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, SessionError};
use crate::program::{ProgramGraph, UploadMode};

/// Number of digital pins on the board
pub const PIN_COUNT: u8 = 20;

/// Opcodes of every command the board understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    PinConfig,
    DisplayText,
    DisplayLed,
    DigitalWrite,
    SetPinMode,
    DigitalRead,
    UploadDevMode,
    UploadRunMode,
}

impl Opcode {
    /// Binary opcode for legacy commands, `None` for structured ones
    pub fn legacy_code(&self) -> Option<u8> {
        match self {
            Opcode::PinConfig => Some(0x80),
            Opcode::DisplayText => Some(0x81),
            Opcode::DisplayLed => Some(0x82),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Opcode::PinConfig => "pin_config",
            Opcode::DisplayText => "display_text",
            Opcode::DisplayLed => "display_led",
            Opcode::DigitalWrite => "digital_write",
            Opcode::SetPinMode => "set_pin_mode",
            Opcode::DigitalRead => "digital_read",
            Opcode::UploadDevMode => "upload_dev_mode",
            Opcode::UploadRunMode => "upload_run_mode",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Digital pin level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinLevel {
    Low,
    High,
}

impl PinLevel {
    pub fn as_u8(&self) -> u8 {
        match self {
            PinLevel::Low => 0,
            PinLevel::High => 1,
        }
    }

    /// Does an acknowledgment payload report this level?
    ///
    /// The board answers reads with the level as a decimal string; the
    /// comparison is exact (`"1"` only, not `"01"` or `"1\n"`).
    pub fn matches_ack(&self, ack: &[u8]) -> bool {
        match self {
            PinLevel::Low => ack == b"0",
            PinLevel::High => ack == b"1",
        }
    }
}

impl FromStr for PinLevel {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "LOW" | "0" | "FALSE" => Ok(PinLevel::Low),
            "HIGH" | "1" | "TRUE" => Ok(PinLevel::High),
            other => Err(SessionError::InvalidArgument(format!(
                "pin level must be LOW/HIGH or 0/1, got '{}'",
                other
            ))),
        }
    }
}

impl From<bool> for PinLevel {
    fn from(high: bool) -> Self {
        if high {
            PinLevel::High
        } else {
            PinLevel::Low
        }
    }
}

impl TryFrom<i64> for PinLevel {
    type Error = SessionError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(PinLevel::Low),
            1 => Ok(PinLevel::High),
            other => Err(SessionError::InvalidArgument(format!(
                "pin level must be 0 or 1, got {}",
                other
            ))),
        }
    }
}

/// Digital pin mode, transmitted numerically
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinMode {
    Input,
    Output,
    InputPullup,
}

impl PinMode {
    pub fn as_u8(&self) -> u8 {
        match self {
            PinMode::Input => 0,
            PinMode::Output => 1,
            PinMode::InputPullup => 2,
        }
    }
}

impl FromStr for PinMode {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "INPUT" | "0" => Ok(PinMode::Input),
            "OUTPUT" | "1" => Ok(PinMode::Output),
            "INPUT_PULLUP" | "2" => Ok(PinMode::InputPullup),
            other => Err(SessionError::InvalidArgument(format!(
                "unknown pin mode '{}'",
                other
            ))),
        }
    }
}

impl TryFrom<i64> for PinMode {
    type Error = SessionError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(PinMode::Input),
            1 => Ok(PinMode::Output),
            2 => Ok(PinMode::InputPullup),
            other => Err(SessionError::InvalidArgument(format!(
                "unknown pin mode {}",
                other
            ))),
        }
    }
}

/// Structured commands as they go on the wire
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum StructuredCommand {
    DigitalWrite { pin: u8, value: u8 },
    SetPinMode { pin: u8, value: u8 },
    DigitalRead { pin: u8 },
    UploadDevMode { data: Value },
    UploadRunMode { data: Value },
}

/// Command body
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Bytes(Vec<u8>),
    Structured(StructuredCommand),
}

/// An outbound request
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub opcode: Opcode,
    pub payload: Payload,
}

fn check_pin(pin: u8) -> Result<u8> {
    if pin < PIN_COUNT {
        Ok(pin)
    } else {
        Err(SessionError::InvalidArgument(format!(
            "pin {} out of range 0..={}",
            pin,
            PIN_COUNT - 1
        )))
    }
}

impl Command {
    pub fn digital_write(pin: u8, level: PinLevel) -> Result<Self> {
        Ok(Self {
            opcode: Opcode::DigitalWrite,
            payload: Payload::Structured(StructuredCommand::DigitalWrite {
                pin: check_pin(pin)?,
                value: level.as_u8(),
            }),
        })
    }

    pub fn set_pin_mode(pin: u8, mode: PinMode) -> Result<Self> {
        Ok(Self {
            opcode: Opcode::SetPinMode,
            payload: Payload::Structured(StructuredCommand::SetPinMode {
                pin: check_pin(pin)?,
                value: mode.as_u8(),
            }),
        })
    }

    pub fn digital_read(pin: u8) -> Result<Self> {
        Ok(Self {
            opcode: Opcode::DigitalRead,
            payload: Payload::Structured(StructuredCommand::DigitalRead {
                pin: check_pin(pin)?,
            }),
        })
    }

    /// One byte per character (its ordinal)
    ///
    /// Characters above U+00FF do not fit a byte and are rejected.
    pub fn display_text(text: &str) -> Result<Self> {
        let bytes = text
            .chars()
            .map(|c| {
                u8::try_from(u32::from(c)).map_err(|_| {
                    SessionError::InvalidArgument(format!(
                        "character '{}' cannot be shown on the display",
                        c
                    ))
                })
            })
            .collect::<Result<Vec<u8>>>()?;
        Ok(Self {
            opcode: Opcode::DisplayText,
            payload: Payload::Bytes(bytes),
        })
    }

    /// The 5-byte LED bitmap, passed through unmodified
    pub fn display_matrix(bitmap: [u8; 5]) -> Self {
        Self {
            opcode: Opcode::DisplayLed,
            payload: Payload::Bytes(bitmap.to_vec()),
        }
    }

    pub fn pin_config(config: Vec<u8>) -> Self {
        Self {
            opcode: Opcode::PinConfig,
            payload: Payload::Bytes(config),
        }
    }

    /// Validates the graph against `entry` before serializing it
    pub fn upload_program(mode: UploadMode, graph: &ProgramGraph, entry: &str) -> Result<Self> {
        let data = graph.upload_data(entry)?;
        let (opcode, command) = match mode {
            UploadMode::Dev => (Opcode::UploadDevMode, StructuredCommand::UploadDevMode { data }),
            UploadMode::Run => (Opcode::UploadRunMode, StructuredCommand::UploadRunMode { data }),
        };
        Ok(Self {
            opcode,
            payload: Payload::Structured(command),
        })
    }

    /// Payload bytes without any opcode prefix
    pub fn payload_bytes(&self) -> Result<Vec<u8>> {
        match &self.payload {
            Payload::Bytes(bytes) => Ok(bytes.clone()),
            Payload::Structured(command) => Ok(serde_json::to_vec(command)?),
        }
    }

    /// Bytes handed to the link
    ///
    /// With `prefix_legacy_opcode`, legacy commands go out as
    /// `[opcode, payload...]`; structured commands are always bare JSON.
    pub fn to_frame(&self, prefix_legacy_opcode: bool) -> Result<Vec<u8>> {
        let payload = self.payload_bytes()?;
        match self.opcode.legacy_code() {
            Some(code) if prefix_legacy_opcode => {
                let mut frame = Vec::with_capacity(payload.len() + 1);
                frame.push(code);
                frame.extend_from_slice(&payload);
                Ok(frame)
            }
            _ => Ok(payload),
        }
    }
}
