// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! GATT identifiers and payload framing for the pinoo board service

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LinkResult;

/// Board service identifier
pub const SERVICE_ID: u16 = 0xf005;

/// Characteristic the host writes commands to
pub const WRITE_CHARACTERISTIC: Uuid = Uuid::from_u128(0x5261da02_fa7e_42ab_850b_7c80220097cc);

/// Characteristic the board notifies telemetry on
pub const NOTIFY_CHARACTERISTIC: Uuid = Uuid::from_u128(0x5261da01_fa7e_42ab_850b_7c80220097cc);

/// Service and characteristics a session talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattProfile {
    pub service_id: u16,
    pub write_characteristic: Uuid,
    pub notify_characteristic: Uuid,
}

impl Default for GattProfile {
    fn default() -> Self {
        Self {
            service_id: SERVICE_ID,
            write_characteristic: WRITE_CHARACTERISTIC,
            notify_characteristic: NOTIFY_CHARACTERISTIC,
        }
    }
}

/// How payload bytes travel over the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Raw,
    #[default]
    Base64,
}

impl Encoding {
    /// Encode payload bytes for the wire
    pub fn frame(&self, payload: &[u8]) -> Vec<u8> {
        match self {
            Encoding::Raw => payload.to_vec(),
            Encoding::Base64 => STANDARD.encode(payload).into_bytes(),
        }
    }

    /// Recover payload bytes from the wire
    pub fn unframe(&self, wire: &[u8]) -> LinkResult<Vec<u8>> {
        match self {
            Encoding::Raw => Ok(wire.to_vec()),
            Encoding::Base64 => Ok(STANDARD.decode(wire)?),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Raw => "raw",
            Encoding::Base64 => "base64",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers_match_board_firmware() {
        assert_eq!(SERVICE_ID, 0xf005);
        assert_eq!(
            WRITE_CHARACTERISTIC.to_string(),
            "5261da02-fa7e-42ab-850b-7c80220097cc"
        );
        assert_eq!(
            NOTIFY_CHARACTERISTIC.to_string(),
            "5261da01-fa7e-42ab-850b-7c80220097cc"
        );
    }

    #[test]
    fn test_base64_framing() {
        let wire = Encoding::Base64.frame(&[0x48, 0x49]);
        assert_eq!(wire, b"SEk=");
        assert_eq!(Encoding::Base64.unframe(&wire).unwrap(), vec![0x48, 0x49]);
    }

    #[test]
    fn test_raw_framing_is_identity() {
        assert_eq!(Encoding::Raw.frame(b"abc"), b"abc");
        assert_eq!(Encoding::Raw.unframe(b"abc").unwrap(), b"abc");
    }

    #[test]
    fn test_base64_unframe_rejects_garbage() {
        assert!(Encoding::Base64.unframe(b"***").is_err());
    }
}
