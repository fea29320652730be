// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Telemetry frame decoding
//!
//! The board notifies a fixed 10-byte frame:
//!
//! | Offset | Field          | Encoding                   |
//! |--------|----------------|----------------------------|
//! | 0..2   | tilt X         | big-endian i16             |
//! | 2..4   | tilt Y         | big-endian i16             |
//! | 4      | button A       | u8                         |
//! | 5      | button B       | u8                         |
//! | 6..9   | touch pins 0-2 | u8 each                    |
//! | 9      | gesture state  | bit field (see [`Gesture`])|
//!
//! Longer frames are accepted and the trailing bytes ignored.

use serde::{Deserialize, Serialize};

/// Number of bytes in a telemetry frame
pub const TELEMETRY_FRAME_LEN: usize = 10;

/// Tilt magnitude (in degrees) from which a direction counts as tilted
pub const TILT_THRESHOLD: i16 = 15;

/// Telemetry decode failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Telemetry frame too short: expected {expected} bytes, got {actual}")]
    FrameTooShort { expected: usize, actual: usize },
}

/// One decoded telemetry frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TelemetryFrame {
    pub tilt_x: i16,
    pub tilt_y: i16,
    pub button_a: u8,
    pub button_b: u8,
    pub touch_pins: [u8; 3],
    pub gesture_state: u8,
}

impl TelemetryFrame {
    /// Decode a frame. Fails only when fewer than 10 bytes arrive.
    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        if frame.len() < TELEMETRY_FRAME_LEN {
            return Err(DecodeError::FrameTooShort {
                expected: TELEMETRY_FRAME_LEN,
                actual: frame.len(),
            });
        }
        Ok(Self {
            tilt_x: i16::from_be_bytes([frame[0], frame[1]]),
            tilt_y: i16::from_be_bytes([frame[2], frame[3]]),
            button_a: frame[4],
            button_b: frame[5],
            touch_pins: [frame[6], frame[7], frame[8]],
            gesture_state: frame[9],
        })
    }

    /// Inverse of [`TelemetryFrame::decode`]
    pub fn encode(&self) -> [u8; TELEMETRY_FRAME_LEN] {
        let x = self.tilt_x.to_be_bytes();
        let y = self.tilt_y.to_be_bytes();
        [
            x[0],
            x[1],
            y[0],
            y[1],
            self.button_a,
            self.button_b,
            self.touch_pins[0],
            self.touch_pins[1],
            self.touch_pins[2],
            self.gesture_state,
        ]
    }
}

/// Latest known sensor state of the board
///
/// No history is kept: every decoded frame overwrites the telemetry fields.
/// `led_matrix` is not part of telemetry; it mirrors the last bitmap the
/// board acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub tilt_x: i16,
    pub tilt_y: i16,
    pub button_a: u8,
    pub button_b: u8,
    pub touch_pins: [u8; 3],
    pub gesture_state: u8,
    pub led_matrix: [u8; 5],
}

impl SensorSnapshot {
    /// Overwrite the telemetry fields from a decoded frame
    pub fn apply(&mut self, frame: &TelemetryFrame) {
        self.tilt_x = frame.tilt_x;
        self.tilt_y = frame.tilt_y;
        self.button_a = frame.button_a;
        self.button_b = frame.button_b;
        self.touch_pins = frame.touch_pins;
        self.gesture_state = frame.gesture_state;
    }

    /// Tilt in degrees towards `direction`
    ///
    /// Raw tilt is in tenths of a degree. Front and left read as negative
    /// raw values, so they are negated here.
    pub fn tilt_angle(&self, direction: TiltDirection) -> i16 {
        let degrees = |raw: i16| (f32::from(raw) / 10.0).round() as i16;
        match direction {
            TiltDirection::Front => -degrees(self.tilt_y),
            TiltDirection::Back => degrees(self.tilt_y),
            TiltDirection::Left => -degrees(self.tilt_x),
            TiltDirection::Right => degrees(self.tilt_x),
            TiltDirection::Any => {
                let x = degrees(self.tilt_x);
                let y = degrees(self.tilt_y);
                if x.unsigned_abs() >= y.unsigned_abs() {
                    x
                } else {
                    y
                }
            }
        }
    }

    pub fn is_tilted(&self, direction: TiltDirection) -> bool {
        match direction {
            TiltDirection::Any => {
                self.tilt_angle(TiltDirection::Right).unsigned_abs() >= TILT_THRESHOLD as u16
                    || self.tilt_angle(TiltDirection::Back).unsigned_abs()
                        >= TILT_THRESHOLD as u16
            }
            _ => self.tilt_angle(direction) >= TILT_THRESHOLD,
        }
    }

    pub fn is_pressed(&self, button: Button) -> bool {
        match button {
            Button::A => self.button_a != 0,
            Button::B => self.button_b != 0,
            Button::Any => self.button_a != 0 || self.button_b != 0,
        }
    }

    pub fn gesture(&self, gesture: Gesture) -> bool {
        self.gesture_state & gesture.mask() != 0
    }

    /// Touch pin state for indices 0..=2
    pub fn touch_pin(&self, index: usize) -> Option<u8> {
        self.touch_pins.get(index).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TiltDirection {
    Front,
    Back,
    Left,
    Right,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    A,
    B,
    Any,
}

/// Gestures reported in the gesture-state byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gesture {
    Moved,
    Shaken,
    Jumped,
}

impl Gesture {
    fn mask(self) -> u8 {
        match self {
            Gesture::Moved => 1 << 0,
            Gesture::Shaken => 1 << 1,
            Gesture::Jumped => 1 << 2,
        }
    }
}
