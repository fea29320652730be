// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! In-process simulated board
//!
//! Plays the firmware side of the pinoo protocol so a session can run
//! without radio hardware:
//!
//! - advertises one peripheral and accepts connections to it
//! - unframes writes, applies legacy binary frames and JSON structured
//!   commands to its pin/display state
//! - accepts legacy frames with a leading opcode byte or as the bare payload;
//!   bare payloads are classified by shape (five bytes of 5-bit rows is an
//!   LED bitmap, printable bytes are text, anything else is pin config)
//! - acknowledges `digital_read` with the decimal pin level, every other
//!   command with an empty payload
//! - streams 10-byte telemetry frames at a fixed interval
//!
//! [`SimulatedBoard`] is a cheap, cloneable control handle: tests and tools
//! use it to move sensors, silence telemetry, or make the board stop
//! acknowledging writes.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{LinkError, LinkResult};
use crate::gatt::{Encoding, GattProfile};
use crate::link::{
    DiscoveryFilter, LinkConnector, LinkEvent, LinkEventSender, LinkStatus, PeripheralId,
    PeripheralInfo, PeripheralLink,
};

/// Number of digital pins the simulated board exposes
pub const SIMULATED_PIN_COUNT: usize = 20;

const OPCODE_PIN_CONFIG: u8 = 0x80;
const OPCODE_DISPLAY_TEXT: u8 = 0x81;
const OPCODE_DISPLAY_LED: u8 = 0x82;

/// Each LED matrix row uses the low five bits
const LED_ROW_MASK: u8 = 0x1f;

/// Timing and identity of the simulated board
#[derive(Debug, Clone)]
pub struct SimulatorSettings {
    pub peripheral_name: String,
    pub telemetry_interval: Duration,
    pub ack_latency: Duration,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            peripheral_name: "wPinoo-sim".to_string(),
            telemetry_interval: Duration::from_millis(100),
            ack_latency: Duration::from_millis(10),
        }
    }
}

/// Structured commands as the firmware parses them
#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum BoardCommand {
    DigitalWrite { pin: usize, value: u8 },
    SetPinMode { pin: usize, value: u8 },
    DigitalRead { pin: usize },
    UploadDevMode { data: serde_json::Value },
    UploadRunMode { data: serde_json::Value },
}

#[derive(Debug, Default)]
struct BoardState {
    tilt_x: i16,
    tilt_y: i16,
    button_a: u8,
    button_b: u8,
    touch_pins: [u8; 3],
    gesture_state: u8,

    pin_levels: [u8; SIMULATED_PIN_COUNT],
    pin_modes: [Option<u8>; SIMULATED_PIN_COUNT],
    pin_config: Vec<u8>,
    displayed_text: Option<String>,
    led_matrix: [u8; 5],
    uploads: BTreeMap<String, serde_json::Value>,

    frames_received: Vec<Vec<u8>>,
    telemetry_paused: bool,
    unresponsive: bool,
    listener: Option<LinkEventSender>,
}

/// Shared control handle for the simulated board
#[derive(Debug, Clone, Default)]
pub struct SimulatedBoard {
    state: Arc<Mutex<BoardState>>,
}

impl SimulatedBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tilt(&self, x: i16, y: i16) {
        let mut state = self.state.lock();
        state.tilt_x = x;
        state.tilt_y = y;
    }

    pub fn set_buttons(&self, a: u8, b: u8) {
        let mut state = self.state.lock();
        state.button_a = a;
        state.button_b = b;
    }

    pub fn set_touch_pins(&self, pins: [u8; 3]) {
        self.state.lock().touch_pins = pins;
    }

    pub fn set_gesture_state(&self, gesture_state: u8) {
        self.state.lock().gesture_state = gesture_state;
    }

    /// Drive an input pin as if wired externally
    pub fn set_pin_level(&self, pin: usize, level: u8) {
        if let Some(slot) = self.state.lock().pin_levels.get_mut(pin) {
            *slot = level;
        }
    }

    pub fn pin_level(&self, pin: usize) -> Option<u8> {
        self.state.lock().pin_levels.get(pin).copied()
    }

    pub fn pin_mode(&self, pin: usize) -> Option<u8> {
        self.state.lock().pin_modes.get(pin).copied().flatten()
    }

    pub fn pin_config(&self) -> Vec<u8> {
        self.state.lock().pin_config.clone()
    }

    pub fn displayed_text(&self) -> Option<String> {
        self.state.lock().displayed_text.clone()
    }

    pub fn led_matrix(&self) -> [u8; 5] {
        self.state.lock().led_matrix
    }

    /// Last uploaded program for `"upload_dev_mode"` or `"upload_run_mode"`
    pub fn uploaded_program(&self, mode: &str) -> Option<serde_json::Value> {
        self.state.lock().uploads.get(mode).cloned()
    }

    /// Frames received so far, after unframing
    pub fn frames_received(&self) -> Vec<Vec<u8>> {
        self.state.lock().frames_received.clone()
    }

    pub fn write_count(&self) -> usize {
        self.state.lock().frames_received.len()
    }

    /// Stop (or resume) telemetry without dropping the connection
    pub fn pause_telemetry(&self, paused: bool) {
        self.state.lock().telemetry_paused = paused;
    }

    /// Keep accepting writes but never acknowledge them
    pub fn set_unresponsive(&self, unresponsive: bool) {
        self.state.lock().unresponsive = unresponsive;
    }

    fn is_unresponsive(&self) -> bool {
        self.state.lock().unresponsive
    }

    /// Push an arbitrary notification to the connected host
    ///
    /// Returns `false` when no host is connected.
    pub fn inject_notification(&self, frame: Vec<u8>) -> bool {
        match &self.state.lock().listener {
            Some(listener) => listener.send(LinkEvent::Notification(frame)).is_ok(),
            None => false,
        }
    }

    /// Drop the connection from the board side (power loss, out of range)
    pub fn drop_connection(&self, reason: &str) -> bool {
        match self.state.lock().listener.take() {
            Some(listener) => listener
                .send(LinkEvent::Disconnected {
                    reason: Some(reason.to_string()),
                })
                .is_ok(),
            None => false,
        }
    }

    /// Current sensor state in the 10-byte telemetry layout
    pub fn telemetry_frame(&self) -> [u8; 10] {
        let state = self.state.lock();
        let mut frame = [0u8; 10];
        frame[0..2].copy_from_slice(&state.tilt_x.to_be_bytes());
        frame[2..4].copy_from_slice(&state.tilt_y.to_be_bytes());
        frame[4] = state.button_a;
        frame[5] = state.button_b;
        frame[6..9].copy_from_slice(&state.touch_pins);
        frame[9] = state.gesture_state;
        frame
    }

    fn attach(&self, listener: LinkEventSender) {
        self.state.lock().listener = Some(listener);
    }

    fn detach(&self) {
        self.state.lock().listener = None;
    }

    fn is_attached(&self) -> bool {
        self.state.lock().listener.is_some()
    }

    /// Emit one telemetry frame unless paused. Returns `false` once nobody listens.
    fn emit_telemetry(&self) -> bool {
        let frame = self.telemetry_frame();
        let state = self.state.lock();
        match &state.listener {
            Some(_) if state.telemetry_paused => true,
            Some(listener) => listener.send(LinkEvent::Notification(frame.to_vec())).is_ok(),
            None => false,
        }
    }

    /// Apply a received frame and produce the acknowledgment payload
    fn apply_frame(&self, frame: &[u8]) -> Vec<u8> {
        let mut state = self.state.lock();
        state.frames_received.push(frame.to_vec());

        if frame.first() == Some(&b'{') {
            return match serde_json::from_slice::<BoardCommand>(frame) {
                Ok(command) => Self::apply_command(&mut state, command),
                Err(e) => {
                    warn!("[SIMULATOR] Unparseable structured command: {}", e);
                    Vec::new()
                }
            };
        }

        match frame.split_first() {
            Some((&OPCODE_DISPLAY_TEXT, text)) => {
                state.displayed_text = Some(text.iter().map(|&b| b as char).collect());
            }
            Some((&OPCODE_DISPLAY_LED, bitmap)) => {
                let len = bitmap.len().min(5);
                state.led_matrix = [0; 5];
                state.led_matrix[..len].copy_from_slice(&bitmap[..len]);
            }
            Some((&OPCODE_PIN_CONFIG, config)) => {
                state.pin_config = config.to_vec();
            }
            _ => Self::apply_bare_frame(&mut state, frame),
        }
        Vec::new()
    }

    fn apply_bare_frame(state: &mut BoardState, frame: &[u8]) {
        if frame.len() == 5 && frame.iter().all(|&row| row & !LED_ROW_MASK == 0) {
            state.led_matrix.copy_from_slice(frame);
        } else if frame.iter().all(|&b| b >= 0x20) {
            state.displayed_text = Some(frame.iter().map(|&b| b as char).collect());
        } else {
            state.pin_config = frame.to_vec();
        }
    }

    fn apply_command(state: &mut BoardState, command: BoardCommand) -> Vec<u8> {
        match command {
            BoardCommand::DigitalWrite { pin, value } => {
                if let Some(slot) = state.pin_levels.get_mut(pin) {
                    *slot = value;
                } else {
                    warn!("[SIMULATOR] digital_write to unknown pin {}", pin);
                }
                Vec::new()
            }
            BoardCommand::SetPinMode { pin, value } => {
                if let Some(slot) = state.pin_modes.get_mut(pin) {
                    *slot = Some(value);
                } else {
                    warn!("[SIMULATOR] set_pin_mode on unknown pin {}", pin);
                }
                Vec::new()
            }
            BoardCommand::DigitalRead { pin } => match state.pin_levels.get(pin) {
                Some(level) => level.to_string().into_bytes(),
                None => {
                    warn!("[SIMULATOR] digital_read on unknown pin {}", pin);
                    Vec::new()
                }
            },
            BoardCommand::UploadDevMode { data } => {
                state.uploads.insert("upload_dev_mode".to_string(), data);
                Vec::new()
            }
            BoardCommand::UploadRunMode { data } => {
                state.uploads.insert("upload_run_mode".to_string(), data);
                Vec::new()
            }
        }
    }
}

/// Connector producing links to a [`SimulatedBoard`]
#[derive(Debug, Clone)]
pub struct SimulatorConnector {
    board: SimulatedBoard,
    settings: SimulatorSettings,
}

impl SimulatorConnector {
    pub fn new(board: SimulatedBoard, settings: SimulatorSettings) -> Self {
        Self { board, settings }
    }

    pub fn board(&self) -> &SimulatedBoard {
        &self.board
    }

    /// Id the simulated board is discovered under
    pub fn peripheral_id(&self) -> PeripheralId {
        PeripheralId::new(format!("sim:{}", self.settings.peripheral_name))
    }
}

impl LinkConnector for SimulatorConnector {
    fn open(
        &self,
        filter: &DiscoveryFilter,
        profile: &GattProfile,
        events: LinkEventSender,
    ) -> LinkResult<Arc<dyn PeripheralLink>> {
        let discovered = if filter.matches(&self.settings.peripheral_name) {
            vec![PeripheralInfo {
                id: self.peripheral_id(),
                name: self.settings.peripheral_name.clone(),
                rssi: Some(-42),
            }]
        } else {
            Vec::new()
        };
        debug!(
            "[SIMULATOR] Discovery with prefix '{}' found {} peripheral(s)",
            filter.name_prefix,
            discovered.len()
        );

        Ok(Arc::new(SimulatedLink {
            board: self.board.clone(),
            settings: self.settings.clone(),
            profile: *profile,
            discovered,
            events,
            connected: AtomicBool::new(false),
            ever_connected: AtomicBool::new(false),
            telemetry: Mutex::new(None),
        }))
    }
}

/// Link handle onto the simulated board
pub struct SimulatedLink {
    board: SimulatedBoard,
    settings: SimulatorSettings,
    profile: GattProfile,
    discovered: Vec<PeripheralInfo>,
    events: LinkEventSender,
    connected: AtomicBool,
    ever_connected: AtomicBool,
    telemetry: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedLink {
    fn start_telemetry(&self) {
        let board = self.board.clone();
        let period = self.settings.telemetry_interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if !board.emit_telemetry() {
                    break;
                }
            }
            debug!("[SIMULATOR] Telemetry stream stopped");
        });
        if let Some(previous) = self.telemetry.lock().replace(task) {
            previous.abort();
        }
    }

    fn stop_telemetry(&self) {
        if let Some(task) = self.telemetry.lock().take() {
            task.abort();
        }
    }
}

#[async_trait]
impl PeripheralLink for SimulatedLink {
    async fn connect(&self, id: &PeripheralId) -> LinkResult<()> {
        if !self.discovered.iter().any(|p| &p.id == id) {
            return Err(LinkError::PeripheralNotFound(id.to_string()));
        }
        if self.is_connected() {
            return Ok(());
        }
        self.connected.store(true, Ordering::SeqCst);
        self.ever_connected.store(true, Ordering::SeqCst);

        self.board.attach(self.events.clone());
        self.events
            .send(LinkEvent::Connected {
                peripheral: id.clone(),
            })
            .map_err(|_| LinkError::Closed("event receiver dropped".to_string()))?;
        self.start_telemetry();
        debug!("[SIMULATOR] Connected to {}", id);
        Ok(())
    }

    async fn disconnect(&self) -> LinkResult<()> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.stop_telemetry();
        self.board.detach();
        let _ = self.events.send(LinkEvent::Disconnected { reason: None });
        debug!("[SIMULATOR] Disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        // A board-side drop detaches the listener without going through disconnect()
        self.connected.load(Ordering::SeqCst) && self.board.is_attached()
    }

    fn status(&self) -> LinkStatus {
        if self.is_connected() {
            LinkStatus::Connected
        } else if self.connected.load(Ordering::SeqCst) {
            // Dropped by the board, not by disconnect()
            LinkStatus::Error
        } else if self.ever_connected.load(Ordering::SeqCst) {
            LinkStatus::Disconnected
        } else {
            LinkStatus::Discovering
        }
    }

    fn discovered(&self) -> Vec<PeripheralInfo> {
        self.discovered.clone()
    }

    async fn write(
        &self,
        service_id: u16,
        characteristic: Uuid,
        payload: &[u8],
        encoding: Encoding,
        with_response: bool,
    ) -> LinkResult<Vec<u8>> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }
        if service_id != self.profile.service_id
            || characteristic != self.profile.write_characteristic
        {
            return Err(LinkError::WriteRejected(format!(
                "no writable characteristic {} on service {:#06x}",
                characteristic, service_id
            )));
        }

        let wire = encoding.frame(payload);
        tokio::time::sleep(self.settings.ack_latency).await;

        let frame = encoding.unframe(&wire)?;
        let ack = self.board.apply_frame(&frame);
        if self.board.is_unresponsive() {
            // Powered off mid-transaction: the frame landed, the ack never comes
            std::future::pending::<()>().await;
        }

        Ok(if with_response { ack } else { Vec::new() })
    }
}

impl Drop for SimulatedLink {
    fn drop(&mut self) {
        self.stop_telemetry();
    }
}
