// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Consumer-facing board API
//!
//! Typed operations and sensor accessors over a [`PeripheralSession`]. No
//! logic lives here beyond argument encoding and snapshot projection.

use std::sync::Arc;
use std::time::Duration;

use pinoo_config::{PeripheralKind, PinooConfig};
use pinoo_link::{LinkConnector, PeripheralId, PeripheralInfo};
#[cfg(feature = "simulator")]
use pinoo_link::{SimulatedBoard, SimulatorConnector, SimulatorSettings};
use tokio::sync::broadcast;
use tracing::info;

use crate::command::{Command, PinLevel, PinMode};
use crate::error::{Result, SessionError};
use crate::program::{ProgramGraph, UploadMode};
use crate::session::{PeripheralSession, SessionEvent, SessionSettings};
use crate::telemetry::{Button, Gesture, SensorSnapshot, TiltDirection};

/// A pinoo board (real or simulated) behind one session
#[derive(Clone)]
pub struct Board {
    session: PeripheralSession,
    kind: PeripheralKind,
    #[cfg(feature = "simulator")]
    simulated: Option<SimulatedBoard>,
}

impl Board {
    /// Board reached through a caller-supplied transport
    pub fn new(connector: Arc<dyn LinkConnector>, settings: SessionSettings) -> Self {
        Self {
            session: PeripheralSession::new(connector, settings),
            kind: PeripheralKind::Board,
            #[cfg(feature = "simulator")]
            simulated: None,
        }
    }

    /// In-process simulated board with the given session settings
    #[cfg(feature = "simulator")]
    pub fn simulated(settings: SessionSettings, simulator: SimulatorSettings) -> Self {
        let board = SimulatedBoard::new();
        let connector = SimulatorConnector::new(board.clone(), simulator);
        Self {
            session: PeripheralSession::new(Arc::new(connector), settings),
            kind: PeripheralKind::Simulator,
            simulated: Some(board),
        }
    }

    /// Wire a board as selected by `peripheral.kind`
    ///
    /// `Board` needs `connector`; `Simulator` ignores it.
    pub fn from_config(
        config: &PinooConfig,
        connector: Option<Arc<dyn LinkConnector>>,
    ) -> Result<Self> {
        let settings = SessionSettings::from_config(config)?;
        match config.peripheral.kind {
            PeripheralKind::Board => {
                let connector = connector.ok_or_else(|| {
                    SessionError::InvalidArgument(
                        "a board peripheral needs a link connector".to_string(),
                    )
                })?;
                Ok(Self::new(connector, settings))
            }
            #[cfg(feature = "simulator")]
            PeripheralKind::Simulator => Ok(Self::simulated(
                settings,
                SimulatorSettings {
                    peripheral_name: config.simulator.peripheral_name.clone(),
                    telemetry_interval: config.simulator.telemetry_interval(),
                    ack_latency: config.simulator.ack_latency(),
                },
            )),
            #[cfg(not(feature = "simulator"))]
            PeripheralKind::Simulator => Err(SessionError::InvalidArgument(
                "built without the simulator feature".to_string(),
            )),
        }
    }

    pub fn kind(&self) -> PeripheralKind {
        self.kind
    }

    /// Identifier the board extension registers under
    pub fn extension_id(&self) -> &'static str {
        self.kind.extension_id()
    }

    /// Control handle of the simulated board, if this is one
    #[cfg(feature = "simulator")]
    pub fn simulator(&self) -> Option<&SimulatedBoard> {
        self.simulated.as_ref()
    }

    pub fn session(&self) -> &PeripheralSession {
        &self.session
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.session.subscribe()
    }

    /// Advisory pause between repeated commands
    pub fn send_interval(&self) -> Duration {
        self.session.settings().send_interval
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    pub async fn scan(&self) -> Result<Vec<PeripheralInfo>> {
        self.session.scan().await
    }

    pub async fn connect(&self, id: &PeripheralId) -> Result<()> {
        self.session.connect(id).await
    }

    /// Scan and connect to the first peripheral found
    pub async fn connect_first(&self) -> Result<PeripheralInfo> {
        let first = self
            .scan()
            .await?
            .into_iter()
            .next()
            .ok_or(SessionError::NoPeripheral)?;
        self.connect(&first.id).await?;
        info!("[SESSION] Using {} ({})", first.name, first.id);
        Ok(first)
    }

    pub async fn disconnect(&self) {
        self.session.disconnect().await
    }

    pub fn reset(&self) {
        self.session.reset()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    // ---------------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------------

    pub async fn digital_write(&self, pin: u8, level: PinLevel) -> Result<()> {
        self.session
            .send(&Command::digital_write(pin, level)?)
            .await
            .map(|_| ())
    }

    pub async fn set_pin_mode(&self, pin: u8, mode: PinMode) -> Result<()> {
        self.session
            .send(&Command::set_pin_mode(pin, mode)?)
            .await
            .map(|_| ())
    }

    /// Read a pin and compare it with `expected`
    pub async fn digital_read(&self, pin: u8, expected: PinLevel) -> Result<bool> {
        let ack = self.session.send(&Command::digital_read(pin)?).await?;
        Ok(expected.matches_ack(&ack))
    }

    /// Show text on the display; resolves with the raw acknowledgment
    pub async fn display_text(&self, text: &str) -> Result<Vec<u8>> {
        self.session.send(&Command::display_text(text)?).await
    }

    /// Show a 5x5 bitmap, one byte per row
    pub async fn display_matrix(&self, bitmap: [u8; 5]) -> Result<Vec<u8>> {
        self.session.send(&Command::display_matrix(bitmap)).await
    }

    pub async fn pin_config(&self, config: Vec<u8>) -> Result<Vec<u8>> {
        self.session.send(&Command::pin_config(config)).await
    }

    /// Upload a program graph
    ///
    /// `entry` defaults to the graph's first script. The acknowledgment is
    /// returned as received; its contents are firmware-defined.
    pub async fn upload_program(
        &self,
        mode: UploadMode,
        graph: &ProgramGraph,
        entry: Option<&str>,
    ) -> Result<Vec<u8>> {
        let entry = entry
            .or_else(|| graph.entry_point())
            .ok_or_else(|| SessionError::InvalidProgram("program has no scripts".to_string()))?;
        self.session
            .send(&Command::upload_program(mode, graph, entry)?)
            .await
    }

    // ---------------------------------------------------------------------
    // Sensors
    // ---------------------------------------------------------------------

    pub fn snapshot(&self) -> SensorSnapshot {
        self.session.snapshot()
    }

    pub fn tilt_x(&self) -> i16 {
        self.snapshot().tilt_x
    }

    pub fn tilt_y(&self) -> i16 {
        self.snapshot().tilt_y
    }

    pub fn button_a(&self) -> u8 {
        self.snapshot().button_a
    }

    pub fn button_b(&self) -> u8 {
        self.snapshot().button_b
    }

    pub fn touch_pin(&self, index: usize) -> Option<u8> {
        self.snapshot().touch_pin(index)
    }

    pub fn gesture_state(&self) -> u8 {
        self.snapshot().gesture_state
    }

    pub fn led_matrix(&self) -> [u8; 5] {
        self.snapshot().led_matrix
    }

    pub fn tilt_angle(&self, direction: TiltDirection) -> i16 {
        self.snapshot().tilt_angle(direction)
    }

    pub fn is_tilted(&self, direction: TiltDirection) -> bool {
        self.snapshot().is_tilted(direction)
    }

    pub fn is_pressed(&self, button: Button) -> bool {
        self.snapshot().is_pressed(button)
    }

    pub fn gesture(&self, gesture: Gesture) -> bool {
        self.snapshot().gesture(gesture)
    }
}
