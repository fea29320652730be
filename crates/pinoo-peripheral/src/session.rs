// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Peripheral session manager
//!
//! Owns one logical session with one board:
//!
//! - **Lifecycle**: `scan()` opens a fresh link handle (tearing down the
//!   previous one), `connect()` forwards to it, `disconnect()` tears down and
//!   resets.
//! - **Busy discipline**: at most one command is in flight. A command issued
//!   while another is pending, or while the link is down, is dropped with
//!   [`SessionError::Busy`] / [`SessionError::NotConnected`]; nothing queues.
//!   The busy slot clears on acknowledgment or when the grace period runs
//!   out, whichever comes first.
//! - **Watchdog**: armed on the connect callback and re-armed on every decoded
//!   telemetry frame. Expiry marks the link stale, disconnects it and
//!   broadcasts [`SessionEvent::LinkLost`].
//! - **Telemetry**: inbound frames are handled one at a time, in arrival
//!   order, by a single event-loop task; each frame updates the snapshot and
//!   the watchdog under one lock so readers never see a half-applied frame.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use pinoo_config::{PinooConfig, WireEncoding};
use pinoo_link::{
    link_event_channel, DiscoveryFilter, Encoding, GattProfile, LinkConnector, LinkEvent,
    LinkEventReceiver, PeripheralId, PeripheralInfo, PeripheralLink,
};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::command::{Command, Opcode, Payload};
use crate::error::{Result, SessionError};
use crate::telemetry::{SensorSnapshot, TelemetryFrame};
use crate::watchdog::Watchdog;

/// Capacity of the session event broadcast channel
const EVENT_CAPACITY: usize = 64;

/// Why a link was lost
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkLossReason {
    /// No telemetry within the watchdog interval
    Stale,
    /// The transport reported the peripheral gone
    PeripheralDisconnected(Option<String>),
}

/// Session notifications for the surrounding application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected(PeripheralId),
    Telemetry(SensorSnapshot),
    LinkLost(LinkLossReason),
}

/// Fixed parameters of a session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub filter: DiscoveryFilter,
    pub profile: GattProfile,
    pub encoding: Encoding,
    /// Send legacy binary commands as `[opcode, payload...]` instead of the
    /// bare payload
    pub prefix_legacy_opcode: bool,
    pub watchdog_interval: Duration,
    pub busy_grace_period: Duration,
    /// Advisory pacing for repeated commands; not enforced
    pub send_interval: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            filter: DiscoveryFilter::new("w"),
            profile: GattProfile::default(),
            encoding: Encoding::Base64,
            prefix_legacy_opcode: false,
            watchdog_interval: Duration::from_millis(4500),
            busy_grace_period: Duration::from_millis(5000),
            send_interval: Duration::from_millis(100),
        }
    }
}

impl SessionSettings {
    /// Build settings from a loaded configuration
    pub fn from_config(config: &PinooConfig) -> Result<Self> {
        let parse = |field: &str, value: &str| {
            Uuid::parse_str(value).map_err(|e| {
                SessionError::InvalidArgument(format!("{} is not a UUID: {}", field, e))
            })
        };

        Ok(Self {
            filter: DiscoveryFilter::new(config.peripheral.name_prefix.clone()),
            profile: GattProfile {
                service_id: config.link.service_id,
                write_characteristic: parse(
                    "link.write_characteristic",
                    &config.link.write_characteristic,
                )?,
                notify_characteristic: parse(
                    "link.notify_characteristic",
                    &config.link.notify_characteristic,
                )?,
            },
            encoding: match config.link.encoding {
                WireEncoding::Raw => Encoding::Raw,
                WireEncoding::Base64 => Encoding::Base64,
            },
            prefix_legacy_opcode: config.link.prefix_legacy_opcode,
            watchdog_interval: config.timing.watchdog_interval(),
            busy_grace_period: config.timing.busy_grace_period(),
            send_interval: config.timing.send_interval(),
        })
    }
}

/// Connection and flow-control state
struct SessionState {
    link: Option<Arc<dyn PeripheralLink>>,
    event_loop: Option<JoinHandle<()>>,
    peripheral: Option<PeripheralId>,
    /// Between the connect callback and the next disconnect
    connected: bool,
    /// Flight id of the command holding the busy slot
    in_flight: Option<u64>,
    /// Fails the in-flight command early when the link goes stale
    abort_flight: Option<oneshot::Sender<SessionError>>,
    next_flight: u64,
    watchdog: Watchdog,
    snapshot: SensorSnapshot,
}

impl SessionState {
    fn clear(&mut self) {
        self.watchdog.cancel();
        self.in_flight = None;
        self.abort_flight = None;
        self.snapshot = SensorSnapshot::default();
    }
}

struct SessionInner {
    connector: Arc<dyn LinkConnector>,
    settings: SessionSettings,
    state: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    self_ref: Weak<SessionInner>,
}

/// Session with a single board
///
/// Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct PeripheralSession {
    inner: Arc<SessionInner>,
}

impl PeripheralSession {
    pub fn new(connector: Arc<dyn LinkConnector>, settings: SessionSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let watchdog = Watchdog::new(settings.watchdog_interval);
        let inner = Arc::new_cyclic(|self_ref| SessionInner {
            connector,
            settings,
            state: Mutex::new(SessionState {
                link: None,
                event_loop: None,
                peripheral: None,
                connected: false,
                in_flight: None,
                abort_flight: None,
                next_flight: 0,
                watchdog,
                snapshot: SensorSnapshot::default(),
            }),
            events,
            self_ref: self_ref.clone(),
        });
        Self { inner }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.inner.settings
    }

    /// Start a new discovery cycle, replacing any previous link handle
    ///
    /// Returns the peripherals discovered by the new handle.
    pub async fn scan(&self) -> Result<Vec<PeripheralInfo>> {
        let (old_link, old_loop) = {
            let mut state = self.inner.state.lock();
            state.connected = false;
            state.peripheral = None;
            state.clear();
            (state.link.take(), state.event_loop.take())
        };
        if let Some(event_loop) = old_loop {
            event_loop.abort();
        }
        if let Some(link) = old_link {
            debug!("[SESSION] Releasing previous link before scan");
            if let Err(e) = link.disconnect().await {
                warn!("[SESSION] Previous link did not disconnect cleanly: {}", e);
            }
        }

        let (tx, rx) = link_event_channel();
        let link = self
            .inner
            .connector
            .open(&self.inner.settings.filter, &self.inner.settings.profile, tx)?;
        let discovered = link.discovered();
        let event_loop = tokio::spawn(run_event_loop(self.inner.self_ref.clone(), rx));

        {
            let mut state = self.inner.state.lock();
            state.link = Some(link);
            state.event_loop = Some(event_loop);
        }

        info!(
            "[SESSION] Scan with prefix '{}' discovered {} peripheral(s)",
            self.inner.settings.filter.name_prefix,
            discovered.len()
        );
        Ok(discovered)
    }

    /// Peripherals seen by the current link handle
    pub fn discovered(&self) -> Vec<PeripheralInfo> {
        match &self.inner.state.lock().link {
            Some(link) => link.discovered(),
            None => Vec::new(),
        }
    }

    /// Connect to a discovered peripheral
    ///
    /// The session counts as connected once the transport's connect callback
    /// arrives (see [`SessionEvent::Connected`]).
    pub async fn connect(&self, id: &PeripheralId) -> Result<()> {
        let link = self
            .inner
            .state
            .lock()
            .link
            .clone()
            .ok_or(SessionError::NoPeripheral)?;
        debug!("[SESSION] Connecting to {}", id);
        link.connect(id).await?;
        Ok(())
    }

    /// Disconnect and reset. Safe to call any number of times.
    pub async fn disconnect(&self) {
        let link = {
            let mut state = self.inner.state.lock();
            state.connected = false;
            state.link.clone()
        };
        if let Some(link) = link {
            if let Err(e) = link.disconnect().await {
                warn!("[SESSION] Link disconnect failed: {}", e);
            }
        }
        self.reset();
        debug!("[SESSION] Disconnected");
    }

    /// Cancel the watchdog, release the busy slot and clear the snapshot
    ///
    /// A command still running when the slot is released keeps its own
    /// result but can no longer clear the busy state of a newer command.
    pub fn reset(&self) {
        self.inner.state.lock().clear();
    }

    /// Delegates to the current link handle
    pub fn is_connected(&self) -> bool {
        self.inner
            .state
            .lock()
            .link
            .as_ref()
            .is_some_and(|link| link.is_connected())
    }

    pub fn is_busy(&self) -> bool {
        self.inner.state.lock().in_flight.is_some()
    }

    /// When the watchdog fires if no telemetry arrives before then
    pub fn watchdog_deadline(&self) -> Option<Instant> {
        self.inner.state.lock().watchdog.deadline()
    }

    pub fn peripheral(&self) -> Option<PeripheralId> {
        self.inner.state.lock().peripheral.clone()
    }

    /// Copy of the latest sensor state
    pub fn snapshot(&self) -> SensorSnapshot {
        self.inner.state.lock().snapshot
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Send one command and wait for its acknowledgment payload
    ///
    /// # Errors
    ///
    /// - `NotConnected` / `Busy`: dropped without touching the link
    /// - `AckTimeout`: no acknowledgment within the grace period; the busy
    ///   slot is free again and the write is not retried
    /// - `LinkStale`: the watchdog tore the link down while waiting
    /// - `Link`: the transport failed the write
    pub async fn send(&self, command: &Command) -> Result<Vec<u8>> {
        let frame = command.to_frame(self.inner.settings.prefix_legacy_opcode)?;
        let opcode = command.opcode;
        let led_bitmap = match (&command.opcode, &command.payload) {
            (Opcode::DisplayLed, Payload::Bytes(bytes)) => <[u8; 5]>::try_from(bytes.as_slice()).ok(),
            _ => None,
        };

        let (abort_tx, abort_rx) = oneshot::channel();
        let (link, flight) = {
            let mut state = self.inner.state.lock();
            let link = match &state.link {
                Some(link) if link.is_connected() => Arc::clone(link),
                _ => {
                    debug!("[SESSION] Dropping {}: not connected", opcode);
                    return Err(SessionError::NotConnected);
                }
            };
            if state.in_flight.is_some() {
                debug!("[SESSION] Dropping {}: another command is in flight", opcode);
                return Err(SessionError::Busy);
            }
            state.next_flight = state.next_flight.wrapping_add(1);
            let flight = state.next_flight;
            state.in_flight = Some(flight);
            state.abort_flight = Some(abort_tx);
            (link, flight)
        };

        // The write runs on its own task so the busy slot is released even
        // if the caller stops waiting.
        let (tx, rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let settings = &inner.settings;
            let grace = settings.busy_grace_period;
            let write = link.write(
                settings.profile.service_id,
                settings.profile.write_characteristic,
                &frame,
                settings.encoding,
                true,
            );

            // A reset drops the abort sender; that branch is then disabled
            // and the write keeps its own timeout.
            let result = tokio::select! {
                outcome = tokio::time::timeout(grace, write) => match outcome {
                    Ok(Ok(ack)) => {
                        debug!("[SESSION] {} acknowledged ({} bytes)", opcode, ack.len());
                        Ok(ack)
                    }
                    Ok(Err(e)) => {
                        warn!("[SESSION] {} write failed: {}", opcode, e);
                        Err(SessionError::Link(e))
                    }
                    Err(_) => {
                        warn!(
                            "[SESSION] No acknowledgment for {} within {:?}; releasing busy",
                            opcode, grace
                        );
                        Err(SessionError::AckTimeout(grace))
                    }
                },
                Ok(reason) = abort_rx => {
                    warn!("[SESSION] {} abandoned: {}", opcode, reason);
                    Err(reason)
                }
            };

            inner.release_flight(flight, led_bitmap.filter(|_| result.is_ok()));
            let _ = tx.send(result);
        });

        rx.await.unwrap_or(Err(SessionError::Abandoned))
    }
}

impl SessionInner {
    /// Free the busy slot if `flight` still owns it
    fn release_flight(&self, flight: u64, led_bitmap: Option<[u8; 5]>) {
        let mut state = self.state.lock();
        if state.in_flight != Some(flight) {
            debug!("[SESSION] Late completion of flight {} ignored", flight);
            return;
        }
        state.in_flight = None;
        state.abort_flight = None;
        if let Some(bitmap) = led_bitmap {
            state.snapshot.led_matrix = bitmap;
        }
    }

    fn arm_watchdog(&self, state: &mut SessionState) {
        let session = self.self_ref.clone();
        state.watchdog.arm(move |generation| async move {
            if let Some(inner) = session.upgrade() {
                inner.on_watchdog_expired(generation).await;
            }
        });
    }

    async fn on_watchdog_expired(&self, generation: u64) {
        let link = {
            let mut state = self.state.lock();
            if !state.watchdog.claim_expiry(generation) || !state.connected {
                return;
            }
            warn!(
                "[WATCHDOG] No telemetry for {:?}; link is stale",
                self.settings.watchdog_interval
            );
            state.connected = false;
            if let Some(pending) = state.abort_flight.take() {
                let _ = pending.send(SessionError::LinkStale);
            }
            state.clear();
            state.link.clone()
        };

        let _ = self.events.send(SessionEvent::LinkLost(LinkLossReason::Stale));

        if let Some(link) = link {
            if let Err(e) = link.disconnect().await {
                warn!("[WATCHDOG] Disconnecting stale link failed: {}", e);
            }
        }
    }

    fn handle_link_event(&self, event: LinkEvent) {
        match event {
            LinkEvent::Connected { peripheral } => {
                {
                    let mut state = self.state.lock();
                    // A callback still queued when disconnect() ran is stale
                    if !state.link.as_ref().is_some_and(|link| link.is_connected()) {
                        debug!("[SESSION] Ignoring connect callback for a closed link");
                        return;
                    }
                    state.connected = true;
                    state.peripheral = Some(peripheral.clone());
                    self.arm_watchdog(&mut state);
                }
                info!("[SESSION] Connected to {}", peripheral);
                let _ = self.events.send(SessionEvent::Connected(peripheral));
            }
            LinkEvent::Notification(frame) => {
                let snapshot = {
                    let mut state = self.state.lock();
                    if !state.connected {
                        debug!("[SESSION] Ignoring telemetry while disconnected");
                        return;
                    }
                    match TelemetryFrame::decode(&frame) {
                        Ok(telemetry) => {
                            state.snapshot.apply(&telemetry);
                            self.arm_watchdog(&mut state);
                            state.snapshot
                        }
                        Err(e) => {
                            warn!("[SESSION] Discarding telemetry frame: {}", e);
                            return;
                        }
                    }
                };
                let _ = self.events.send(SessionEvent::Telemetry(snapshot));
            }
            LinkEvent::Disconnected { reason } => {
                let was_connected = {
                    let mut state = self.state.lock();
                    let was_connected = state.connected;
                    state.connected = false;
                    state.clear();
                    was_connected
                };
                if was_connected {
                    info!(
                        "[SESSION] Peripheral disconnected ({})",
                        reason.as_deref().unwrap_or("no reason given")
                    );
                    let _ = self
                        .events
                        .send(SessionEvent::LinkLost(LinkLossReason::PeripheralDisconnected(
                            reason,
                        )));
                }
            }
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(event_loop) = self.state.get_mut().event_loop.take() {
            event_loop.abort();
        }
    }
}

/// Apply link events in arrival order until the link or session goes away
async fn run_event_loop(session: Weak<SessionInner>, mut events: LinkEventReceiver) {
    while let Some(event) = events.recv().await {
        let Some(inner) = session.upgrade() else {
            break;
        };
        inner.handle_link_event(event);
    }
    debug!("[SESSION] Link event stream closed");
}
