// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Session behavior against the simulated board
//!
//! All tests run on a paused clock, so the 4500 ms watchdog and the 5000 ms
//! grace period elapse instantly and deterministically.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pinoo_link::{
    DiscoveryFilter, Encoding, GattProfile, LinkConnector, LinkEvent, LinkEventSender,
    LinkResult, PeripheralId, PeripheralInfo, PeripheralLink, SimulatedBoard, SimulatorSettings,
};
use pinoo_peripheral::{
    Board, LinkLossReason, PeripheralSession, PinLevel, PinMode, ProgramBlock, ProgramGraph,
    SensorSnapshot, SessionError, SessionEvent, SessionSettings, UploadMode,
};
use serde_json::json;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{sleep, Instant};
use uuid::Uuid;

const GRACE: Duration = Duration::from_millis(5000);
const WATCHDOG: Duration = Duration::from_millis(4500);

async fn wait_for<F>(events: &mut broadcast::Receiver<SessionEvent>, predicate: F) -> SessionEvent
where
    F: Fn(&SessionEvent) -> bool,
{
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("session event stream closed"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(30), wait)
        .await
        .expect("event did not arrive")
}

fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

/// Transport that acknowledges connects but sends nothing on an explicit disconnect
struct QuietLink {
    connected: AtomicBool,
    events: LinkEventSender,
}

#[async_trait]
impl PeripheralLink for QuietLink {
    async fn connect(&self, id: &PeripheralId) -> LinkResult<()> {
        self.connected.store(true, Ordering::SeqCst);
        let _ = self.events.send(LinkEvent::Connected {
            peripheral: id.clone(),
        });
        Ok(())
    }

    async fn disconnect(&self) -> LinkResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn discovered(&self) -> Vec<PeripheralInfo> {
        vec![PeripheralInfo {
            id: PeripheralId::new("quiet"),
            name: "wQuiet".to_string(),
            rssi: None,
        }]
    }

    async fn write(
        &self,
        _service_id: u16,
        _characteristic: Uuid,
        _payload: &[u8],
        _encoding: Encoding,
        _with_response: bool,
    ) -> LinkResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

struct QuietConnector;

impl LinkConnector for QuietConnector {
    fn open(
        &self,
        _filter: &DiscoveryFilter,
        _profile: &GattProfile,
        events: LinkEventSender,
    ) -> LinkResult<Arc<dyn PeripheralLink>> {
        Ok(Arc::new(QuietLink {
            connected: AtomicBool::new(false),
            events,
        }))
    }
}

fn simulated_board(settings: SessionSettings) -> (Board, SimulatedBoard) {
    let board = Board::simulated(settings, SimulatorSettings::default());
    let sim = board.simulator().cloned().expect("simulated board");
    (board, sim)
}

async fn connected_board() -> (Board, SimulatedBoard) {
    let (board, sim) = simulated_board(SessionSettings::default());
    let mut events = board.subscribe();
    board.connect_first().await.expect("connect");
    wait_for(&mut events, |e| matches!(e, SessionEvent::Connected(_))).await;
    (board, sim)
}

#[tokio::test(start_paused = true)]
async fn test_display_text_reaches_board() {
    let (board, sim) = connected_board().await;

    let ack = board.display_text("HI").await.unwrap();
    assert!(ack.is_empty());
    assert_eq!(sim.displayed_text().as_deref(), Some("HI"));
    assert_eq!(sim.frames_received().last(), Some(&vec![0x48, 0x49]));
    assert!(!board.session().is_busy());
}

#[tokio::test(start_paused = true)]
async fn test_legacy_opcode_prefix_opt_in() {
    let settings = SessionSettings {
        prefix_legacy_opcode: true,
        ..Default::default()
    };
    let (board, sim) = simulated_board(settings);
    let mut events = board.subscribe();
    board.connect_first().await.unwrap();
    wait_for(&mut events, |e| matches!(e, SessionEvent::Connected(_))).await;

    board.display_text("HI").await.unwrap();
    assert_eq!(sim.frames_received().last(), Some(&vec![0x81, 0x48, 0x49]));
    assert_eq!(sim.displayed_text().as_deref(), Some("HI"));
}

#[tokio::test(start_paused = true)]
async fn test_digital_read_compares_ack() {
    let (board, sim) = connected_board().await;

    sim.set_pin_level(7, 1);
    assert!(board.digital_read(7, PinLevel::High).await.unwrap());
    assert!(!board.digital_read(7, PinLevel::Low).await.unwrap());

    sim.set_pin_level(7, 0);
    assert!(!board.digital_read(7, PinLevel::High).await.unwrap());
    assert!(board.digital_read(7, PinLevel::Low).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_write_and_mode_reach_board() {
    let (board, sim) = connected_board().await;

    board.digital_write(13, PinLevel::High).await.unwrap();
    board.set_pin_mode(3, PinMode::InputPullup).await.unwrap();
    board.pin_config(vec![1, 2, 3]).await.unwrap();

    assert_eq!(sim.pin_level(13), Some(1));
    assert_eq!(sim.pin_mode(3), Some(2));
    assert_eq!(sim.pin_config(), vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_arguments_never_reach_link() {
    let (board, sim) = connected_board().await;

    assert!(matches!(
        board.digital_write(40, PinLevel::High).await,
        Err(SessionError::InvalidArgument(_))
    ));
    assert!(matches!(
        board.display_text("→").await,
        Err(SessionError::InvalidArgument(_))
    ));
    assert_eq!(sim.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_busy_drops_concurrent_send() {
    let (board, sim) = connected_board().await;

    let (first, second) = tokio::join!(board.display_text("A"), board.display_text("B"));
    assert!(first.is_ok());
    assert!(matches!(second, Err(SessionError::Busy)));
    assert_eq!(sim.write_count(), 1);
    assert_eq!(sim.displayed_text().as_deref(), Some("A"));

    // Slot is free again after the acknowledgment
    board.display_text("C").await.unwrap();
    assert_eq!(sim.write_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_ack_timeout_releases_busy_without_retry() {
    let (board, sim) = connected_board().await;
    sim.set_unresponsive(true);

    let started = Instant::now();
    let probe = async {
        sleep(GRACE - Duration::from_millis(100)).await;
        let still_busy = board.session().is_busy();
        let dropped = board.display_text("late").await;
        (still_busy, dropped)
    };
    let (result, (still_busy, dropped)) = tokio::join!(board.display_text("X"), probe);

    match result {
        Err(SessionError::AckTimeout(grace)) => assert_eq!(grace, GRACE),
        other => panic!("expected ack timeout, got {:?}", other),
    }
    assert!(started.elapsed() >= GRACE);
    assert!(still_busy);
    assert!(matches!(dropped, Err(SessionError::Busy)));
    assert!(!board.session().is_busy());
    assert_eq!(sim.write_count(), 1);

    sim.set_unresponsive(false);
    board.display_text("ok").await.unwrap();
    assert_eq!(sim.write_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stale_link_fails_pending_command() {
    let (board, sim) = connected_board().await;
    let mut events = board.subscribe();
    sim.pause_telemetry(true);
    sim.set_unresponsive(true);

    let started = Instant::now();
    let result = board.display_text("X").await;
    assert!(matches!(result, Err(SessionError::LinkStale)), "{:?}", result);
    assert!(started.elapsed() <= WATCHDOG);
    assert!(!board.session().is_busy());

    let event = wait_for(&mut events, |e| matches!(e, SessionEvent::LinkLost(_))).await;
    assert_eq!(event, SessionEvent::LinkLost(LinkLossReason::Stale));
}

#[tokio::test(start_paused = true)]
async fn test_late_completion_keeps_newer_busy() {
    let (board, sim) = connected_board().await;
    sim.set_unresponsive(true);

    let newer = async {
        sleep(Duration::from_millis(100)).await;
        board.reset();
        assert!(!board.session().is_busy());

        let check = async {
            // First command times out at 5000 ms, this one at 5100 ms
            sleep(Duration::from_millis(4950)).await;
            board.session().is_busy()
        };
        tokio::join!(board.display_text("B"), check)
    };
    let (first, (second, busy_between)) = tokio::join!(board.display_text("A"), newer);

    assert!(matches!(first, Err(SessionError::AckTimeout(_))));
    assert!(matches!(second, Err(SessionError::AckTimeout(_))));
    assert!(busy_between);
    assert!(!board.session().is_busy());
}

#[tokio::test(start_paused = true)]
async fn test_telemetry_updates_snapshot() {
    let (board, sim) = connected_board().await;
    let mut events = board.subscribe();

    sim.set_tilt(i16::MIN, i16::MAX);
    sim.set_buttons(1, 0);
    sim.set_touch_pins([0, 1, 0]);
    sim.set_gesture_state(0b010);

    let snapshot = match wait_for(&mut events, |e| {
        matches!(e, SessionEvent::Telemetry(s) if s.tilt_x == i16::MIN)
    })
    .await
    {
        SessionEvent::Telemetry(snapshot) => snapshot,
        other => panic!("unexpected event {:?}", other),
    };

    assert_eq!(snapshot.tilt_y, 32767);
    assert_eq!(board.tilt_x(), -32768);
    assert_eq!(board.button_a(), 1);
    assert_eq!(board.touch_pin(1), Some(1));
    assert_eq!(board.gesture_state(), 0b010);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frame_keeps_previous_snapshot() {
    let (board, sim) = connected_board().await;

    sim.set_tilt(42, -42);
    sleep(Duration::from_millis(250)).await;
    assert_eq!(board.tilt_x(), 42);

    sim.pause_telemetry(true);
    assert!(sim.inject_notification(vec![0x7f, 0xff, 0x00]));
    sleep(Duration::from_millis(10)).await;

    assert_eq!(board.tilt_x(), 42);
    assert_eq!(board.tilt_y(), -42);
    assert!(board.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_streaming_telemetry_keeps_link_alive() {
    let (board, _sim) = connected_board().await;

    sleep(WATCHDOG * 3).await;
    assert!(board.is_connected());
    let deadline = board.session().watchdog_deadline().expect("watchdog armed");
    assert!(deadline > Instant::now());
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_marks_silent_link_stale() {
    let (board, sim) = connected_board().await;
    let mut events = board.subscribe();

    sim.set_tilt(100, 0);
    sleep(Duration::from_millis(250)).await;
    assert_eq!(board.tilt_x(), 100);

    sim.pause_telemetry(true);
    let silenced = Instant::now();
    let event = wait_for(&mut events, |e| matches!(e, SessionEvent::LinkLost(_))).await;
    assert_eq!(event, SessionEvent::LinkLost(LinkLossReason::Stale));

    let waited = silenced.elapsed();
    assert!(waited >= WATCHDOG - Duration::from_millis(100), "{:?}", waited);
    assert!(waited <= WATCHDOG, "{:?}", waited);

    assert!(!board.is_connected());
    assert_eq!(board.snapshot(), SensorSnapshot::default());
    assert!(board.session().watchdog_deadline().is_none());

    // Nothing reaches the snapshot until a new connection
    sim.set_tilt(55, 55);
    sim.pause_telemetry(false);
    assert!(!sim.inject_notification(sim.telemetry_frame().to_vec()));
    sleep(Duration::from_millis(500)).await;
    assert_eq!(board.tilt_x(), 0);
    assert!(matches!(
        board.display_text("X").await,
        Err(SessionError::NotConnected)
    ));

    board.connect_first().await.unwrap();
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::Telemetry(s) if s.tilt_x == 55)
    })
    .await;
    assert_eq!(board.tilt_x(), 55);
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_armed_on_connect() {
    let (board, sim) = simulated_board(SessionSettings::default());
    sim.pause_telemetry(true);
    let mut events = board.subscribe();

    board.connect_first().await.unwrap();
    wait_for(&mut events, |e| matches!(e, SessionEvent::Connected(_))).await;
    assert!(board.session().watchdog_deadline().is_some());

    let event = wait_for(&mut events, |e| matches!(e, SessionEvent::LinkLost(_))).await;
    assert_eq!(event, SessionEvent::LinkLost(LinkLossReason::Stale));
}

#[tokio::test(start_paused = true)]
async fn test_peripheral_disconnect_is_escalated() {
    let (board, sim) = connected_board().await;
    let mut events = board.subscribe();

    assert!(sim.drop_connection("out of range"));
    let event = wait_for(&mut events, |e| matches!(e, SessionEvent::LinkLost(_))).await;
    assert_eq!(
        event,
        SessionEvent::LinkLost(LinkLossReason::PeripheralDisconnected(Some(
            "out of range".to_string()
        )))
    );
    assert!(!board.is_connected());
    assert!(board.session().watchdog_deadline().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_twice_is_idempotent() {
    let (board, _sim) = connected_board().await;
    let mut events = board.subscribe();

    board.disconnect().await;
    board.disconnect().await;

    assert!(!board.is_connected());
    assert!(!board.session().is_busy());
    assert!(board.session().watchdog_deadline().is_none());
    assert!(matches!(
        board.display_text("X").await,
        Err(SessionError::NotConnected)
    ));

    // An explicit disconnect is not a link loss
    sleep(WATCHDOG * 2).await;
    loop {
        match events.try_recv() {
            Ok(SessionEvent::LinkLost(reason)) => panic!("unexpected link loss {:?}", reason),
            Ok(_) => continue,
            Err(_) => break,
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_right_after_connect_stays_down() {
    let (board, _sim) = simulated_board(SessionSettings::default());
    let mut events = board.subscribe();

    let found = board.scan().await.unwrap();
    board.connect(&found[0].id).await.unwrap();
    board.disconnect().await;

    sleep(WATCHDOG * 2).await;
    assert!(!board.is_connected());
    assert!(board.session().watchdog_deadline().is_none());
    assert!(drain(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_queued_connect_callback_after_disconnect_is_ignored() {
    let session = PeripheralSession::new(Arc::new(QuietConnector), SessionSettings::default());
    let mut events = session.subscribe();

    let found = session.scan().await.unwrap();
    session.connect(&found[0].id).await.unwrap();
    session.disconnect().await;

    sleep(Duration::from_millis(10)).await;
    assert!(!session.is_connected());
    assert!(session.watchdog_deadline().is_none());

    sleep(WATCHDOG + GRACE).await;
    assert!(drain(&mut events).is_empty());

    // A fresh connect is applied as usual
    session.connect(&found[0].id).await.unwrap();
    let event = wait_for(&mut events, |e| matches!(e, SessionEvent::Connected(_))).await;
    assert_eq!(event, SessionEvent::Connected(PeripheralId::new("quiet")));
    assert!(session.watchdog_deadline().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_without_scan() {
    let (board, _sim) = simulated_board(SessionSettings::default());
    board.disconnect().await;
    board.disconnect().await;
    assert!(!board.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_connect_before_scan() {
    let (board, _sim) = simulated_board(SessionSettings::default());
    let result = board.connect(&PeripheralId::new("sim:wPinoo-sim")).await;
    assert!(matches!(result, Err(SessionError::NoPeripheral)));
}

#[tokio::test(start_paused = true)]
async fn test_send_before_connect_is_dropped() {
    let (board, sim) = simulated_board(SessionSettings::default());
    assert!(matches!(
        board.display_text("HI").await,
        Err(SessionError::NotConnected)
    ));

    let found = board.scan().await.unwrap();
    assert_eq!(found.len(), 1);
    assert!(matches!(
        board.digital_write(1, PinLevel::Low).await,
        Err(SessionError::NotConnected)
    ));
    assert_eq!(sim.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_scan_filters_by_name_prefix() {
    let settings = SessionSettings {
        filter: pinoo_link::DiscoveryFilter::new("x"),
        ..Default::default()
    };
    let (board, _sim) = simulated_board(settings);
    assert!(board.scan().await.unwrap().is_empty());
    assert!(matches!(
        board.connect_first().await,
        Err(SessionError::NoPeripheral)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_rescan_replaces_connected_link() {
    let (board, sim) = connected_board().await;
    let mut events = board.subscribe();

    board.scan().await.unwrap();
    assert!(!board.is_connected());
    assert!(board.session().watchdog_deadline().is_none());

    board.connect_first().await.unwrap();
    wait_for(&mut events, |e| matches!(e, SessionEvent::Connected(_))).await;
    board.display_text("again").await.unwrap();
    assert_eq!(sim.displayed_text().as_deref(), Some("again"));
}

#[tokio::test(start_paused = true)]
async fn test_display_matrix_mirrors_led_state() {
    let (board, sim) = connected_board().await;
    let bitmap = [0x0a, 0x1f, 0x1f, 0x0e, 0x04];

    board.display_matrix(bitmap).await.unwrap();
    assert_eq!(sim.led_matrix(), bitmap);
    assert_eq!(board.led_matrix(), bitmap);

    // Telemetry does not touch the mirrored bitmap
    sleep(Duration::from_millis(300)).await;
    assert_eq!(board.led_matrix(), bitmap);
}

#[tokio::test(start_paused = true)]
async fn test_upload_program_modes() {
    let (board, sim) = connected_board().await;

    let mut graph = ProgramGraph::new();
    graph.insert(
        ProgramBlock::new("go", "event_whenflagclicked")
            .top_level()
            .with_next("led"),
    );
    graph.insert(
        ProgramBlock::new("led", "pinoo_digitalWrite")
            .with_parent("go")
            .with_field("PIN", json!(13)),
    );

    let ack = board
        .upload_program(UploadMode::Dev, &graph, None)
        .await
        .unwrap();
    assert!(ack.is_empty());
    let uploaded = sim.uploaded_program("upload_dev_mode").expect("dev upload");
    assert_eq!(uploaded["startingBlock"], json!("go"));
    assert_eq!(uploaded["blocks"]["led"]["opcode"], json!("pinoo_digitalWrite"));

    board
        .upload_program(UploadMode::Run, &graph, Some("go"))
        .await
        .unwrap();
    assert!(sim.uploaded_program("upload_run_mode").is_some());

    assert!(matches!(
        board
            .upload_program(UploadMode::Run, &ProgramGraph::new(), None)
            .await,
        Err(SessionError::InvalidProgram(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_raw_encoding_round_trip() {
    let settings = SessionSettings {
        encoding: pinoo_link::Encoding::Raw,
        ..Default::default()
    };
    let (board, sim) = simulated_board(settings);
    let mut events = board.subscribe();
    board.connect_first().await.unwrap();
    wait_for(&mut events, |e| matches!(e, SessionEvent::Connected(_))).await;

    board.display_text("ok").await.unwrap();
    assert_eq!(sim.displayed_text().as_deref(), Some("ok"));
}
