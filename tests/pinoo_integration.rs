// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end: configuration file -> simulated board -> session

use std::fs;
use std::time::Duration;

use pinoo::config::{load_config, validate_config};
use pinoo::prelude::*;
use tempfile::TempDir;
use tokio::sync::broadcast::error::RecvError;

const CONFIG: &str = r#"
[peripheral]
kind = "simulator"
name_prefix = "w"

[link]
encoding = "base64"

[timing]
watchdog_interval_ms = 1000
busy_grace_period_ms = 2000

[simulator]
peripheral_name = "wPinoo-bench"
telemetry_interval_ms = 50
"#;

fn board_from_file() -> Board {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pinoo_configuration.toml");
    fs::write(&path, CONFIG).unwrap();

    let config = load_config(Some(&path), None).unwrap();
    validate_config(&config).unwrap();
    assert_eq!(config.peripheral.kind, PeripheralKind::Simulator);
    Board::from_config(&config, None).unwrap()
}

async fn next_matching<F>(
    events: &mut tokio::sync::broadcast::Receiver<SessionEvent>,
    predicate: F,
) -> SessionEvent
where
    F: Fn(&SessionEvent) -> bool,
{
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event stream closed"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(30), wait)
        .await
        .expect("event did not arrive")
}

#[tokio::test(start_paused = true)]
async fn test_configured_timings_drive_session() {
    let board = board_from_file();
    assert_eq!(board.extension_id(), "pinoosimulator");
    let sim = board.simulator().cloned().unwrap();
    let mut events = board.subscribe();

    let found = board.connect_first().await.unwrap();
    assert_eq!(found.name, "wPinoo-bench");
    next_matching(&mut events, |e| matches!(e, SessionEvent::Connected(_))).await;

    // Configured grace period, not the default
    sim.set_unresponsive(true);
    match board.display_text("slow").await {
        Err(SessionError::AckTimeout(grace)) => assert_eq!(grace, Duration::from_millis(2000)),
        other => panic!("expected ack timeout, got {:?}", other),
    }
    sim.set_unresponsive(false);

    // Configured watchdog interval
    sim.pause_telemetry(true);
    let silenced = tokio::time::Instant::now();
    let lost = next_matching(&mut events, |e| matches!(e, SessionEvent::LinkLost(_))).await;
    assert_eq!(lost, SessionEvent::LinkLost(LinkLossReason::Stale));
    assert!(silenced.elapsed() <= Duration::from_millis(1000));
    assert!(!board.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_typed_accessors_follow_board() {
    let board = board_from_file();
    let sim = board.simulator().cloned().unwrap();
    let mut events = board.subscribe();

    sim.set_tilt(-250, 90);
    sim.set_buttons(0, 1);
    sim.set_gesture_state(0b110);
    board.connect_first().await.unwrap();
    next_matching(&mut events, |e| matches!(e, SessionEvent::Telemetry(_))).await;

    assert_eq!(board.tilt_angle(TiltDirection::Left), 25);
    assert!(board.is_tilted(TiltDirection::Left));
    assert!(!board.is_tilted(TiltDirection::Back));
    assert!(board.is_pressed(Button::B));
    assert!(!board.is_pressed(Button::A));
    assert!(board.gesture(Gesture::Shaken));
    assert!(board.gesture(Gesture::Jumped));
    assert!(!board.gesture(Gesture::Moved));

    board.disconnect().await;
    assert_eq!(board.snapshot(), SensorSnapshot::default());
}

#[test]
fn test_board_kind_requires_connector() {
    let config = PinooConfig::default();
    assert!(matches!(
        Board::from_config(&config, None),
        Err(SessionError::InvalidArgument(_))
    ));
}
