// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Command-line driver for a simulated pinoo board.
//!
//! Loads `pinoo_configuration.toml` (or defaults), connects a session to an
//! in-process simulated board and runs one command against it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use pinoo::config::{load_config_or_default, validate_config, PeripheralKind};
use pinoo::observability::{debug_flags_help, try_init_logging, CrateDebugFlags, LogFormat};
use pinoo::peripheral::{
    Board, PinLevel, PinMode, ProgramGraph, SessionEvent, UploadMode,
};

/// Drive a simulated pinoo board from the command line
#[derive(Parser, Debug)]
#[command(name = "pinoo-sim", version, long_about = None, after_help = debug_flags_help())]
struct Args {
    /// Path to pinoo_configuration.toml (searched for when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration override, e.g. `--set watchdog_interval_ms=3000`
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// Enable debug logging for a crate (repeatable, `all` for every crate)
    #[arg(long = "debug", value_name = "CRATE")]
    debug_crates: Vec<String>,

    /// Log format: text or json (defaults to logging.format)
    #[arg(long)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Set a digital pin LOW/HIGH
    Write { pin: u8, level: String },
    /// Set a pin mode (INPUT, OUTPUT, INPUT_PULLUP)
    Mode { pin: u8, mode: String },
    /// Read a pin and compare it with the expected level
    Read { pin: u8, level: String },
    /// Show text on the display
    Text { text: String },
    /// Show a 5x5 LED bitmap, one byte per row
    Matrix {
        #[arg(num_args = 5, value_parser = parse_byte)]
        rows: Vec<u8>,
    },
    /// Print telemetry snapshots for a number of seconds
    Watch {
        #[arg(default_value_t = 5)]
        seconds: u64,
    },
    /// Upload a program graph (JSON object of blocks keyed by id)
    Upload {
        /// dev or run
        mode: String,
        graph: PathBuf,
        /// Block to start from (defaults to the first script)
        #[arg(long)]
        entry: Option<String>,
    },
}

fn parse_byte(value: &str) -> std::result::Result<u8, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0b")) {
        Some(digits) if value.starts_with("0x") => u8::from_str_radix(digits, 16),
        Some(digits) => u8::from_str_radix(digits, 2),
        None => value.parse::<u8>(),
    };
    parsed.map_err(|e| format!("'{}' is not a byte: {}", value, e))
}

fn parse_overrides(overrides: &[String]) -> Result<HashMap<String, String>> {
    overrides
        .iter()
        .map(|entry| {
            entry
                .split_once('=')
                .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
                .ok_or_else(|| anyhow!("override '{}' is not KEY=VALUE", entry))
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let overrides = parse_overrides(&args.overrides)?;
    let mut config = load_config_or_default(args.config.as_deref(), Some(&overrides))
        .context("Failed to load configuration")?;
    config.peripheral.kind = PeripheralKind::Simulator;
    validate_config(&config)?;

    let mut debug_flags =
        CrateDebugFlags::from_args(args.debug_crates.iter().map(|c| format!("--debug-{}", c)));
    if let Ok(value) = std::env::var("PINOO_DEBUG") {
        debug_flags.merge_env_value(&value);
    }
    let log_format: LogFormat = args
        .log_format
        .as_deref()
        .unwrap_or(&config.logging.format)
        .parse()?;
    try_init_logging(&debug_flags, &config.logging.level, log_format)?;

    let board = Board::from_config(&config, None).context("Failed to wire simulated board")?;
    let mut events = board.subscribe();
    let peripheral = board
        .connect_first()
        .await
        .context("Failed to connect to simulated board")?;
    wait_connected(&mut events).await?;
    info!("Connected to {} ({})", peripheral.name, board.extension_id());

    let outcome = run(&board, &mut events, args.command).await;
    board.disconnect().await;
    outcome
}

async fn wait_connected(
    events: &mut tokio::sync::broadcast::Receiver<SessionEvent>,
) -> Result<()> {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Connected(_)) => return Ok(()),
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => bail!("session closed before connecting"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .context("Timed out waiting for the connect callback")?
}

async fn run(
    board: &Board,
    events: &mut tokio::sync::broadcast::Receiver<SessionEvent>,
    command: Cmd,
) -> Result<()> {
    match command {
        Cmd::Write { pin, level } => {
            board.digital_write(pin, level.parse::<PinLevel>()?).await?;
            println!("pin {} <- {}", pin, level);
        }
        Cmd::Mode { pin, mode } => {
            board.set_pin_mode(pin, mode.parse::<PinMode>()?).await?;
            println!("pin {} mode {}", pin, mode);
        }
        Cmd::Read { pin, level } => {
            let matches = board.digital_read(pin, level.parse::<PinLevel>()?).await?;
            println!("{}", matches);
        }
        Cmd::Text { text } => {
            board.display_text(&text).await?;
            println!("displayed {:?}", text);
        }
        Cmd::Matrix { rows } => {
            let bitmap: [u8; 5] = rows
                .as_slice()
                .try_into()
                .context("matrix needs exactly 5 rows")?;
            board.display_matrix(bitmap).await?;
            println!("matrix {:02x?}", board.led_matrix());
        }
        Cmd::Watch { seconds } => watch(events, Duration::from_secs(seconds)).await?,
        Cmd::Upload { mode, graph, entry } => {
            let mode: UploadMode = mode.parse()?;
            let json = std::fs::read_to_string(&graph)
                .with_context(|| format!("Failed to read {}", graph.display()))?;
            let program = ProgramGraph::from_json(&json)?;
            debug!("Uploading {} blocks", program.len());
            let ack = board.upload_program(mode, &program, entry.as_deref()).await?;
            println!("uploaded ({} mode, ack {:?})", mode, String::from_utf8_lossy(&ack));
        }
    }
    Ok(())
}

async fn watch(
    events: &mut tokio::sync::broadcast::Receiver<SessionEvent>,
    duration: Duration,
) -> Result<()> {
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => return Ok(()),
            _ = tokio::signal::ctrl_c() => return Ok(()),
            event = events.recv() => match event {
                Ok(SessionEvent::Telemetry(snapshot)) => {
                    println!("{}", serde_json::to_string(&snapshot)?);
                }
                Ok(SessionEvent::LinkLost(reason)) => bail!("link lost: {:?}", reason),
                Ok(SessionEvent::Connected(_)) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}
