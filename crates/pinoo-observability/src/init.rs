// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Console logging initialization

use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::CrateDebugFlags;

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow!("unknown log format '{}'", other)),
        }
    }
}

/// Build the filter for the given flags
///
/// `RUST_LOG` wins when set; otherwise the debug flags are layered on top of
/// `default_level`.
pub fn build_env_filter(debug_flags: &CrateDebugFlags, default_level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directive = debug_flags.to_filter_string(default_level);
    EnvFilter::try_new(&directive).with_context(|| format!("Invalid log filter '{}'", directive))
}

/// Install the global console subscriber
///
/// # Errors
///
/// Fails if the filter is invalid or a global subscriber is already installed.
pub fn try_init_logging(
    debug_flags: &CrateDebugFlags,
    default_level: &str,
    format: LogFormat,
) -> Result<()> {
    let env_filter = build_env_filter(debug_flags, default_level)?;

    let console_layer = match format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_filter(env_filter)
            .boxed(),
    };

    Registry::default()
        .with(console_layer)
        .try_init()
        .context("Failed to install global tracing subscriber")?;

    tracing::debug!(
        "Logging initialized (format: {:?}, debug crates: {:?})",
        format,
        debug_flags.enabled_crates
    );
    Ok(())
}

/// Initialize logging from the process arguments and `PINOO_DEBUG`
pub fn init_logging_default(default_level: &str, format: LogFormat) -> Result<()> {
    let flags = crate::cli::parse_debug_flags();
    try_init_logging(&flags, default_level, format)
}
