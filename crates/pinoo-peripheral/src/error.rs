// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for the peripheral session

use std::time::Duration;

use pinoo_link::LinkError;

use crate::telemetry::DecodeError;

/// Result type alias using SessionError
pub type Result<T> = std::result::Result<T, SessionError>;

/// Error types for a peripheral session
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Command issued with no active link; the command was dropped
    #[error("Peripheral not connected")]
    NotConnected,

    /// Another command is still in flight; the command was dropped
    #[error("Peripheral busy - another command is in flight")]
    Busy,

    /// The peripheral never acknowledged the command
    #[error("No acknowledgment within {0:?}")]
    AckTimeout(Duration),

    /// Telemetry stopped arriving and the watchdog tore the link down while
    /// the command waited for its acknowledgment
    #[error("Link stale - no telemetry within the watchdog interval")]
    LinkStale,

    /// Malformed telemetry frame
    ///
    /// The session itself logs and discards bad frames; this is the
    /// conversion for callers decoding frames with [`TelemetryFrame::decode`].
    ///
    /// [`TelemetryFrame::decode`]: crate::telemetry::TelemetryFrame::decode
    #[error("Telemetry decode error: {0}")]
    Decode(#[from] DecodeError),

    /// `connect()` before any `scan()`
    #[error("No peripheral handle - call scan() first")]
    NoPeripheral,

    /// Command argument out of range or not parseable
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Program graph failed validation
    #[error("Invalid program: {0}")]
    InvalidProgram(String),

    /// Transport failure
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The command task ended without reporting a result
    #[error("Command abandoned")]
    Abandoned,
}

impl SessionError {
    /// Best-effort rejections: the command never reached the link
    pub fn is_dropped(&self) -> bool {
        matches!(self, SessionError::NotConnected | SessionError::Busy)
    }

    /// Check if the same command may simply be issued again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::Busy | SessionError::AckTimeout(_) | SessionError::Abandoned
        )
    }
}
