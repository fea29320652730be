// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for link implementations

/// Result type alias using LinkError
pub type LinkResult<T> = std::result::Result<T, LinkError>;

/// Errors reported by a wireless link
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Operation needs an established connection
    #[error("Link not connected")]
    NotConnected,

    /// No discovered peripheral carries the requested id
    #[error("Peripheral not found: {0}")]
    PeripheralNotFound(String),

    /// Discovery could not be started
    #[error("Discovery failed: {0}")]
    Discovery(String),

    /// The write was refused (unknown service or characteristic, radio error)
    #[error("Write rejected: {0}")]
    WriteRejected(String),

    /// Payload framing could not be undone
    #[error("Base64 framing error: {0}")]
    Framing(#[from] base64::DecodeError),

    /// The link went away while an operation was pending
    #[error("Link closed: {0}")]
    Closed(String),
}

impl LinkError {
    /// Errors after which a reconnect is the only way forward
    pub fn is_link_loss(&self) -> bool {
        matches!(self, LinkError::NotConnected | LinkError::Closed(_))
    }
}
