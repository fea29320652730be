// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Link capability traits
//!
//! A [`LinkConnector`] starts discovery and hands back a [`PeripheralLink`]
//! handle. Connection callbacks and inbound notifications arrive in order on
//! the [`LinkEvent`] channel passed to [`LinkConnector::open`]; the handle
//! itself only carries the request/response operations.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pinoo_link::{link_event_channel, DiscoveryFilter, GattProfile, LinkConnector, LinkEvent};
//! # async fn demo(connector: &dyn LinkConnector) -> pinoo_link::LinkResult<()> {
//! let (tx, mut rx) = link_event_channel();
//! let link = connector.open(&DiscoveryFilter::new("w"), &GattProfile::default(), tx)?;
//!
//! if let Some(first) = link.discovered().first() {
//!     link.connect(&first.id).await?;
//! }
//! while let Some(event) = rx.recv().await {
//!     if let LinkEvent::Notification(frame) = event {
//!         // decode telemetry
//!         let _ = frame;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::LinkResult;
use crate::gatt::{Encoding, GattProfile};

/// Identifier the transport assigns to a discovered peripheral
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeripheralId(String);

impl PeripheralId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeripheralId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PeripheralId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A peripheral seen during discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralInfo {
    pub id: PeripheralId,
    pub name: String,
    pub rssi: Option<i16>,
}

/// Discovery filter (advertised name prefix)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryFilter {
    pub name_prefix: String,
}

impl DiscoveryFilter {
    pub fn new(name_prefix: impl Into<String>) -> Self {
        Self {
            name_prefix: name_prefix.into(),
        }
    }

    pub fn matches(&self, advertised_name: &str) -> bool {
        advertised_name.starts_with(&self.name_prefix)
    }
}

/// Connection status of a link handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// Not connected to any peripheral
    Disconnected,
    /// Discovery running, waiting for `connect()`
    Discovering,
    /// Connected; writes and notifications flow
    Connected,
    /// Link failed and needs a new discovery cycle
    Error,
}

/// Inbound events from the link, delivered in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Connect callback: the peripheral accepted the connection
    Connected { peripheral: PeripheralId },
    /// Raw notification frame from the notify characteristic
    Notification(Vec<u8>),
    /// The peripheral went away (explicitly or detected by the radio stack)
    Disconnected { reason: Option<String> },
}

pub type LinkEventSender = mpsc::UnboundedSender<LinkEvent>;
pub type LinkEventReceiver = mpsc::UnboundedReceiver<LinkEvent>;

/// Create the single-consumer event channel handed to [`LinkConnector::open`]
pub fn link_event_channel() -> (LinkEventSender, LinkEventReceiver) {
    mpsc::unbounded_channel()
}

/// An open link to (at most) one peripheral
///
/// Implementations must be `Send + Sync`; the session shares the handle
/// between its event loop and command tasks.
#[async_trait]
pub trait PeripheralLink: Send + Sync {
    /// Connect to a discovered peripheral
    ///
    /// Success is reported through [`LinkEvent::Connected`].
    async fn connect(&self, id: &PeripheralId) -> LinkResult<()>;

    /// Drop the connection. Disconnecting an idle link is not an error.
    async fn disconnect(&self) -> LinkResult<()>;

    /// Check if the link is currently connected
    fn is_connected(&self) -> bool;

    /// More detail than `is_connected()`
    fn status(&self) -> LinkStatus {
        if self.is_connected() {
            LinkStatus::Connected
        } else {
            LinkStatus::Disconnected
        }
    }

    /// Peripherals discovered so far
    fn discovered(&self) -> Vec<PeripheralInfo>;

    /// Write a payload to a characteristic
    ///
    /// With `with_response` the future resolves with the acknowledgment
    /// payload once the peripheral confirms delivery.
    async fn write(
        &self,
        service_id: u16,
        characteristic: Uuid,
        payload: &[u8],
        encoding: Encoding,
        with_response: bool,
    ) -> LinkResult<Vec<u8>>;
}

/// Starts discovery cycles and produces link handles
pub trait LinkConnector: Send + Sync {
    /// Begin discovery for peripherals matching `filter`
    ///
    /// Connection and notification events for the returned handle are sent
    /// on `events`.
    fn open(
        &self,
        filter: &DiscoveryFilter,
        profile: &GattProfile,
        events: LinkEventSender,
    ) -> LinkResult<Arc<dyn PeripheralLink>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LinkError;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    // Mock link implementation for testing the trait defaults
    struct MockLink {
        connected: AtomicBool,
        sent: Mutex<Vec<Vec<u8>>>,
        events: LinkEventSender,
    }

    #[async_trait]
    impl PeripheralLink for MockLink {
        async fn connect(&self, id: &PeripheralId) -> LinkResult<()> {
            if id.as_str() != "mock-1" {
                return Err(LinkError::PeripheralNotFound(id.to_string()));
            }
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
                id: PeripheralId::new("mock-1"),
                name: "wMock".to_string(),
                rssi: None,
            }]
        }

        async fn write(
            &self,
            _service_id: u16,
            _characteristic: Uuid,
            payload: &[u8],
            encoding: Encoding,
            _with_response: bool,
        ) -> LinkResult<Vec<u8>> {
            if !self.is_connected() {
                return Err(LinkError::NotConnected);
            }
            self.sent.lock().push(encoding.frame(payload));
            Ok(Vec::new())
        }
    }

    fn mock() -> (MockLink, LinkEventReceiver) {
        let (tx, rx) = link_event_channel();
        (
            MockLink {
                connected: AtomicBool::new(false),
                sent: Mutex::new(Vec::new()),
                events: tx,
            },
            rx,
        )
    }

    #[test]
    fn test_discovery_filter_prefix() {
        let filter = DiscoveryFilter::new("w");
        assert!(filter.matches("wPinoo-sim"));
        assert!(!filter.matches("Pinoo"));
    }

    #[tokio::test]
    async fn test_status_follows_connection() {
        let (link, mut rx) = mock();
        assert_eq!(link.status(), LinkStatus::Disconnected);

        link.connect(&PeripheralId::new("mock-1")).await.unwrap();
        assert_eq!(link.status(), LinkStatus::Connected);
        assert_eq!(
            rx.recv().await,
            Some(LinkEvent::Connected {
                peripheral: PeripheralId::new("mock-1")
            })
        );
    }

    #[tokio::test]
    async fn test_connect_unknown_peripheral() {
        let (link, _rx) = mock();
        let result = link.connect(&PeripheralId::new("other")).await;
        assert!(matches!(result, Err(LinkError::PeripheralNotFound(_))));
        assert!(!link.is_connected());
    }

    #[tokio::test]
    async fn test_write_not_connected() {
        let (link, _rx) = mock();
        let result = link
            .write(0xf005, Uuid::nil(), b"x", Encoding::Raw, true)
            .await;
        assert!(matches!(result, Err(LinkError::NotConnected)));
    }
}
