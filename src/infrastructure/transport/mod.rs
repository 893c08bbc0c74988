//! Transport Module
//!
//! Delivers encoded pointer reports to the host computer.
//!
//! ## Architecture
//!
//! ```text
//!  Session ──► Dispatcher ──► TransportSink
//!              (1 writer)      ├── NetworkSink  (UDP text datagrams)
//!                              └── HidSink      (HID reports via HidReportChannel)
//!                                                  └── HidBridgeClient (local socket)
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Wire formats, report descriptor and encoder
//! - [`network`] - Datagram sink to a fixed peer
//! - [`hid`] - HID report sink and the report-channel seam
//! - [`bridge`] - Local-socket client for the platform HID helper
//! - [`dispatch`] - Ordered, non-blocking hand-off from producers to a sink

pub mod bridge;
pub mod dispatch;
pub mod hid;
pub mod network;
pub mod protocol;

use crate::domain::models::TransportKind;
use async_trait::async_trait;
use thiserror::Error;

pub use dispatch::{Delivery, Dispatcher};
pub use hid::{HidLinkEvent, HidReportChannel, HidSink};
pub use network::NetworkSink;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Destination could not be resolved. Surfaces to the user.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// No host bound yet. Dropped silently.
    #[error("Not connected")]
    NotConnected,

    /// One send failed. Dropped, not retried.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// The platform HID helper could not be reached or refused a request
    #[error("HID bridge error: {0}")]
    Bridge(String),
}

/// Something that can push one encoded report to the host
#[async_trait]
pub trait TransportSink: Send + Sync + 'static {
    fn kind(&self) -> TransportKind;

    async fn send(&self, payload: &[u8]) -> Result<(), TransportError>;
}
