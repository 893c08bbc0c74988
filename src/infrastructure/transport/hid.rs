//! HID Sink
//!
//! Sends input reports to a bound Bluetooth host through a [`HidReportChannel`].

use super::protocol::{SdpSettings, HID_REPORT_ID};
use super::{TransportError, TransportSink};
use crate::domain::models::TransportKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

/// Host connection changes reported by the platform HID stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HidLinkEvent {
    HostConnected(String),
    HostDisconnected(String),
}

/// Platform HID device profile, as seen by this app.
///
/// Registration hands back the stream of host connection events.
#[async_trait]
pub trait HidReportChannel: Send + Sync + 'static {
    async fn register_app(
        &self,
        sdp: &SdpSettings,
    ) -> Result<mpsc::UnboundedReceiver<HidLinkEvent>, TransportError>;

    async fn send_report(&self, host: &str, report_id: u8, data: &[u8])
        -> Result<(), TransportError>;
}

pub struct HidSink {
    channel: Arc<dyn HidReportChannel>,
    host: watch::Sender<Option<String>>,
}

impl HidSink {
    /// A sink with no host bound yet
    pub fn new(channel: Arc<dyn HidReportChannel>) -> Self {
        let (host, _) = watch::channel(None);
        Self { channel, host }
    }

    /// Register the HID application and wait for a host to connect.
    ///
    /// Returns the bound sink together with the remaining link events.
    pub async fn establish(
        channel: Arc<dyn HidReportChannel>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<HidLinkEvent>), TransportError> {
        let sdp = SdpSettings::default();
        info!("Registering HID application '{}'", sdp.name);
        let mut events = channel.register_app(&sdp).await?;
        let sink = Self::new(channel);

        loop {
            match events.recv().await {
                Some(HidLinkEvent::HostConnected(address)) => {
                    sink.bind_host(address);
                    return Ok((sink, events));
                }
                Some(HidLinkEvent::HostDisconnected(address)) => {
                    debug!("Host {} disconnected before binding", address);
                }
                None => {
                    return Err(TransportError::Bridge(
                        "link closed before a host connected".to_string(),
                    ))
                }
            }
        }
    }

    pub fn bind_host(&self, address: String) {
        info!("HID host bound: {}", address);
        self.host.send_replace(Some(address));
    }

    pub fn unbind_host(&self) -> Option<String> {
        let previous = self.host.send_replace(None);
        if let Some(address) = &previous {
            warn!("HID host lost: {}", address);
        }
        previous
    }

    pub fn host(&self) -> Option<String> {
        self.host.borrow().clone()
    }
}

#[async_trait]
impl TransportSink for HidSink {
    fn kind(&self) -> TransportKind {
        TransportKind::Hid
    }

    async fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        let Some(host) = self.host() else {
            return Err(TransportError::NotConnected);
        };
        trace!("HID report to {}: {:02X?}", host, payload);
        self.channel
            .send_report(&host, HID_REPORT_ID, payload)
            .await
    }
}

/// In-memory channel for tests
#[cfg(test)]
pub mod fake {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub struct FakeHidChannel {
        pub registrations: Mutex<Vec<SdpSettings>>,
        pub reports: Mutex<Vec<(String, u8, Vec<u8>)>>,
        events: Mutex<Option<mpsc::UnboundedSender<HidLinkEvent>>>,
        paused: watch::Sender<bool>,
        rejecting: AtomicBool,
        attempts: AtomicUsize,
    }

    impl FakeHidChannel {
        pub fn new() -> Arc<Self> {
            let (paused, _) = watch::channel(false);
            Arc::new(Self {
                registrations: Mutex::new(Vec::new()),
                reports: Mutex::new(Vec::new()),
                events: Mutex::new(None),
                paused,
                rejecting: AtomicBool::new(false),
                attempts: AtomicUsize::new(0),
            })
        }

        pub fn emit(&self, event: HidLinkEvent) {
            if let Some(tx) = self.events.lock().unwrap().as_ref() {
                let _ = tx.send(event);
            }
        }

        pub fn is_registered(&self) -> bool {
            self.events.lock().unwrap().is_some()
        }

        /// Hold every send until [`resume`](Self::resume)
        pub fn pause(&self) {
            self.paused.send_replace(true);
        }

        pub fn resume(&self) {
            self.paused.send_replace(false);
        }

        /// Answer sends with `NotConnected`, as the stack does for an unbound host
        pub fn set_rejecting(&self, rejecting: bool) {
            self.rejecting.store(rejecting, Ordering::SeqCst);
        }

        /// Sends seen so far, accepted or not
        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        pub fn reports(&self) -> Vec<Vec<u8>> {
            self.reports
                .lock()
                .unwrap()
                .iter()
                .map(|(_, _, data)| data.clone())
                .collect()
        }
    }

    #[async_trait]
    impl HidReportChannel for FakeHidChannel {
        async fn register_app(
            &self,
            sdp: &SdpSettings,
        ) -> Result<mpsc::UnboundedReceiver<HidLinkEvent>, TransportError> {
            self.registrations.lock().unwrap().push(sdp.clone());
            let (tx, rx) = mpsc::unbounded_channel();
            *self.events.lock().unwrap() = Some(tx);
            Ok(rx)
        }

        async fn send_report(
            &self,
            host: &str,
            report_id: u8,
            data: &[u8],
        ) -> Result<(), TransportError> {
            let mut paused = self.paused.subscribe();
            let _ = paused.wait_for(|p| !*p).await;

            let rejected = self.rejecting.load(Ordering::SeqCst);
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if rejected {
                return Err(TransportError::NotConnected);
            }
            self.reports
                .lock()
                .unwrap()
                .push((host.to_string(), report_id, data.to_vec()));
            Ok(())
        }
    }
}
