//! HID Bridge Client
//!
//! Talks to the platform HID helper, the process that owns the Bluetooth
//! HID Device profile, over a local socket. One JSON message per line.

use super::hid::{HidLinkEvent, HidReportChannel};
use super::protocol::SdpSettings;
use super::TransportError;
use async_trait::async_trait;
use interprocess::local_socket::{
    traits::Stream, GenericNamespaced, Stream as LocalStream, ToNsName,
};
use interprocess::TryClone;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Socket name the helper listens on unless configured otherwise
pub const DEFAULT_BRIDGE_NAME: &str = "hybrid_mouse_hid_bridge";

const REGISTER_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum BridgeCommand {
    RegisterApp(SdpSettings),
    SendReport {
        host: String,
        report_id: u8,
        data: Vec<u8>,
    },
    Unregister,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum BridgeMessage {
    Registered,
    Error(String),
    Link(HidLinkEvent),
}

/// State shared with the reader thread
#[derive(Default)]
struct Shared {
    pending_registration: Mutex<Option<oneshot::Sender<Result<(), String>>>>,
    link: Mutex<Option<mpsc::UnboundedSender<HidLinkEvent>>>,
}

impl Shared {
    fn route(&self, message: BridgeMessage) {
        match message {
            BridgeMessage::Registered => self.resolve_registration(Ok(())),
            BridgeMessage::Error(e) => {
                warn!("HID bridge reported: {}", e);
                self.resolve_registration(Err(e));
            }
            BridgeMessage::Link(event) => {
                debug!("HID link event: {:?}", event);
                if let Ok(link) = self.link.lock() {
                    if let Some(tx) = link.as_ref() {
                        let _ = tx.send(event);
                    }
                }
            }
        }
    }

    fn resolve_registration(&self, result: Result<(), String>) {
        let pending = self
            .pending_registration
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(tx) = pending {
            let _ = tx.send(result);
        }
    }

    /// Closes the link stream; the session reads that as host loss
    fn close(&self) {
        if let Ok(mut link) = self.link.lock() {
            link.take();
        }
        self.resolve_registration(Err("bridge closed".to_string()));
    }
}

pub struct HidBridgeClient {
    writer: Arc<Mutex<LocalStream>>,
    shared: Arc<Shared>,
}

impl HidBridgeClient {
    /// Connect to the helper and start the reader thread
    pub async fn connect(name: &str) -> Result<Self, TransportError> {
        let name = name.to_string();
        let stream = tokio::task::spawn_blocking(move || -> std::io::Result<LocalStream> {
            let socket_name = name.as_str().to_ns_name::<GenericNamespaced>()?;
            LocalStream::connect(socket_name)
        })
        .await
        .map_err(|e| TransportError::Bridge(e.to_string()))?
        .map_err(|e| TransportError::Bridge(format!("HID helper not reachable: {}", e)))?;

        let reader = stream
            .try_clone()
            .map_err(|e| TransportError::Bridge(e.to_string()))?;

        let shared = Arc::new(Shared::default());
        let reader_shared = shared.clone();
        std::thread::Builder::new()
            .name("hid-bridge-reader".to_string())
            .spawn(move || read_loop(reader, reader_shared))
            .map_err(|e| TransportError::Bridge(e.to_string()))?;

        info!("Connected to HID helper");
        Ok(Self {
            writer: Arc::new(Mutex::new(stream)),
            shared,
        })
    }

    async fn write_command(&self, cmd: BridgeCommand) -> Result<(), TransportError> {
        let line = encode_line(&cmd)?;
        let writer = self.writer.clone();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut stream = writer
                .lock()
                .map_err(|_| std::io::Error::other("bridge writer poisoned"))?;
            stream.write_all(line.as_bytes())?;
            stream.flush()
        })
        .await
        .map_err(|e| TransportError::SendFailed(e.to_string()))?
        .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

#[async_trait]
impl HidReportChannel for HidBridgeClient {
    async fn register_app(
        &self,
        sdp: &SdpSettings,
    ) -> Result<mpsc::UnboundedReceiver<HidLinkEvent>, TransportError> {
        let (done_tx, done_rx) = oneshot::channel();
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        if let Ok(mut slot) = self.shared.pending_registration.lock() {
            *slot = Some(done_tx);
        }
        if let Ok(mut link) = self.shared.link.lock() {
            *link = Some(link_tx);
        }

        self.write_command(BridgeCommand::RegisterApp(sdp.clone()))
            .await
            .map_err(|e| TransportError::Bridge(e.to_string()))?;

        match tokio::time::timeout(REGISTER_TIMEOUT, done_rx).await {
            Ok(Ok(Ok(()))) => {
                info!("HID application registered");
                Ok(link_rx)
            }
            Ok(Ok(Err(e))) => Err(TransportError::Bridge(e)),
            Ok(Err(_)) => Err(TransportError::Bridge("bridge closed".to_string())),
            Err(_) => Err(TransportError::Bridge(
                "timed out waiting for registration".to_string(),
            )),
        }
    }

    async fn send_report(
        &self,
        host: &str,
        report_id: u8,
        data: &[u8],
    ) -> Result<(), TransportError> {
        self.write_command(BridgeCommand::SendReport {
            host: host.to_string(),
            report_id,
            data: data.to_vec(),
        })
        .await
    }
}

impl Drop for HidBridgeClient {
    fn drop(&mut self) {
        // Best effort; the helper also cleans up when the socket closes
        let Ok(line) = encode_line(&BridgeCommand::Unregister) else {
            return;
        };
        let writer = self.writer.clone();
        let unregister = move || {
            if let Ok(mut stream) = writer.lock() {
                let _ = stream.write_all(line.as_bytes());
                let _ = stream.flush();
            }
        };

        // The socket write blocks; keep it off runtime worker threads
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(unregister);
            }
            Err(_) => unregister(),
        }
    }
}

fn encode_line(cmd: &BridgeCommand) -> Result<String, TransportError> {
    serde_json::to_string(cmd)
        .map(|json| json + "\n")
        .map_err(|e| TransportError::Bridge(e.to_string()))
}

fn read_loop(stream: LocalStream, shared: Arc<Shared>) {
    let mut reader = BufReader::new(stream);
    let mut buffer = String::new();

    loop {
        buffer.clear();
        match reader.read_line(&mut buffer) {
            Ok(0) => break, // EOF
            Ok(_) => match serde_json::from_str::<BridgeMessage>(&buffer) {
                Ok(message) => shared.route(message),
                Err(e) => warn!("Ignoring bridge line {:?}: {}", buffer.trim_end(), e),
            },
            Err(e) => {
                error!("Bridge read error: {}", e);
                break;
            }
        }
    }

    info!("HID helper closed the connection");
    shared.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use interprocess::local_socket::{traits::Listener as _, ListenerOptions};

    #[test]
    fn test_command_is_one_json_line() {
        let line = encode_line(&BridgeCommand::SendReport {
            host: "AA:BB".to_string(),
            report_id: 0,
            data: vec![1, 0xFE, 3],
        })
        .unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        let back: BridgeCommand = serde_json::from_str(line.trim_end()).unwrap();
        assert!(matches!(back, BridgeCommand::SendReport { report_id: 0, .. }));
    }

    #[tokio::test]
    async fn test_route_resolves_registration_and_forwards_links() {
        let shared = Shared::default();
        let (done_tx, done_rx) = oneshot::channel();
        let (link_tx, mut link_rx) = mpsc::unbounded_channel();
        *shared.pending_registration.lock().unwrap() = Some(done_tx);
        *shared.link.lock().unwrap() = Some(link_tx);

        shared.route(BridgeMessage::Registered);
        assert_eq!(done_rx.await.unwrap(), Ok(()));

        let event = HidLinkEvent::HostConnected("host".to_string());
        shared.route(BridgeMessage::Link(event.clone()));
        assert_eq!(link_rx.recv().await, Some(event));

        shared.close();
        assert_eq!(link_rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_drop_unregisters_with_helper() -> anyhow::Result<()> {
        let name = format!("hybrid_mouse_bridge_test_{}", std::process::id());
        let listener = ListenerOptions::new()
            .name(name.as_str().to_ns_name::<GenericNamespaced>()?)
            .create_sync()?;
        let helper = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
            let stream = listener.accept()?;
            let mut line = String::new();
            BufReader::new(stream).read_line(&mut line)?;
            Ok(line)
        });

        let client = HidBridgeClient::connect(&name).await?;
        drop(client);

        let line = tokio::time::timeout(Duration::from_secs(2), helper).await???;
        let command: BridgeCommand = serde_json::from_str(line.trim_end())?;
        assert_eq!(command, BridgeCommand::Unregister);
        Ok(())
    }

    #[tokio::test]
    async fn test_route_reports_registration_error() {
        let shared = Shared::default();
        let (done_tx, done_rx) = oneshot::channel();
        *shared.pending_registration.lock().unwrap() = Some(done_tx);

        let json = r#"{"Error":"profile unavailable"}"#;
        shared.route(serde_json::from_str(json).unwrap());
        assert_eq!(done_rx.await.unwrap(), Err("profile unavailable".to_string()));
    }
}
