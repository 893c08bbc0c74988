//! Network Sink
//!
//! Fire-and-forget UDP datagrams to one resolved peer.

use super::{protocol::NETWORK_PORT, TransportError, TransportSink};
use crate::domain::models::TransportKind;
use async_trait::async_trait;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::{lookup_host, UdpSocket};
use tracing::{debug, info, trace};

pub struct NetworkSink {
    socket: UdpSocket,
    destination: SocketAddr,
}

impl NetworkSink {
    /// Resolve `host` on the default port and open a socket
    pub async fn connect(host: &str) -> Result<Self, TransportError> {
        Self::connect_with_port(host, NETWORK_PORT).await
    }

    /// Resolve `host:port` once and bind an ephemeral local socket.
    /// Resolution failures map to [`TransportError::InvalidAddress`].
    pub async fn connect_with_port(host: &str, port: u16) -> Result<Self, TransportError> {
        let host = host.trim();
        if host.is_empty() {
            return Err(TransportError::InvalidAddress("empty destination".to_string()));
        }

        let destination = lookup_host((host, port))
            .await
            .map_err(|e| TransportError::InvalidAddress(format!("{}: {}", host, e)))?
            .next()
            .ok_or_else(|| TransportError::InvalidAddress(host.to_string()))?;

        let bind_addr = if destination.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| TransportError::SendFailed(format!("bind {}: {}", bind_addr, e)))?;

        info!("Sending pointer datagrams to {}", destination);
        Ok(Self {
            socket,
            destination,
        })
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }
}

#[async_trait]
impl TransportSink for NetworkSink {
    fn kind(&self) -> TransportKind {
        TransportKind::Network
    }

    async fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        match self.socket.send_to(payload, self.destination).await {
            Ok(_) => {
                trace!("Sent {} bytes to {}", payload.len(), self.destination);
                Ok(())
            }
            Err(e) => {
                debug!("Datagram to {} dropped: {}", self.destination, e);
                Err(TransportError::SendFailed(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_sends_datagram_to_peer() -> anyhow::Result<()> {
        let receiver = UdpSocket::bind("127.0.0.1:0").await?;
        let port = receiver.local_addr()?.port();

        let sink = NetworkSink::connect_with_port("127.0.0.1", port).await?;
        assert_eq!(sink.kind(), TransportKind::Network);
        sink.send(b"MOVE:3,-4").await?;

        let mut buf = [0u8; 64];
        let (len, _) = timeout(Duration::from_secs(1), receiver.recv_from(&mut buf)).await??;
        assert_eq!(&buf[..len], b"MOVE:3,-4");
        Ok(())
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_invalid_address() {
        let result = NetworkSink::connect("no such host.invalid").await;
        assert!(matches!(result, Err(TransportError::InvalidAddress(_))));

        let result = NetworkSink::connect("   ").await;
        assert!(matches!(result, Err(TransportError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn test_default_port() -> anyhow::Result<()> {
        let sink = NetworkSink::connect("127.0.0.1").await?;
        assert_eq!(sink.destination().port(), NETWORK_PORT);
        Ok(())
    }
}
