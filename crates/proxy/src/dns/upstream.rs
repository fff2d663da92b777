use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::Message;
use hickory_resolver::system_conf::read_system_conf;
use mesh_dns_domain::DomainError;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Maximum UDP DNS response size with EDNS(0)
const MAX_UDP_RESPONSE_SIZE: usize = 4096;

/// Forwards one query to an external resolver.
///
/// The production implementation is [`UdpUpstream`]; tests inject their own.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn forward(&self, query: &Message) -> Result<Message, DomainError>;
}

/// Plain DNS-over-UDP upstream client with a per-query timeout.
pub struct UdpUpstream {
    server: SocketAddr,
    timeout: Duration,
}

impl UdpUpstream {
    pub fn new(server: SocketAddr, timeout: Duration) -> Self {
        Self { server, timeout }
    }

    /// Discovers the first nameserver from the host resolver configuration
    /// (`/etc/resolv.conf`). Fails fast when none is configured.
    pub fn from_system_conf(timeout: Duration) -> Result<Self, DomainError> {
        let (config, _opts) = read_system_conf().map_err(|e| {
            DomainError::Upstream(format!("failed to read system resolver configuration: {e}"))
        })?;

        let server = config
            .name_servers()
            .first()
            .map(|ns| ns.socket_addr)
            .ok_or(DomainError::NoUpstream)?;

        debug!(server = %server, "Discovered upstream resolver");
        Ok(Self::new(server, timeout))
    }
}

#[async_trait]
impl Upstream for UdpUpstream {
    async fn forward(&self, query: &Message) -> Result<Message, DomainError> {
        let request = query.to_vec().map_err(|e| DomainError::Proto(e.to_string()))?;

        // Bind to ephemeral port (0 = OS assigns)
        let bind_addr = if self.server.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| DomainError::Upstream(format!("failed to bind upstream socket: {e}")))?;

        socket.send_to(&request, self.server).await.map_err(|e| {
            DomainError::Upstream(format!("failed to send query to {}: {e}", self.server))
        })?;

        let mut recv_buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
        let (len, from) = tokio::time::timeout(self.timeout, socket.recv_from(&mut recv_buf))
            .await
            .map_err(|_| DomainError::UpstreamTimeout)?
            .map_err(|e| {
                DomainError::Upstream(format!(
                    "failed to receive response from {}: {e}",
                    self.server
                ))
            })?;

        if from.ip() != self.server.ip() {
            warn!(
                expected = %self.server,
                received_from = %from,
                "Upstream response from unexpected source"
            );
        }

        Message::from_vec(&recv_buf[..len]).map_err(|e| DomainError::Proto(e.to_string()))
    }
}
