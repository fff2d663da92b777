use std::io::Read;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use arc_swap::ArcSwap;
use prometheus::Registry;
use tokio::net::UdpSocket;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dns::handler::QueryHandler;
use crate::dns::metrics::ServerMetrics;
use crate::dns::table::RecordTable;
use crate::dns::upstream::{UdpUpstream, Upstream};
use mesh_dns_domain::{DnsTable, DomainError};

const MAX_UDP_QUERY_SIZE: usize = 4096;
const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(2);

/// The embedded DNS proxy.
///
/// Owns the published record table (swapped atomically on reload), the
/// upstream client and the readiness/completion signals consumed by the
/// hosting supervisor. Queries are served over UDP from a single serve
/// loop; each datagram is handled on its own task.
pub struct DnsProxy {
    bind_addr: SocketAddr,
    table: Arc<ArcSwap<RecordTable>>,
    upstream: Arc<dyn Upstream>,
    metrics: Arc<ServerMetrics>,
    local_addr: OnceLock<SocketAddr>,
    ready: CancellationToken,
    done: CancellationToken,
}

impl DnsProxy {
    /// Production constructor: upstream discovered from the host resolver
    /// configuration. Fails fast when no nameserver is configured.
    pub fn new(bind_addr: SocketAddr, registry: &Registry) -> Result<Self, DomainError> {
        let upstream = UdpUpstream::from_system_conf(DEFAULT_UPSTREAM_TIMEOUT)?;
        Self::with_upstream(bind_addr, Arc::new(upstream), registry)
    }

    /// Constructor with an injected upstream client.
    pub fn with_upstream(
        bind_addr: SocketAddr,
        upstream: Arc<dyn Upstream>,
        registry: &Registry,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            bind_addr,
            table: Arc::new(ArcSwap::from_pointee(RecordTable::empty())),
            upstream,
            metrics: Arc::new(ServerMetrics::new(registry)?),
            local_addr: OnceLock::new(),
            ready: CancellationToken::new(),
            done: CancellationToken::new(),
        })
    }

    /// The address the listener actually bound to; available once
    /// [`wait_ready`](Self::wait_ready) unblocks.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Binds the listener and serves queries until the stop token fires or
    /// the serve loop dies on its own.
    ///
    /// Fires the ready signal once the listener accepts traffic, and the
    /// done signal when this call returns; by then no concurrent work
    /// remains. A bind failure, or an error carried out of an unplanned
    /// serve-loop exit, is returned to the supervisor.
    pub async fn start(&self, stop: CancellationToken) -> Result<(), DomainError> {
        let result = self.run(stop).await;
        self.done.cancel();
        result
    }

    async fn run(&self, stop: CancellationToken) -> Result<(), DomainError> {
        let socket = UdpSocket::bind(self.bind_addr)
            .await
            .map_err(|e| DomainError::Bind(format!("{}: {e}", self.bind_addr)))?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| DomainError::Io(e.to_string()))?;
        let _ = self.local_addr.set(local_addr);

        let handler = Arc::new(QueryHandler::new(
            self.table.clone(),
            self.upstream.clone(),
            self.metrics.clone(),
        ));
        let drain = CancellationToken::new();
        let mut serve = tokio::spawn(serve_loop(Arc::new(socket), handler, drain.clone()));

        info!(address = %local_addr, "DNS proxy serving");
        self.ready.cancel();

        tokio::select! {
            _ = stop.cancelled() => {
                debug!("Stop requested; draining DNS serve loop");
                drain.cancel();
                let result = flatten((&mut serve).await);
                info!("DNS proxy stopped");
                result
            }
            joined = &mut serve => {
                warn!("DNS serve loop exited on its own; shutdown was never requested");
                flatten(joined)
            }
        }
    }

    /// Unblocks once the listener is serving. One-shot broadcast: safe for
    /// any number of waiters, non-blocking once fired.
    pub async fn wait_ready(&self) {
        self.ready.cancelled().await
    }

    /// Unblocks once [`start`](Self::start) has fully returned.
    pub async fn wait_done(&self) {
        self.done.cancelled().await
    }

    /// Replaces the published record table from a JSON payload.
    ///
    /// All-or-nothing: a decode failure or a cancellation mid-build leaves
    /// the current table untouched. On success the new table is published
    /// with a single atomic store; in-flight queries keep whichever
    /// snapshot they already loaded. Concurrent reloads are not serialized;
    /// the last publish wins.
    pub fn reload_map<R: Read>(
        &self,
        cancel: &CancellationToken,
        reader: R,
    ) -> Result<(), DomainError> {
        let payload: DnsTable = serde_json::from_reader(reader)
            .map_err(|e| DomainError::InvalidPayload(e.to_string()))?;
        let table = RecordTable::from_payload(&payload, cancel)?;

        info!(names = table.len(), ttl = payload.ttl, "Publishing new DNS record table");
        self.table.store(Arc::new(table));
        Ok(())
    }
}

async fn serve_loop(
    socket: Arc<UdpSocket>,
    handler: Arc<QueryHandler>,
    drain: CancellationToken,
) -> Result<(), DomainError> {
    let mut recv_buf = [0u8; MAX_UDP_QUERY_SIZE];
    let mut in_flight: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            _ = drain.cancelled() => {
                // Let queries already being handled finish before reporting
                // the listener as drained.
                while in_flight.join_next().await.is_some() {}
                return Ok(());
            }
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            received = socket.recv_from(&mut recv_buf) => {
                match received {
                    Ok((len, peer)) => {
                        let datagram = recv_buf[..len].to_vec();
                        let handler = handler.clone();
                        let socket = socket.clone();
                        in_flight.spawn(async move {
                            if let Some(response) = handler.handle(&datagram).await {
                                if let Err(e) = socket.send_to(&response, peer).await {
                                    warn!(peer = %peer, error = %e, "Failed to send DNS response");
                                }
                            }
                        });
                    }
                    // Transient by definition on UDP (e.g. ICMP unreachable
                    // surfacing on a connected peer); keep serving.
                    Err(e) => warn!(error = %e, "UDP recv error"),
                }
            }
        }
    }
}

fn flatten(joined: Result<Result<(), DomainError>, JoinError>) -> Result<(), DomainError> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(DomainError::Io(format!("DNS serve loop aborted: {e}"))),
    }
}
