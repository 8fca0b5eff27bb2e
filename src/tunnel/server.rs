// src/tunnel/server.rs

//! The tunnel engine: one accept loop per configured `TunnelStaticServer`,
//! forwarding to its backing nodes by weight (spec.md section 4.H).
//! TCP uses `proxy::tcp::TcpForwarder`; UDP uses `proxy::udp::UdpForwarder`.

use crate::core::GatewayError;
use crate::model::tunnel::{TunnelProtocol, TunnelStaticNode, TunnelStaticServer, TABLE_NODE};
use crate::proxy::{TcpForwarder, UdpForwarder};
use crate::store::{PageRequest, Store, StoreExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

pub struct TunnelServerTask {
    server: TunnelStaticServer,
    store: Arc<dyn Store>,
    tenant_id: String,
    tcp_forwarder: Arc<TcpForwarder>,
    udp_forwarder: Arc<UdpForwarder>,
    round_robin: AtomicU64,
    current_connections: AtomicU64,
    total_bytes_received: AtomicU64,
    total_bytes_sent: AtomicU64,
}

impl TunnelServerTask {
    pub fn new(
        server: TunnelStaticServer,
        store: Arc<dyn Store>,
        tenant_id: impl Into<String>,
        tcp_forwarder: Arc<TcpForwarder>,
        udp_forwarder: Arc<UdpForwarder>,
    ) -> Self {
        Self {
            server,
            store,
            tenant_id: tenant_id.into(),
            tcp_forwarder,
            udp_forwarder,
            round_robin: AtomicU64::new(0),
            current_connections: AtomicU64::new(0),
            total_bytes_received: AtomicU64::new(0),
            total_bytes_sent: AtomicU64::new(0),
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        if !self.server.enabled {
            return;
        }
        let listen_addr = SocketAddr::from(([0, 0, 0, 0], self.server.listen_port));
        match self.server.protocol {
            TunnelProtocol::Tcp => self.run_tcp(listen_addr, &mut shutdown_rx).await,
            TunnelProtocol::Udp => self.run_udp(listen_addr, &mut shutdown_rx).await,
        }
    }

    async fn run_tcp(self: Arc<Self>, listen_addr: SocketAddr, shutdown_rx: &mut broadcast::Receiver<()>) {
        let listener = match TcpListener::bind(listen_addr).await {
            Ok(l) => l,
            Err(e) => {
                error!(server_id = %self.server.server_id, %listen_addr, error = %e, "tunnel TCP bind failed");
                return;
            }
        };
        info!(server_id = %self.server.server_id, %listen_addr, "tunnel TCP server listening");

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    debug!(server_id = %self.server.server_id, "tunnel TCP server shutting down");
                    return;
                }
                accepted = listener.accept() => {
                    let Ok((client, _peer)) = accepted else { continue };
                    let this = self.clone();
                    tokio::spawn(async move { this.handle_tcp_connection(client).await });
                }
            }
        }
    }

    async fn handle_tcp_connection(&self, client: tokio::net::TcpStream) {
        let Some(node) = self.pick_node().await else {
            warn!(server_id = %self.server.server_id, "no healthy tunnel node available");
            return;
        };
        let upstream_addr = format!("{}:{}", node.target_host, node.target_port);
        self.current_connections.fetch_add(1, Ordering::Relaxed);
        self.set_gauge("current_connection_count", self.current_connections.load(Ordering::Relaxed) as f64);

        match self.tcp_forwarder.relay(client, &upstream_addr).await {
            Ok((from_client, from_upstream)) => {
                let received = self.total_bytes_received.fetch_add(from_client, Ordering::Relaxed) + from_client;
                let sent = self.total_bytes_sent.fetch_add(from_upstream, Ordering::Relaxed) + from_upstream;
                self.set_gauge("total_bytes_received", received as f64);
                self.set_gauge("total_bytes_sent", sent as f64);
            }
            Err(e) => warn!(server_id = %self.server.server_id, error = %e, "tunnel relay ended with error"),
        }
        self.current_connections.fetch_sub(1, Ordering::Relaxed);
        self.set_gauge("current_connection_count", self.current_connections.load(Ordering::Relaxed) as f64);
    }

    async fn run_udp(self: Arc<Self>, listen_addr: SocketAddr, shutdown_rx: &mut broadcast::Receiver<()>) {
        let socket = match UdpSocket::bind(listen_addr).await {
            Ok(s) => Arc::new(s),
            Err(e) => {
                error!(server_id = %self.server.server_id, %listen_addr, error = %e, "tunnel UDP bind failed");
                return;
            }
        };
        info!(server_id = %self.server.server_id, %listen_addr, "tunnel UDP server listening");
        let mut buf = vec![0u8; 65535];

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    debug!(server_id = %self.server.server_id, "tunnel UDP server shutting down");
                    return;
                }
                received = socket.recv_from(&mut buf) => {
                    let Ok((n, peer)) = received else { continue };
                    let packet = buf[..n].to_vec();
                    let this = self.clone();
                    let socket = socket.clone();
                    tokio::spawn(async move { this.handle_udp_packet(socket, peer, packet).await });
                }
            }
        }
    }

    async fn handle_udp_packet(&self, socket: Arc<UdpSocket>, peer: SocketAddr, packet: Vec<u8>) {
        let Some(node) = self.pick_node().await else {
            return;
        };
        let Ok(upstream_addr): Result<SocketAddr, _> = format!("{}:{}", node.target_host, node.target_port).parse() else {
            return;
        };
        match self.udp_forwarder.relay_one(&packet, upstream_addr).await {
            Ok(reply) => {
                let received = self.total_bytes_received.fetch_add(packet.len() as u64, Ordering::Relaxed) + packet.len() as u64;
                let sent = self.total_bytes_sent.fetch_add(reply.len() as u64, Ordering::Relaxed) + reply.len() as u64;
                self.set_gauge("total_bytes_received", received as f64);
                self.set_gauge("total_bytes_sent", sent as f64);
                if let Err(e) = socket.send_to(&reply, peer).await {
                    warn!(server_id = %self.server.server_id, error = %e, "failed to send UDP reply to client");
                }
            }
            Err(e) => warn!(server_id = %self.server.server_id, error = %e, "UDP tunnel relay failed"),
        }
    }

    /// Weighted round-robin over healthy nodes. A fresh expansion each call
    /// keeps this correct across reconfiguration without a cached table.
    async fn pick_node(&self) -> Option<TunnelStaticNode> {
        let page: crate::store::PageResult<TunnelStaticNode> = self
            .store
            .query(TABLE_NODE, &self.tenant_id, &self.server.server_id, PageRequest::new(0, usize::MAX / 2))
            .await
            .ok()?;
        let healthy: Vec<TunnelStaticNode> = page
            .items
            .into_iter()
            .filter(|n| n.server_id == self.server.server_id && n.healthy)
            .collect();
        if healthy.is_empty() {
            return None;
        }
        let mut expanded: Vec<&TunnelStaticNode> = Vec::new();
        for node in &healthy {
            for _ in 0..node.weight.max(1).min(100) {
                expanded.push(node);
            }
        }
        let idx = self.round_robin.fetch_add(1, Ordering::Relaxed) as usize % expanded.len();
        Some(expanded[idx].clone())
    }

    fn set_gauge(&self, name: &str, value: f64) {
        crate::core::metrics::PrometheusMeter.set_gauge(name, value, &[("server_id", &self.server.server_id)]);
    }
}

pub fn default_forwarders(connect_timeout: Duration, udp_buffer_size: usize, udp_idle_timeout: Duration) -> (Arc<TcpForwarder>, Arc<UdpForwarder>) {
    (
        Arc::new(TcpForwarder::new(connect_timeout)),
        Arc::new(UdpForwarder::new(udp_buffer_size, udp_idle_timeout)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AuditFields;
    use crate::store::MemoryStore;

    fn server() -> TunnelStaticServer {
        TunnelStaticServer {
            server_id: "s1".to_string(),
            gateway_instance_id: "gw1".to_string(),
            listen_port: 0,
            protocol: TunnelProtocol::Tcp,
            health_check: crate::model::HealthCheckSpec::default(),
            enabled: true,
            audit: AuditFields::new("t1", "sys", 0),
        }
    }

    fn node(id: &str, weight: u32, healthy: bool) -> TunnelStaticNode {
        TunnelStaticNode {
            node_id: id.to_string(),
            server_id: "s1".to_string(),
            target_host: "127.0.0.1".to_string(),
            target_port: 9,
            weight,
            healthy,
            audit: AuditFields::new("t1", "sys", 0),
        }
    }

    #[tokio::test]
    async fn pick_node_skips_unhealthy() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        store.insert(TABLE_NODE, "t1", "n1", &node("n1", 1, false)).await.unwrap();
        store.insert(TABLE_NODE, "t1", "n2", &node("n2", 1, true)).await.unwrap();

        let (tcp, udp) = default_forwarders(Duration::from_secs(1), 2048, Duration::from_secs(1));
        let task = TunnelServerTask::new(server(), store, "t1", tcp, udp);
        let picked = task.pick_node().await.unwrap();
        assert_eq!(picked.node_id, "n2");
    }

    #[tokio::test]
    async fn pick_node_returns_none_with_no_healthy_nodes() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        store.insert(TABLE_NODE, "t1", "n1", &node("n1", 1, false)).await.unwrap();

        let (tcp, udp) = default_forwarders(Duration::from_secs(1), 2048, Duration::from_secs(1));
        let task = TunnelServerTask::new(server(), store, "t1", tcp, udp);
        assert!(task.pick_node().await.is_none());
    }
}
