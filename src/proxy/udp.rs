// src/proxy/udp.rs

//! The `udp` proxy type: a per-packet upstream socket with bidirectional
//! relay (spec.md section 4.E, also used by the tunnel engine).

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

pub struct UdpForwarder {
    buffer_size: usize,
    idle_timeout: Duration,
}

impl UdpForwarder {
    pub fn new(buffer_size: usize, idle_timeout: Duration) -> Self {
        Self {
            buffer_size,
            idle_timeout,
        }
    }

    /// Opens a fresh ephemeral socket to `upstream_addr`, forwards `packet`,
    /// and waits for one reply within the idle timeout.
    pub async fn relay_one(&self, packet: &[u8], upstream_addr: SocketAddr) -> Result<Vec<u8>, crate::core::GatewayError> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| crate::core::GatewayError::UpstreamError(e.to_string()))?;
        socket
            .connect(upstream_addr)
            .await
            .map_err(|e| crate::core::GatewayError::UpstreamError(e.to_string()))?;
        socket
            .send(packet)
            .await
            .map_err(|e| crate::core::GatewayError::UpstreamError(e.to_string()))?;

        let mut buf = vec![0u8; self.buffer_size];
        let n = timeout(self.idle_timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| crate::core::GatewayError::Timeout(self.idle_timeout.as_millis() as u64))?
            .map_err(|e| crate::core::GatewayError::UpstreamError(e.to_string()))?;
        buf.truncate(n);
        Ok(buf)
    }
}
