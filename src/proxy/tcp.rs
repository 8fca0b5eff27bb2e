// src/proxy/tcp.rs

//! The `tcp` proxy type: opens an upstream connection and bidirectionally
//! copies bytes (spec.md section 4.E, also used by the tunnel engine).

use std::time::Duration;
use tokio::io;
use tokio::net::TcpStream;
use tokio::time::timeout;

pub struct TcpForwarder {
    connect_timeout: Duration,
}

impl TcpForwarder {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Connects to `upstream_addr` and copies bytes in both directions
    /// until either side closes. Returns `(bytes_from_client,
    /// bytes_from_upstream)`.
    pub async fn relay(&self, mut client: TcpStream, upstream_addr: &str) -> Result<(u64, u64), crate::core::GatewayError> {
        let mut upstream = timeout(self.connect_timeout, TcpStream::connect(upstream_addr))
            .await
            .map_err(|_| crate::core::GatewayError::Timeout(self.connect_timeout.as_millis() as u64))?
            .map_err(|e| crate::core::GatewayError::UpstreamError(e.to_string()))?;

        io::copy_bidirectional(&mut client, &mut upstream)
            .await
            .map_err(|e| crate::core::GatewayError::UpstreamError(e.to_string()))
    }
}
