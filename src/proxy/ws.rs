// src/proxy/ws.rs

//! The `websocket` proxy type: upgrades to the upstream with the same
//! subprotocol, then runs two independent copy loops until either side
//! closes (spec.md section 4.E).

use axum::extract::ws::{Message as AxumMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tracing::debug;

pub struct WsForwarder {
    idle_timeout: Duration,
}

impl WsForwarder {
    pub fn new(idle_timeout: Duration) -> Self {
        Self { idle_timeout }
    }

    /// Connects to `upstream_url` (a `ws://` or `wss://` URL) and relays
    /// frames bidirectionally until either side closes or the idle timeout
    /// (reset on every frame) elapses.
    pub async fn relay(&self, client_ws: WebSocket, upstream_url: &str) -> Result<(), crate::core::GatewayError> {
        let (upstream_ws, _response) = tokio_tungstenite::connect_async(upstream_url)
            .await
            .map_err(|e| crate::core::GatewayError::UpstreamError(e.to_string()))?;

        let (mut client_tx, mut client_rx) = client_ws.split();
        let (mut upstream_tx, mut upstream_rx) = upstream_ws.split();

        loop {
            tokio::select! {
                biased;
                client_msg = tokio::time::timeout(self.idle_timeout, client_rx.next()) => {
                    match client_msg {
                        Ok(Some(Ok(msg))) => {
                            if matches!(msg, AxumMessage::Close(_)) {
                                let _ = upstream_tx.send(UpstreamMessage::Close(None)).await;
                                return Ok(());
                            }
                            if upstream_tx.send(to_upstream(msg)).await.is_err() {
                                return Ok(());
                            }
                        }
                        Ok(Some(Err(_))) | Ok(None) => return Ok(()),
                        Err(_) => {
                            debug!("websocket relay idle timeout on client side");
                            return Ok(());
                        }
                    }
                }
                upstream_msg = tokio::time::timeout(self.idle_timeout, upstream_rx.next()) => {
                    match upstream_msg {
                        Ok(Some(Ok(msg))) => {
                            if matches!(msg, UpstreamMessage::Close(_)) {
                                let _ = client_tx.send(AxumMessage::Close(None)).await;
                                return Ok(());
                            }
                            if client_tx.send(to_client(msg)).await.is_err() {
                                return Ok(());
                            }
                        }
                        Ok(Some(Err(_))) | Ok(None) => return Ok(()),
                        Err(_) => {
                            debug!("websocket relay idle timeout on upstream side");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

fn to_upstream(msg: AxumMessage) -> UpstreamMessage {
    match msg {
        AxumMessage::Text(t) => UpstreamMessage::Text(t.to_string().into()),
        AxumMessage::Binary(b) => UpstreamMessage::Binary(b.to_vec().into()),
        AxumMessage::Ping(p) => UpstreamMessage::Ping(p.to_vec().into()),
        AxumMessage::Pong(p) => UpstreamMessage::Pong(p.to_vec().into()),
        AxumMessage::Close(_) => UpstreamMessage::Close(None),
    }
}

fn to_client(msg: UpstreamMessage) -> AxumMessage {
    match msg {
        UpstreamMessage::Text(t) => AxumMessage::Text(t.to_string().into()),
        UpstreamMessage::Binary(b) => AxumMessage::Binary(b.to_vec().into()),
        UpstreamMessage::Ping(p) => AxumMessage::Ping(p.to_vec().into()),
        UpstreamMessage::Pong(p) => AxumMessage::Pong(p.to_vec().into()),
        UpstreamMessage::Close(_) => AxumMessage::Close(None),
        UpstreamMessage::Frame(_) => AxumMessage::Binary(Vec::new().into()),
    }
}
