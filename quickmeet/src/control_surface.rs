//! Request/response channel for the popup control surface
//!
//! The popup sends `{"action": "force_check"}` and renders the answer. The
//! bridge accepts those requests as WebSocket text frames.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::watcher::DialogWatcher;
use crate::AutomationError;

pub const DEFAULT_WS_ADDR: &str = "127.0.0.1:17374";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlRequest {
    /// Re-run discovery now, replacing any control already injected
    ForceCheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Checked,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlResponse {
    pub status: ResponseStatus,
    pub dialog_found: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_added: Option<bool>,
}

impl ControlResponse {
    pub fn checked(dialog_found: bool, reason: &str, button_added: Option<bool>) -> Self {
        Self {
            status: ResponseStatus::Checked,
            dialog_found,
            reason: reason.to_string(),
            button_added,
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            dialog_found: false,
            reason: reason.into(),
            button_added: None,
        }
    }
}

/// Parses one text frame and answers it.
pub fn respond(watcher: &DialogWatcher, frame: &str) -> ControlResponse {
    match serde_json::from_str::<ControlRequest>(frame) {
        Ok(request) => watcher.handle_request(request),
        Err(e) => {
            warn!(error = %e, "invalid control request");
            ControlResponse::error(format!("invalid request: {e}"))
        }
    }
}

/// WebSocket endpoint serving control-surface requests for one watcher
pub struct ControlSurfaceBridge {
    server_task: JoinHandle<()>,
    local_addr: SocketAddr,
}

impl ControlSurfaceBridge {
    pub async fn start(
        addr: &str,
        watcher: Arc<DialogWatcher>,
    ) -> Result<ControlSurfaceBridge, AutomationError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AutomationError::Bridge(format!("failed to bind {addr}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| AutomationError::Bridge(format!("no local address: {e}")))?;
        info!("control surface bridge listening on {}", local_addr);

        let server_task = tokio::spawn(async move {
            loop {
                let (stream, peer) = match listener.accept().await {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("ws accept error: {}", e);
                        continue;
                    }
                };
                let watcher = watcher.clone();
                tokio::spawn(async move {
                    let ws_stream = match accept_async(stream).await {
                        Ok(s) => s,
                        Err(e) => {
                            warn!("ws handshake error: {}", e);
                            return;
                        }
                    };
                    debug!(%peer, "control surface connected");
                    let (mut sink, mut stream) = ws_stream.split();
                    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

                    // writer task
                    let writer = tokio::spawn(async move {
                        while let Some(msg) = rx.recv().await {
                            if let Err(e) = sink.send(msg).await {
                                warn!("ws send error: {}", e);
                                break;
                            }
                        }
                    });

                    // reader loop
                    while let Some(Ok(msg)) = stream.next().await {
                        if msg.is_close() {
                            break;
                        }
                        if !msg.is_text() {
                            continue;
                        }
                        let txt = msg.into_text().unwrap_or_default();
                        let response = respond(&watcher, &txt);
                        info!(
                            status = ?response.status,
                            dialog_found = response.dialog_found,
                            reason = %response.reason,
                            "control request handled"
                        );
                        match serde_json::to_string(&response) {
                            Ok(body) => {
                                if tx.send(Message::Text(body)).is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!("failed to encode response: {}", e),
                        }
                    }

                    drop(tx);
                    let _ = writer.await;
                    debug!(%peer, "control surface disconnected");
                });
            }
        });

        Ok(ControlSurfaceBridge {
            server_task,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for ControlSurfaceBridge {
    fn drop(&mut self) {
        self.server_task.abort();
    }
}
