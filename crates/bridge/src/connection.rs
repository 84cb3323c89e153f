//! One sidecar WebSocket carrying one phone number's connection.
//!
//! Three tasks share the socket: a writer draining the outbound queue, a
//! heartbeat pinger, and a reader that resolves pending requests and turns
//! `connection_update` messages into [`ConnectionEvent`]s.  Dropping the
//! [`BridgeHandle`] cancels all three and closes the socket.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use pb_domain::error::{Error, Result};
use pb_domain::PhoneNumber;
use pb_protocol::{BridgeMessage, ConnectionState, PROTOCOL_VERSION};
use pb_sessions::{ConnectRequest, ConnectionEvent, ConnectionHandle, DisconnectReason};

use crate::error::BridgeError;
use crate::network::{BridgeNetwork, HEARTBEAT_INTERVAL};

struct Reply {
    ok: bool,
    result: Option<Value>,
    error: Option<String>,
}

struct Shared {
    phone: PhoneNumber,
    outbound: mpsc::Sender<BridgeMessage>,
    /// request_id → waiting caller.
    pending: Mutex<HashMap<String, oneshot::Sender<Reply>>>,
    timeout: Duration,
    closed: CancellationToken,
}

pub struct BridgeHandle {
    shared: Arc<Shared>,
}

impl BridgeHandle {
    /// Dial the sidecar, send `open`, and start the socket tasks.
    pub(crate) async fn open(
        network: &BridgeNetwork,
        url: &str,
        request: &ConnectRequest,
    ) -> std::result::Result<(Self, mpsc::Receiver<ConnectionEvent>), BridgeError> {
        let phone = request.phone.clone();
        tracing::info!(phone = %phone, "connecting to bridge");

        let (ws, _response) =
            tokio::time::timeout(network.connect_timeout, tokio_tungstenite::connect_async(url))
                .await
                .map_err(|_| BridgeError::ConnectTimeout(network.connect_timeout))??;
        let (mut sink, mut stream) = ws.split();

        let open = BridgeMessage::Open {
            protocol_version: PROTOCOL_VERSION,
            phone: phone.to_string(),
            auth_dir: request.credentials_dir.display().to_string(),
        };
        sink.send(Message::Text(serde_json::to_string(&open)?)).await?;

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<BridgeMessage>(64);
        let (events_tx, events_rx) = mpsc::channel::<ConnectionEvent>(16);
        let closed = CancellationToken::new();

        let shared = Arc::new(Shared {
            phone: phone.clone(),
            outbound: outbound_tx.clone(),
            pending: Mutex::new(HashMap::new()),
            timeout: network.request_timeout,
            closed: closed.clone(),
        });

        // Writer: drain the outbound queue; send a close frame on shutdown.
        let writer_closed = closed.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = writer_closed.cancelled() => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                    msg = outbound_rx.recv() => {
                        let Some(msg) = msg else { break };
                        let json = match serde_json::to_string(&msg) {
                            Ok(j) => j,
                            Err(e) => {
                                tracing::error!(error = %e, "failed to serialize outbound message");
                                continue;
                            }
                        };
                        if sink.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        // Heartbeat.
        let ping_tx = outbound_tx;
        let ping_closed = closed.clone();
        let ping_interval = HEARTBEAT_INTERVAL;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(ping_interval);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = ping_closed.cancelled() => break,
                    _ = interval.tick() => {
                        let msg = BridgeMessage::Ping { timestamp: Utc::now().timestamp_millis() };
                        if ping_tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        // Reader.
        let reader = Arc::clone(&shared);
        tokio::spawn(async move {
            let reason = reader.read_loop(&mut stream, &events_tx).await;
            if let Some(reason) = reason {
                let _ = events_tx.send(ConnectionEvent::Closed(reason)).await;
            }
            // Dropping the senders fails every waiting request with `Closed`.
            reader.pending.lock().clear();
            reader.closed.cancel();
        });

        Ok((Self { shared }, events_rx))
    }

    async fn request(
        &self,
        op: &'static str,
        build: impl FnOnce(String) -> BridgeMessage,
    ) -> std::result::Result<Option<Value>, BridgeError> {
        let shared = &self.shared;
        if shared.closed.is_cancelled() {
            return Err(BridgeError::Closed);
        }

        let request_id = BridgeMessage::new_request_id();
        let (tx, rx) = oneshot::channel();
        shared.pending.lock().insert(request_id.clone(), tx);

        if shared.outbound.send(build(request_id.clone())).await.is_err() {
            shared.pending.lock().remove(&request_id);
            return Err(BridgeError::Closed);
        }

        match tokio::time::timeout(shared.timeout, rx).await {
            Ok(Ok(reply)) if reply.ok => Ok(reply.result),
            Ok(Ok(reply)) => Err(BridgeError::Rejected(
                reply.error.unwrap_or_else(|| format!("{op} failed")),
            )),
            Ok(Err(_)) => Err(BridgeError::Closed),
            Err(_) => {
                shared.pending.lock().remove(&request_id);
                Err(BridgeError::Timeout {
                    op,
                    after: shared.timeout,
                })
            }
        }
    }

    fn err(&self, e: BridgeError) -> Error {
        Error::network(&self.shared.phone, e)
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.shared.closed.cancel();
    }
}

#[async_trait]
impl ConnectionHandle for BridgeHandle {
    async fn request_pairing_code(&self) -> Result<String> {
        let phone = self.shared.phone.to_string();
        let result = self
            .request("request_pairing_code", |request_id| {
                BridgeMessage::RequestPairingCode { request_id, phone }
            })
            .await
            .map_err(|e| self.err(e))?;
        pairing_code_from(result).map_err(|e| self.err(e))
    }

    async fn send_message(&self, text: &str) -> Result<()> {
        let text = text.to_owned();
        self.request("send_message", |request_id| BridgeMessage::SendMessage {
            request_id,
            text,
        })
        .await
        .map(|_| ())
        .map_err(|e| self.err(e))
    }

    async fn logout(&self) -> Result<()> {
        self.request("logout", |request_id| BridgeMessage::Logout { request_id })
            .await
            .map(|_| ())
            .map_err(|e| self.err(e))
    }
}

impl Shared {
    /// Returns the close reason to report, or `None` when the handle was
    /// dropped and nobody is listening.
    async fn read_loop<S>(
        &self,
        stream: &mut S,
        events: &mpsc::Sender<ConnectionEvent>,
    ) -> Option<DisconnectReason>
    where
        S: futures_util::Stream<
                Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>,
            > + Unpin,
    {
        loop {
            let msg = tokio::select! {
                biased;
                _ = self.closed.cancelled() => return None,
                msg = stream.next() => msg,
            };

            let text = match msg {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!(phone = %self.phone, "bridge closed connection");
                    return Some(socket_lost("bridge closed the socket"));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    tracing::warn!(phone = %self.phone, error = %e, "bridge socket error");
                    return Some(socket_lost(&e.to_string()));
                }
            };

            match serde_json::from_str::<BridgeMessage>(&text) {
                Ok(BridgeMessage::ConnectionUpdate {
                    connection,
                    status_code,
                    reason,
                }) => {
                    tracing::debug!(phone = %self.phone, ?connection, ?status_code, "connection update");
                    let event = match connection {
                        ConnectionState::Connecting => ConnectionEvent::Connecting,
                        ConnectionState::Open => ConnectionEvent::Open,
                        ConnectionState::Close => {
                            // The sidecar's connection is finished; so is this socket.
                            return Some(DisconnectReason::from_status(status_code, reason));
                        }
                    };
                    if events.send(event).await.is_err() {
                        return None;
                    }
                }
                Ok(BridgeMessage::Response {
                    request_id,
                    ok,
                    result,
                    error,
                }) => match self.pending.lock().remove(&request_id) {
                    Some(tx) => {
                        let _ = tx.send(Reply { ok, result, error });
                    }
                    None => tracing::debug!(request_id = %request_id, "response for unknown request"),
                },
                Ok(BridgeMessage::Ping { timestamp }) => {
                    let _ = self.outbound.send(BridgeMessage::Pong { timestamp }).await;
                }
                Ok(BridgeMessage::Pong { .. }) => tracing::trace!("received pong"),
                Ok(other) => tracing::debug!(?other, "ignoring unexpected message"),
                Err(e) => tracing::debug!(error = %e, "failed to parse bridge message"),
            }
        }
    }
}

fn socket_lost(message: &str) -> DisconnectReason {
    DisconnectReason::Transient {
        status_code: None,
        message: Some(message.to_owned()),
    }
}

/// Accept `"CODE"` or `{"code": "CODE"}`.
fn pairing_code_from(result: Option<Value>) -> std::result::Result<String, BridgeError> {
    match result {
        Some(Value::String(code)) => Ok(code),
        Some(Value::Object(map)) => match map.get("code") {
            Some(Value::String(code)) => Ok(code.clone()),
            _ => Err(BridgeError::Protocol("pairing response has no code".into())),
        },
        _ => Err(BridgeError::Protocol("pairing response has no code".into())),
    }
}
