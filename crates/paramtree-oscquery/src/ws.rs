//! WebSocket handler for live values and namespace changes
//!
//! Binary frames carry OSC packets both ways. Text frames carry JSON
//! commands: peers send `LISTEN`/`IGNORE` for the addresses whose values
//! they want streamed, the server sends `PATH_ADDED`/`PATH_REMOVED`.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use paramtree_core::PeerId;
use paramtree_osc::{apply_message, decode_packet, encode_packet, value_message};
use rosc::OscPacket;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::state::{EndpointState, Notification};

/// Text frame payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "COMMAND", content = "DATA", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WsCommand {
    Listen(String),
    Ignore(String),
    PathAdded(String),
    PathRemoved(String),
}

pub fn upgrade(ws: WebSocketUpgrade, state: Arc<EndpointState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<EndpointState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.subscribe();
    let peer = state.next_peer();
    let mut listening: HashSet<String> = HashSet::new();

    info!(peer, "WebSocket client connected");

    loop {
        tokio::select! {
            event = events.recv() => {
                let outgoing = match event {
                    Ok(Notification::Value { address, value, origin }) => {
                        if origin.peer_of(state.id) == Some(peer) || !listening.contains(&address) {
                            continue;
                        }
                        let packet = OscPacket::Message(value_message(address, &value));
                        match encode_packet(&packet) {
                            Ok(bytes) => Message::Binary(bytes.into()),
                            Err(e) => {
                                debug!(error = %e, "Failed to encode value");
                                continue;
                            }
                        }
                    }
                    Ok(Notification::PathAdded(path)) => text(&WsCommand::PathAdded(path)),
                    Ok(Notification::PathRemoved(path)) => {
                        let prefix = format!("{}/", path);
                        listening.retain(|listened| listened != &path && !listened.starts_with(&prefix));
                        text(&WsCommand::PathRemoved(path))
                    }
                    Ok(Notification::Shutdown) => break,
                    Err(RecvError::Lagged(n)) => {
                        debug!(peer, skipped = n, "WebSocket peer lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if sender.send(outgoing).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => handle_packet(&state, peer, &data),
                    Some(Ok(Message::Text(payload))) => {
                        match serde_json::from_str::<WsCommand>(payload.as_str()) {
                            Ok(WsCommand::Listen(path)) => {
                                debug!(peer, path = %path, "LISTEN");
                                listening.insert(path);
                            }
                            Ok(WsCommand::Ignore(path)) => {
                                debug!(peer, path = %path, "IGNORE");
                                listening.remove(&path);
                            }
                            Ok(other) => {
                                debug!(peer, command = ?other, "Ignoring server-side command");
                            }
                            Err(e) => debug!(peer, error = %e, "Dropped malformed command"),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(peer, error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!(peer, "WebSocket client disconnected");
}

fn handle_packet(state: &EndpointState, peer: PeerId, data: &[u8]) {
    let Some(device) = state.device() else {
        return;
    };
    let messages = match decode_packet(data) {
        Ok(messages) => messages,
        Err(e) => {
            debug!(peer, error = %e, "Dropped inbound packet");
            return;
        }
    };
    for message in messages {
        let address = message.addr.clone();
        match apply_message(&device, message, state.origin_of(peer)) {
            Ok(value) if state.logger => info!(peer, address = %address, value = %value, "WS in"),
            Ok(_) => {}
            Err(e) => debug!(peer, address = %address, error = %e, "Dropped inbound message"),
        }
    }
}

fn text(command: &WsCommand) -> Message {
    // serializing a string-only enum cannot fail
    let json = serde_json::to_string(command).unwrap_or_default();
    Message::Text(json.into())
}
