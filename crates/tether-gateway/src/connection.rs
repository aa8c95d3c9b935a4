use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{error, info, trace, warn};

use tether_types::events::GatewayEvent;

use crate::dispatcher::Dispatcher;
use crate::hub::Hub;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Serve one WebSocket whose token was already validated at upgrade.
///
/// A single writer task owns the socket sink and drains the mailbox; the
/// reader hands each frame to the hub in arrival order.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, hub: Hub, user_id: i64) {
    let (mut sender, mut receiver) = socket.split();

    let (outbox, mut mailbox) = dispatcher.register_user_channel(user_id);
    let conn_id = outbox.conn_id();
    info!(
        "User {} connected to gateway (conn {}), {} online",
        user_id,
        conn_id,
        dispatcher.online_count()
    );

    outbox.push(GatewayEvent::Ready { user_id });

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = mailbox.recv() => {
                    // None: this connection was replaced or unregistered.
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Failed to encode gateway event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = sender.close().await;
    });

    let recv_outbox = outbox.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => hub.handle_text(&recv_outbox, text.as_str()).await,
                Message::Pong(_) => pong_flag_recv.store(true, Ordering::Release),
                Message::Close(_) => break,
                Message::Binary(_) => {
                    trace!("User {} sent a binary frame, ignoring", user_id);
                }
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.unregister_user_channel(user_id, conn_id);
    info!(
        "User {} disconnected from gateway (conn {}), {} online",
        user_id,
        conn_id,
        dispatcher.online_count()
    );
}
