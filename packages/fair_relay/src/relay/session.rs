//! WebSocket Session
//!
//! One task per browser connection: registers it, feeds inbound frames to
//! the dispatcher, writes queued outbound messages, and runs the disconnect
//! path however the connection ends.

use axum::extract::ws::{Message, WebSocket};
use futures::{sink::SinkExt, stream::StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::dispatch::{Dispatched, RelayContext, dispatch_message};
use super::error::RelayError;
use super::protocol::{ServerMessage, parse_client_message};

/// How long the writer gets to flush queued messages after the reader stops.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Why the read loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    ClientClosed,
    TransportError,
    AuthTimeout,
    Shutdown,
}

/// Handle a relay WebSocket connection until it closes.
pub async fn handle_connection(socket: WebSocket, ctx: RelayContext) {
    ctx.metrics.connection_opened();

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(ctx.send_queue_capacity);

    let conn_id = ctx.registry.register(tx.clone()).await;
    info!(conn_id = %conn_id, "New signaling connection");

    // Writer: exits once every Outbox clone is gone (registry entry + ours)
    let writer_conn_id = conn_id.clone();
    let mut writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    error!(conn_id = %writer_conn_id, "Failed to serialize message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.send(Message::Close(None)).await;
    });

    let auth_deadline = ctx.auth_timeout.map(|t| Instant::now() + t);
    let mut authenticated = false;

    let reason = loop {
        let pending_deadline = auth_deadline.filter(|_| !authenticated);
        let auth_expired = async move {
            match pending_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = ctx.shutdown.cancelled() => break CloseReason::Shutdown,
            _ = auth_expired => {
                let secs = ctx.auth_timeout.map(|t| t.as_secs()).unwrap_or_default();
                report(&ctx, &conn_id, &tx, RelayError::AuthTimeout { secs });
                break CloseReason::AuthTimeout;
            }
            frame = ws_receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    ctx.metrics.message_received();
                    let outcome = match parse_client_message(text.as_str()) {
                        Ok(msg) => dispatch_message(&ctx, &conn_id, msg).await,
                        Err(e) => Err(e),
                    };
                    match outcome {
                        Ok(Dispatched::Authenticated) => authenticated = true,
                        Ok(Dispatched::Relayed) => {}
                        Err(e) => report(&ctx, &conn_id, &tx, e),
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    ctx.metrics.message_received();
                    report(&ctx, &conn_id, &tx, RelayError::BinaryFrame);
                }
                Some(Ok(Message::Close(_))) | None => break CloseReason::ClientClosed,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(conn_id = %conn_id, "WebSocket error: {}", e);
                    ctx.metrics.websocket_error();
                    break CloseReason::TransportError;
                }
            }
        }
    };

    ctx.registry.unregister(&conn_id).await;
    drop(tx);
    if !drain_writer(&mut writer, WRITER_DRAIN_TIMEOUT).await {
        warn!(conn_id = %conn_id, "Writer did not drain before timeout, aborting");
    }

    ctx.metrics.connection_closed();
    info!(conn_id = %conn_id, reason = ?reason, "Signaling connection closed");
}

/// Give the writer `grace` to flush, then abort it so a stalled peer cannot
/// keep the task and its socket alive. Returns false if it had to be aborted.
async fn drain_writer(writer: &mut JoinHandle<()>, grace: Duration) -> bool {
    if tokio::time::timeout(grace, &mut *writer).await.is_ok() {
        return true;
    }
    writer.abort();
    let _ = writer.await;
    false
}

/// Reply to the offending connection only.
fn report(ctx: &RelayContext, conn_id: &str, tx: &mpsc::Sender<ServerMessage>, err: RelayError) {
    ctx.metrics.record_error(err.category());
    debug!(conn_id = %conn_id, code = err.error_code(), "{}", err);
    if tx.try_send(ServerMessage::from(&err)).is_err() {
        ctx.metrics.message_dropped();
    }
}
