//! Per-socket pump between an upgraded WebSocket and the relay.
//!
//! A socket goes through four states:
//!
//! - **connecting**: upgraded, waiting for the relay to assign an id
//! - **open**: registered; frames flow in both directions
//! - **closing**: the reader or writer stopped and a disconnect was reported
//! - **closed**: the relay has removed it from the registry
//!
//! The relay can also move a socket straight to closed (liveness timeout,
//! failed send, shutdown) by cancelling its kill token. That works even when
//! the writer is parked on a peer that stopped reading.

use std::fmt::Display;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::connection::{Outbound, SocketLink};
use crate::event_loop::RelayHandle;
use crate::relay::DisconnectReason;

/// How long a terminated socket gets to flush its close frame.
pub const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Run one socket until it closes, then report the disconnect.
pub async fn handle_socket(socket: WebSocket, relay: RelayHandle, send_queue_capacity: usize) {
    let (ws_tx, ws_rx) = socket.split();
    run_socket(ws_tx, ws_rx, relay, send_queue_capacity).await;
}

/// Register with the relay and pump frames between it and the socket halves.
pub async fn run_socket<W, R>(
    mut ws_tx: W,
    mut ws_rx: R,
    relay: RelayHandle,
    send_queue_capacity: usize,
) where
    W: Sink<WsMessage> + Unpin + Send + 'static,
    W::Error: Display,
    R: Stream<Item = Result<WsMessage, axum::Error>> + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Outbound>(send_queue_capacity.max(1));
    let kill = CancellationToken::new();
    let Some(id) = relay.connect(SocketLink::new(tx, kill.clone())).await else {
        warn!("relay unavailable, dropping socket");
        return;
    };

    // Writer: drain the outbound queue until the relay closes it.
    let writer_id = id.clone();
    let mut writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let result = match outbound {
                Outbound::Text(text) => {
                    ws_tx
                        .send(WsMessage::Text(String::from(&*text).into()))
                        .await
                }
                Outbound::Ping => {
                    trace!(conn_id = %writer_id, "sending liveness probe");
                    ws_tx.send(WsMessage::Ping(vec![].into())).await
                }
                Outbound::Close => {
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    break;
                }
            };
            if let Err(e) = result {
                debug!(conn_id = %writer_id, error = %e, "socket write failed");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    // Reader: forward frames until the peer goes away.
    let reader_id = id.clone();
    let reader_relay = relay.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(msg) = ws_rx.next().await {
            match msg {
                Ok(WsMessage::Text(text)) => {
                    if !reader_relay.frame(reader_id.clone(), text.to_string()).await {
                        return DisconnectReason::Shutdown;
                    }
                }
                Ok(WsMessage::Binary(data)) => match std::str::from_utf8(&data) {
                    Ok(text) => {
                        if !reader_relay.frame(reader_id.clone(), text.to_owned()).await {
                            return DisconnectReason::Shutdown;
                        }
                    }
                    Err(_) => debug!(conn_id = %reader_id, "ignoring non-utf8 binary frame"),
                },
                Ok(WsMessage::Pong(_)) => reader_relay.pong(reader_id.clone()).await,
                Ok(WsMessage::Ping(_)) => {} // answered by axum
                Ok(WsMessage::Close(_)) => return DisconnectReason::Closed,
                Err(e) => {
                    debug!(conn_id = %reader_id, error = %e, "socket read failed");
                    return DisconnectReason::Error;
                }
            }
        }
        DisconnectReason::Closed
    });

    let reason = tokio::select! {
        res = &mut reader => Some(res.unwrap_or(DisconnectReason::Error)),
        _ = &mut writer => Some(DisconnectReason::Closed),
        () = kill.cancelled() => {
            if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
                debug!(conn_id = %id, "writer stalled, dropping socket");
            }
            None
        }
    };
    reader.abort();
    writer.abort();

    // A killed socket was already removed by the relay.
    if let Some(reason) = reason {
        debug!(conn_id = %id, reason = reason.as_str(), "socket finished");
        relay.disconnect(id, reason).await;
    } else {
        debug!(conn_id = %id, "socket terminated by relay");
    }
}
