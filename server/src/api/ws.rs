use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Path, State as AxumState,
    },
    http::{header::ORIGIN, HeaderMap, StatusCode},
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::timeout;
use wagerhall_execution::MatchSnapshot;
use wagerhall_types::MatchId;

use super::OriginConfig;
use crate::metrics::ServerMetrics;
use crate::{ConnectionGuard, ConnectionRejection, Server, StateChange};

enum OutboundSendError {
    Closed,
    Full,
}

fn enqueue_message(
    out_tx: &mpsc::Sender<Message>,
    message: Message,
    server: &Server,
) -> Result<(), OutboundSendError> {
    match out_tx.try_send(message) {
        Ok(()) => Ok(()),
        Err(mpsc::error::TrySendError::Full(_)) => {
            server.metrics().inc_ws_send_errors();
            Err(OutboundSendError::Full)
        }
        Err(mpsc::error::TrySendError::Closed(_)) => Err(OutboundSendError::Closed),
    }
}

fn encode_snapshot(snapshot: &MatchSnapshot) -> Option<Message> {
    match serde_json::to_string(snapshot) {
        Ok(text) => Some(Message::Text(text)),
        Err(err) => {
            tracing::error!(match_id = snapshot.record.id, %err, "failed to encode snapshot");
            None
        }
    }
}

enum Update {
    Send(Arc<MatchSnapshot>),
    Skip,
    Closed,
}

/// Decide what one broadcast receive means for a stream of `match_id` that
/// has delivered up to `sent_version`. A lagged receiver falls back to the
/// latest snapshot.
fn next_update(
    received: Result<StateChange, broadcast::error::RecvError>,
    match_id: MatchId,
    sent_version: u64,
    latest: &watch::Receiver<Arc<MatchSnapshot>>,
    metrics: &ServerMetrics,
) -> Update {
    let snapshot = match received {
        Ok(change) if change.match_id == match_id => change.snapshot,
        Ok(_) => return Update::Skip,
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
            tracing::warn!(match_id, skipped, "websocket client lagged; resending latest snapshot");
            metrics.add_ws_lagged(skipped);
            Arc::clone(&latest.borrow())
        }
        Err(broadcast::error::RecvError::Closed) => return Update::Closed,
    };
    // Versions only grow; never replay an older state.
    if snapshot.version <= sent_version {
        return Update::Skip;
    }
    Update::Send(snapshot)
}

/// Streams every new snapshot of one match. The first message is the
/// current state.
pub(super) async fn updates_ws(
    AxumState(server): AxumState<Arc<Server>>,
    Path(match_id): Path<MatchId>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let config = server.config();
    let origins = OriginConfig::new(&config.allowed_origins, config.require_origin);
    let origin = headers.get(ORIGIN).and_then(|value| value.to_str().ok());
    if !origins.permits(origin) {
        tracing::warn!(?origin, "websocket origin rejected");
        return (StatusCode::FORBIDDEN, "Origin not allowed").into_response();
    }

    let latest = match server.registry().watch(match_id).await {
        Ok(latest) => latest,
        Err(_) => return (StatusCode::NOT_FOUND, "Match not found").into_response(),
    };

    let guard = match server.connections().try_acquire(addr.ip()) {
        Ok(guard) => guard,
        Err(reason) => {
            let (status, message) = match reason {
                ConnectionRejection::GlobalLimit => (
                    StatusCode::TOO_MANY_REQUESTS,
                    "WebSocket connection limit reached",
                ),
                ConnectionRejection::PerIpLimit => {
                    (StatusCode::TOO_MANY_REQUESTS, "WebSocket per-IP limit reached")
                }
                ConnectionRejection::Closed => {
                    (StatusCode::SERVICE_UNAVAILABLE, "Server shutting down")
                }
            };
            return (status, message).into_response();
        }
    };

    let max_message_bytes = config.ws_max_message_bytes;
    ws.max_message_size(max_message_bytes)
        .max_frame_size(max_message_bytes)
        .on_upgrade(move |socket| handle_updates_ws(socket, server, match_id, latest, guard))
        .into_response()
}

async fn handle_updates_ws(
    socket: WebSocket,
    server: Arc<Server>,
    match_id: MatchId,
    latest: watch::Receiver<Arc<MatchSnapshot>>,
    _guard: ConnectionGuard,
) {
    tracing::info!(match_id, "updates websocket connected");
    let (mut sender, mut receiver) = socket.split();
    // Subscribe before reading the current snapshot so nothing falls between.
    let mut updates = server.registry().subscribe();
    let mut closing = server.connections().closing();

    let (out_tx, mut out_rx) = mpsc::channel(server.config().ws_outbound_buffer);
    let send_timeout = server.config().ws_send_timeout;
    let writer_server = Arc::clone(&server);
    let writer_handle = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            match timeout(send_timeout, sender.send(message)).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => {
                    writer_server.metrics().inc_ws_send_errors();
                    tracing::debug!("failed to send update, client disconnected");
                    break;
                }
                Err(_) => {
                    writer_server.metrics().inc_ws_send_errors();
                    tracing::warn!("websocket send timed out, closing connection");
                    break;
                }
            }
        }
        let _ = sender.close().await;
    });

    let mut sent_version = {
        let current = Arc::clone(&latest.borrow());
        let version = current.version;
        let delivered = encode_snapshot(&current)
            .map(|message| enqueue_message(&out_tx, message, &server).is_ok())
            .unwrap_or(false);
        if !delivered || current.is_final() {
            drop(out_tx);
            let _ = writer_handle.await;
            return;
        }
        version
    };

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) => {
                        tracing::debug!(match_id, "client closed websocket");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if enqueue_message(&out_tx, Message::Pong(data), &server).is_err() {
                            tracing::warn!(match_id, "failed to enqueue pong, closing connection");
                            break;
                        }
                    }
                    Some(Err(err)) => {
                        tracing::debug!(match_id, ?err, "websocket error");
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }
            received = updates.recv() => {
                let snapshot = match next_update(received, match_id, sent_version, &latest, server.metrics()) {
                    Update::Send(snapshot) => snapshot,
                    Update::Skip => continue,
                    Update::Closed => break,
                };
                let Some(message) = encode_snapshot(&snapshot) else {
                    continue;
                };
                if enqueue_message(&out_tx, message, &server).is_err() {
                    tracing::warn!(match_id, "failed to enqueue update, closing connection");
                    break;
                }
                sent_version = snapshot.version;
                if snapshot.is_final() {
                    tracing::debug!(match_id, "match finished; ending stream");
                    break;
                }
            }
            _ = closing.wait_for(|closed| *closed) => {
                tracing::debug!(match_id, "server closing websocket");
                break;
            }
        }
    }
    tracing::info!(match_id, "updates websocket disconnected");
    drop(out_tx);
    let _ = writer_handle.await;
}
