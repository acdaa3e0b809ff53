use std::{net::SocketAddr, sync::Arc};

use {
    axum::extract::ws::{Message, WebSocket},
    futures::{SinkExt, StreamExt},
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

use encore_protocol::{ClientFrame, MAX_FRAME_BYTES, ServerFrame};

use crate::{broadcast::ObserverChannel, state::GatewayState};

/// Handle a single WebSocket connection through its full lifecycle:
/// hello → relay attach → message loop → detach.
pub async fn handle_connection(socket: WebSocket, state: Arc<GatewayState>, remote_addr: SocketAddr) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Outbound frames go through an unbounded channel so the relay never
    // waits on a slow socket.
    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<String>();
    let write_conn_id = conn_id.clone();
    let write_handle = tokio::spawn(async move {
        while let Some(text) = client_rx.recv().await {
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                debug!(conn_id = %write_conn_id, "ws write loop: send failed");
                break;
            }
        }
        if let Err(e) = ws_tx.close().await {
            debug!(conn_id = %write_conn_id, error = %e, "ws write loop: close failed");
        }
    });

    let channel = ObserverChannel::new(conn_id.clone(), client_tx.clone(), Some(remote_addr));
    // Queue the hello before attaching so it precedes any relayed update.
    channel.send(&ServerFrame::hello(&conn_id).to_text());
    state.relay.on_connect(channel).await;
    drop(client_tx);

    let connections = state.relay.channel_count().await;
    info!(conn_id = %conn_id, remote_ip = %remote_addr, connections, "ws: client connected");

    while let Some(msg) = ws_rx.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t,
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => {
                state
                    .relay
                    .send_to(&conn_id, &ServerFrame::error("binary frames are not supported"))
                    .await;
                continue;
            },
            // Ping/pong are answered by axum.
            Ok(_) => continue,
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "ws: read error");
                break;
            },
        };
        handle_text(&state, &conn_id, text.as_str()).await;
    }

    // Dropping the relay's sender ends the write loop once queued frames flush.
    state.relay.on_disconnect(&conn_id).await;
    if let Err(e) = write_handle.await {
        debug!(conn_id = %conn_id, error = %e, "ws write loop ended abnormally");
    }
    info!(conn_id = %conn_id, "ws: client disconnected");
}

async fn handle_text(state: &GatewayState, conn_id: &str, text: &str) {
    if text.len() > MAX_FRAME_BYTES {
        warn!(conn_id, size = text.len(), max = MAX_FRAME_BYTES, "ws: frame too large");
        state
            .relay
            .send_to(conn_id, &ServerFrame::error("frame too large"))
            .await;
        return;
    }

    match ClientFrame::parse(text) {
        Ok(ClientFrame::StateUpdate { payload }) => {
            let delivered = state.relay.on_state_update(conn_id, payload).await;
            debug!(conn_id, delivered, "ws: state update relayed");
        },
        Err(e) => {
            debug!(conn_id, error = %e, "ws: invalid frame");
            state
                .relay
                .send_to(conn_id, &ServerFrame::error(format!("invalid frame: {e}")))
                .await;
        },
    }
}
