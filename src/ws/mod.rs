pub mod handlers;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::identity::resolve_session;
use crate::protocol::{ClientMessage, ServerMessage, PROTOCOL_VERSION};
use crate::state::{AppState, RoomEvent};
use handlers::Connection;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub session: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let session = resolve_session(params.session.as_deref());
    tracing::info!(session = %session, "WebSocket connection request");

    ws.on_upgrade(move |socket| handle_socket(socket, session, state))
}

/// Render a room event for this connection. `None` means nothing to send,
/// including snapshots the client has already been sent a newer version of.
async fn render_event(
    event: Result<RoomEvent, RecvError>,
    conn: &mut Connection,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match event {
        Ok(RoomEvent::Changed(room)) => {
            let snapshot = room.snapshot_for(Some(&conn.session));
            (!conn.has_seen(&snapshot)).then(|| ServerMessage::room(snapshot))
        }
        Ok(RoomEvent::Notice { code, msg }) => Some(ServerMessage::Notice { code, msg }),
        Ok(RoomEvent::Closed) => {
            let code = conn.room.take().map(|h| h.code.clone())?;
            Some(ServerMessage::Left { code })
        }
        Err(RecvError::Lagged(skipped)) => {
            // Snapshots are full replaces, so one fresh one catches up
            tracing::debug!(skipped, "Room subscriber lagged, resyncing");
            let code = conn.room_code()?.to_string();
            let snapshot = state.snapshot(&code, Some(&conn.session)).await.ok()?;
            (!conn.has_seen(&snapshot)).then(|| ServerMessage::room(snapshot))
        }
        Err(RecvError::Closed) => {
            conn.room = None;
            None
        }
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    session: String,
    state: Arc<AppState>,
) {
    let (mut sender, mut receiver) = socket.split();
    let mut conn = Connection::new(session);

    let welcome = ServerMessage::Welcome {
        protocol: PROTOCOL_VERSION.to_string(),
        session_id: conn.session.clone(),
        server_now: chrono::Utc::now().to_rfc3339(),
    };

    if let Ok(msg) = serde_json::to_string(&welcome) {
        if sender.send(Message::Text(msg.into())).await.is_err() {
            tracing::error!("Failed to send welcome message");
            return;
        }
    }

    // Subscription to the room this connection is attached to
    let mut room_rx: Option<(String, broadcast::Receiver<RoomEvent>)> = None;

    loop {
        // Follow the connection into whichever room it is attached to now
        let wanted = conn.room_code().map(str::to_string);
        if room_rx.as_ref().map(|(code, _)| code) != wanted.as_ref() {
            room_rx = conn
                .room
                .as_ref()
                .map(|h| (h.code.clone(), h.subscribe()));
        }

        let outgoing = tokio::select! {
            event = async {
                match &mut room_rx {
                    Some((_, rx)) => rx.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                render_event(event, &mut conn, &state).await
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message: {}", text);

                        if let Err(e) = state.throttle.admit_frame(&conn.session).await {
                            Some(ServerMessage::from(e))
                        } else {
                            match serde_json::from_str::<ClientMessage>(&text) {
                                Ok(client_msg) => {
                                    handlers::handle_message(client_msg, &mut conn, &state).await
                                }
                                Err(e) => {
                                    tracing::error!("Failed to parse client message: {}", e);
                                    Some(ServerMessage::Error {
                                        code: "PARSE_ERROR".to_string(),
                                        msg: format!("Invalid message format: {}", e),
                                        retryable: false,
                                    })
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                        None
                    }
                    Some(Ok(_)) => None,
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        };

        if let Some(response) = outgoing {
            conn.record_sent(&response);
            if let Ok(json) = serde_json::to_string(&response) {
                if sender.send(Message::Text(json.into())).await.is_err() {
                    tracing::error!("Failed to send response");
                    break;
                }
            }
        }
    }

    handlers::disconnect(&state, &mut conn).await;
    tracing::info!(session = %conn.session, "WebSocket connection closed");
}
